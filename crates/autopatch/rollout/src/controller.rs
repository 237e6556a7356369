//! Rollout controller - one background task per rollout plus a stuck monitor

use crate::config::RolloutControllerConfig;
use crate::error::{Result, RolloutError};
use crate::metrics::MetricsProvider;
use crate::strategy::{deployment_plan, ROLLBACK_STEP};
use crate::traffic::TrafficController;
use autopatch_types::{
    BackgroundTask, RolloutConfig, RolloutId, RolloutPhase, RolloutStatus, StopSignal, StopSource,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Aggregate view over active and finished rollouts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutStatistics {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub rolled_back: usize,
    pub success_rate: f64,
    pub rollback_rate: f64,
}

/// Why a rollout stopped before completing
enum Halt {
    /// Unhealthy or unable to move traffic; roll back when enabled
    RollBack(String),
    /// Fail without touching traffic
    Fail(String),
    Interrupted,
    /// The status was taken over (force-failed) elsewhere
    Gone,
}

/// Runs staged rollouts against a traffic controller and metrics provider
pub struct RolloutController {
    config: RolloutControllerConfig,
    traffic: Arc<dyn TrafficController>,
    metrics: Arc<dyn MetricsProvider>,
    active: DashMap<RolloutId, RolloutStatus>,
    tasks: DashMap<RolloutId, JoinHandle<()>>,
    history: RwLock<VecDeque<RolloutStatus>>,
    stop: StopSource,
    monitor: Mutex<Option<BackgroundTask>>,
}

impl RolloutController {
    pub fn new(
        config: RolloutControllerConfig,
        traffic: Arc<dyn TrafficController>,
        metrics: Arc<dyn MetricsProvider>,
    ) -> Self {
        Self {
            config,
            traffic,
            metrics,
            active: DashMap::new(),
            tasks: DashMap::new(),
            history: RwLock::new(VecDeque::new()),
            stop: StopSource::new(),
            monitor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RolloutControllerConfig {
        &self.config
    }

    /// Allocate a rollout and launch its strategy in the background.
    ///
    /// Returns the initial (Preparing) status; progress is observed through
    /// [`get_rollout`](Self::get_rollout).
    #[instrument(skip(self, config), fields(strategy = %config.strategy))]
    pub fn start_rollout(
        self: &Arc<Self>,
        component: &str,
        version: &str,
        config: RolloutConfig,
    ) -> Result<RolloutStatus> {
        if self.stop.is_stopped() {
            return Err(RolloutError::ShuttingDown);
        }
        let plan = deployment_plan(&config)?;
        let status = RolloutStatus::new(component, version, config);
        let id = status.id;
        self.active.insert(id, status.clone());

        let controller = Arc::clone(self);
        let stop = self.stop.signal();
        info!(rollout_id = %id, plan = ?plan, "Rollout started");
        let handle = tokio::spawn(async move { controller.run(id, plan, stop).await });
        self.tasks.insert(id, handle);
        Ok(status)
    }

    // ── Execution ──────────────────────────────────────────────────────

    fn with_status<R>(&self, id: &RolloutId, f: impl FnOnce(&mut RolloutStatus) -> R) -> Option<R> {
        self.active.get_mut(id).map(|mut status| f(&mut status))
    }

    fn advance(&self, id: &RolloutId, next: RolloutPhase) -> std::result::Result<(), Halt> {
        self.with_status(id, |s| s.transition_to(next))
            .ok_or(Halt::Gone)?
            .map_err(|e| Halt::Fail(e.to_string()))
    }

    async fn run(self: Arc<Self>, id: RolloutId, plan: Vec<u8>, mut stop: StopSignal) {
        let Some((component, version, config)) = self.with_status(&id, |s| {
            (s.component.clone(), s.version.clone(), s.config.clone())
        }) else {
            return;
        };

        let outcome = self
            .execute(&id, &component, &version, &config, &plan, &mut stop)
            .await;
        match outcome {
            Ok(()) => info!(rollout_id = %id, component = %component, version = %version, "Rollout complete"),
            Err(Halt::RollBack(reason)) => {
                self.roll_back(&id, &component, &version, &config, reason).await
            }
            Err(Halt::Fail(reason)) => {
                warn!(rollout_id = %id, reason = %reason, "Rollout failed");
                self.with_status(&id, |s| s.fail(reason));
            }
            Err(Halt::Interrupted) => {
                warn!(rollout_id = %id, "Rollout interrupted by shutdown");
                self.with_status(&id, |s| s.fail("rollout interrupted by shutdown"));
            }
            Err(Halt::Gone) => return,
        }
        self.archive(&id).await;
    }

    async fn execute(
        &self,
        id: &RolloutId,
        component: &str,
        version: &str,
        config: &RolloutConfig,
        plan: &[u8],
        stop: &mut StopSignal,
    ) -> std::result::Result<(), Halt> {
        for (step, &percentage) in plan.iter().enumerate() {
            self.advance(id, RolloutPhase::Deploying)?;
            if let Err(e) = self.traffic.shift(component, version, percentage).await {
                return Err(Halt::RollBack(format!("traffic shift to {percentage}% failed: {e}")));
            }
            self.with_status(id, |s| s.set_percentage(percentage))
                .ok_or(Halt::Gone)?
                .map_err(|e| Halt::Fail(e.to_string()))?;

            self.advance(id, RolloutPhase::Monitoring)?;
            info!(
                rollout_id = %id,
                step = step + 1,
                steps = plan.len(),
                percentage,
                "Monitoring rollout step"
            );
            self.monitor_health(id, component, version, config, percentage, stop)
                .await?;
        }
        self.advance(id, RolloutPhase::Complete)
    }

    /// Sample every `health_check_interval` until `monitoring_duration_seconds`
    /// have passed; the first breach ends monitoring.
    async fn monitor_health(
        &self,
        id: &RolloutId,
        component: &str,
        version: &str,
        config: &RolloutConfig,
        percentage: u8,
        stop: &mut StopSignal,
    ) -> std::result::Result<(), Halt> {
        let interval = Duration::from_secs(config.health_check_interval);
        let mut elapsed = 0;
        loop {
            if !stop.sleep(interval).await {
                return Err(Halt::Interrupted);
            }
            let sample = self
                .metrics
                .sample(component, version, percentage)
                .await
                .map_err(|e| Halt::RollBack(format!("health sample at {percentage}% failed: {e}")))?;
            let breach = sample.breach(config.error_threshold, self.config.response_time_ceiling_ms);
            self.with_status(id, |s| s.record_health(sample))
                .ok_or(Halt::Gone)?;
            if let Some(reason) = breach {
                return Err(Halt::RollBack(format!("unhealthy at {percentage}%: {reason}")));
            }

            elapsed += config.health_check_interval;
            if elapsed >= config.monitoring_duration_seconds {
                return Ok(());
            }
        }
    }

    async fn roll_back(
        &self,
        id: &RolloutId,
        component: &str,
        version: &str,
        config: &RolloutConfig,
        reason: String,
    ) {
        warn!(rollout_id = %id, reason = %reason, rollback = config.rollback_enabled, "Rollout unhealthy");
        if !config.rollback_enabled {
            self.with_status(id, |s| s.fail(reason));
            return;
        }

        let started = self.with_status(id, |s| {
            s.errors.push(reason);
            s.transition_to(RolloutPhase::RollingBack)
                .map(|_| s.current_percentage)
        });
        let mut percentage = match started {
            Some(Ok(percentage)) => percentage,
            Some(Err(e)) => {
                self.with_status(id, |s| s.fail(format!("rollback could not start: {e}")));
                return;
            }
            None => return,
        };

        while percentage > 0 {
            percentage = percentage.saturating_sub(ROLLBACK_STEP);
            if let Err(e) = self.traffic.shift(component, version, percentage).await {
                warn!(rollout_id = %id, percentage, error = %e, "Rollback shift failed");
                self.with_status(id, |s| {
                    s.errors.push(format!("rollback shift to {percentage}% failed: {e}"))
                });
            }
            let _ = self.with_status(id, |s| s.set_percentage(percentage));
        }
        let _ = self.with_status(id, |s| s.transition_to(RolloutPhase::Failed));
        info!(rollout_id = %id, "Rollback finished");
    }

    async fn archive(&self, id: &RolloutId) {
        let Some((_, status)) = self.active.remove(id) else {
            return;
        };
        let mut history = self.history.write().await;
        history.push_back(status);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    // ── Stuck Detection ────────────────────────────────────────────────

    /// Force-fail rollouts whose status has not changed within the stuck
    /// timeout. Returns the ids that were failed.
    pub async fn detect_stuck_rollouts(&self) -> Vec<RolloutId> {
        self.detect_stuck_rollouts_at(Utc::now()).await
    }

    pub async fn detect_stuck_rollouts_at(&self, now: DateTime<Utc>) -> Vec<RolloutId> {
        let limit = i64::try_from(self.config.stuck_timeout_secs).unwrap_or(i64::MAX);
        let stuck: Vec<RolloutId> = self
            .active
            .iter()
            .filter(|entry| (now - entry.updated_at).num_seconds() > limit)
            .map(|entry| *entry.key())
            .collect();

        for id in &stuck {
            if let Some((_, handle)) = self.tasks.remove(id) {
                handle.abort();
            }
            warn!(rollout_id = %id, timeout_secs = limit, "Rollout stuck, forcing failure");
            self.with_status(id, |s| {
                s.fail(format!("rollout stuck: no progress for over {limit}s"))
            });
            self.archive(id).await;
        }
        self.tasks.retain(|_, handle| !handle.is_finished());
        stuck
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Start the stuck-rollout monitor
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut monitor = self.monitor.lock().await;
        if monitor.is_some() {
            return Err(RolloutError::AlreadyRunning);
        }
        self.stop.reset();
        let controller = Arc::clone(self);
        *monitor = Some(BackgroundTask::spawn_periodic(
            "rollout-stuck-monitor",
            self.config.monitor_interval(),
            move || {
                let controller = Arc::clone(&controller);
                async move {
                    let stuck = controller.detect_stuck_rollouts().await;
                    if !stuck.is_empty() {
                        warn!(count = stuck.len(), "Stuck rollouts failed");
                    }
                }
            },
        ));
        info!("Rollout controller started");
        Ok(())
    }

    /// Stop the monitor and interrupt every in-flight rollout, waiting for
    /// each to record its final state.
    pub async fn stop(&self) {
        if let Some(task) = self.monitor.lock().await.take() {
            task.shutdown().await;
        }
        self.stop.stop();

        let ids: Vec<RolloutId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, handle)) = self.tasks.remove(&id) {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        warn!(rollout_id = %id, "Rollout task panicked");
                    }
                }
            }
        }
        info!("Rollout controller stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.monitor.lock().await.is_some()
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub async fn get_rollout(&self, id: &RolloutId) -> Option<RolloutStatus> {
        if let Some(status) = self.active.get(id) {
            return Some(status.clone());
        }
        self.history
            .read()
            .await
            .iter()
            .rev()
            .find(|s| s.id == *id)
            .cloned()
    }

    pub fn active_rollouts(&self) -> Vec<RolloutStatus> {
        let mut active: Vec<RolloutStatus> =
            self.active.iter().map(|e| e.value().clone()).collect();
        active.sort_by_key(|s| s.started_at);
        active
    }

    pub async fn history(&self) -> Vec<RolloutStatus> {
        self.history.read().await.iter().cloned().collect()
    }

    pub async fn statistics(&self) -> RolloutStatistics {
        let history = self.history.read().await;
        let finished = history.len();
        let completed = history.iter().filter(|s| s.is_complete()).count();
        let failed = history
            .iter()
            .filter(|s| s.phase == RolloutPhase::Failed)
            .count();
        let rolled_back = history.iter().filter(|s| s.rollback_triggered).count();
        let rate = |n: usize| if finished == 0 { 0.0 } else { n as f64 / finished as f64 };

        RolloutStatistics {
            active: self.active.len(),
            completed,
            failed,
            rolled_back,
            success_rate: rate(completed),
            rollback_rate: rate(rolled_back),
        }
    }
}

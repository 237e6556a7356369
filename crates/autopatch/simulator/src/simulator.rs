//! Update simulator - runs validation suites with bounded concurrency

use crate::config::SimulatorConfig;
use crate::environment::EnvironmentProvider;
use crate::runner::{is_metric_key, TestRunner, TestSuiteOutcome};
use autopatch_types::{
    SimulationConfig, SimulationId, SimulationResult, SimulationStatus, StateMachine, StopSource,
    VersionInfo,
};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock, Semaphore};
use tracing::{info, instrument, warn};

/// Aggregate counters over finished simulations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatorStatistics {
    pub active: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub degraded: usize,
}

/// Validates candidate versions in isolated environments
pub struct UpdateSimulator {
    config: SimulatorConfig,
    environments: Arc<dyn EnvironmentProvider>,
    runner: Arc<dyn TestRunner>,
    limiter: Arc<Semaphore>,
    active: DashMap<SimulationId, SimulationResult>,
    history: RwLock<VecDeque<SimulationResult>>,
    idle: Notify,
    stop: StopSource,
}

enum RunEnd {
    Finished(Vec<TestSuiteOutcome>),
    TimedOut,
    Cancelled,
}

impl UpdateSimulator {
    pub fn new(
        config: SimulatorConfig,
        environments: Arc<dyn EnvironmentProvider>,
        runner: Arc<dyn TestRunner>,
    ) -> Self {
        let permits = config.max_concurrent_simulations.max(1);
        Self {
            config,
            environments,
            runner,
            limiter: Arc::new(Semaphore::new(permits)),
            active: DashMap::new(),
            history: RwLock::new(VecDeque::new()),
            idle: Notify::new(),
            stop: StopSource::new(),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Validate `version`, returning exactly one terminal result.
    ///
    /// Environment or runner failures, timeouts and shutdown are recorded on
    /// the result rather than returned as errors.
    #[instrument(skip(self, version, config), fields(component = %version.component, version = %version.version))]
    pub async fn simulate_update(
        &self,
        version: &VersionInfo,
        config: &SimulationConfig,
    ) -> SimulationResult {
        let mut result = SimulationResult::new(&version.component, &version.version);
        self.active.insert(result.id, result.clone());
        let mut stop = self.stop.signal();

        let permit = tokio::select! {
            permit = Arc::clone(&self.limiter).acquire_owned() => permit.ok(),
            _ = stop.stopped() => None,
        };
        let Some(_permit) = permit else {
            result.errors.push("simulation cancelled before start".to_string());
            let _ = result.status.transition_to(SimulationStatus::Cancelled);
            return self.finish(result).await;
        };

        let _ = result.status.transition_to(SimulationStatus::Running);
        result.started_at = Utc::now();
        self.active.insert(result.id, result.clone());
        info!(simulation_id = %result.id, "Simulation started");

        let env = match self.environments.create(version).await {
            Ok(env) => env,
            Err(e) => {
                result.errors.push(format!("environment setup failed: {e}"));
                self.conclude(&mut result, config);
                return self.finish(result).await;
            }
        };

        let run = async {
            let mut outcomes = Vec::with_capacity(config.test_categories.len());
            for category in &config.test_categories {
                let outcome = match self.runner.run(*category, &env, version, config).await {
                    Ok(outcome) => outcome,
                    Err(e) => TestSuiteOutcome::errored(*category, e.to_string()),
                };
                outcomes.push(outcome);
            }
            outcomes
        };
        let timeout = Duration::from_secs(config.timeout_secs);
        let end = tokio::select! {
            res = tokio::time::timeout(timeout, run) => match res {
                Ok(outcomes) => RunEnd::Finished(outcomes),
                Err(_) => RunEnd::TimedOut,
            },
            _ = stop.stopped() => RunEnd::Cancelled,
        };

        if let Err(e) = self.environments.teardown(&env).await {
            warn!(simulation_id = %result.id, error = %e, "Environment teardown failed");
            result.warnings.push(format!("environment teardown failed: {e}"));
        }

        match end {
            RunEnd::Finished(outcomes) => {
                for outcome in outcomes {
                    result.tests_run += outcome.tests_run;
                    result.tests_passed += outcome.tests_passed;
                    result.tests_failed += outcome.tests_failed;
                    result.performance_metrics.extend(outcome.metrics);
                    result.errors.extend(outcome.errors);
                    result.warnings.extend(outcome.warnings);
                }
                self.conclude(&mut result, config);
            }
            RunEnd::TimedOut => {
                result
                    .errors
                    .push(format!("simulation timed out after {}s", config.timeout_secs));
                self.conclude(&mut result, config);
            }
            RunEnd::Cancelled => {
                result.errors.push("simulation cancelled by shutdown".to_string());
                let _ = result.status.transition_to(SimulationStatus::Cancelled);
            }
        }

        self.finish(result).await
    }

    /// Degradation check, terminal status and recommendation
    fn conclude(&self, result: &mut SimulationResult, config: &SimulationConfig) {
        if let Some(baseline) = &config.performance_baseline {
            let warnings = degradation_warnings(&result.performance_metrics, baseline);
            if !warnings.is_empty() {
                result.performance_degradation = true;
                result.warnings.extend(warnings);
            }
        }

        let status = if result.tests_failed == 0 && result.errors.is_empty() {
            SimulationStatus::Success
        } else {
            SimulationStatus::Failed
        };
        let _ = result.status.transition_to(status);
        result.recommendation = recommendation(result.success_rate()).to_string();
    }

    async fn finish(&self, mut result: SimulationResult) -> SimulationResult {
        result.completed_at = Some(Utc::now());
        info!(
            simulation_id = %result.id,
            status = %result.status,
            tests_run = result.tests_run,
            tests_failed = result.tests_failed,
            degraded = result.performance_degradation,
            "Simulation finished"
        );

        self.store_record(result.clone()).await;
        self.active.remove(&result.id);
        if self.active.is_empty() {
            self.idle.notify_waiters();
        }
        result
    }

    async fn store_record(&self, result: SimulationResult) {
        let mut history = self.history.write().await;
        history.push_back(result);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    /// Simulate many candidates concurrently; each gets its own result.
    pub async fn batch_simulate(
        &self,
        requests: Vec<(VersionInfo, SimulationConfig)>,
    ) -> Vec<SimulationResult> {
        let runs = requests
            .iter()
            .map(|(version, config)| self.simulate_update(version, config));
        futures::future::join_all(runs).await
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_simulations(&self) -> Vec<SimulationResult> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn history(&self) -> Vec<SimulationResult> {
        self.history.read().await.iter().cloned().collect()
    }

    pub async fn get_simulation(&self, id: &SimulationId) -> Option<SimulationResult> {
        if let Some(active) = self.active.get(id) {
            return Some(active.clone());
        }
        self.history
            .read()
            .await
            .iter()
            .find(|r| r.id == *id)
            .cloned()
    }

    pub async fn statistics(&self) -> SimulatorStatistics {
        let history = self.history.read().await;
        let count = |status| history.iter().filter(|r| r.status == status).count();
        SimulatorStatistics {
            active: self.active.len(),
            completed: history.len(),
            succeeded: count(SimulationStatus::Success),
            failed: count(SimulationStatus::Failed),
            cancelled: count(SimulationStatus::Cancelled),
            degraded: history.iter().filter(|r| r.performance_degradation).count(),
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Accept new simulations again after a stop
    pub fn start(&self) {
        self.stop.reset();
    }

    /// Cancel in-flight simulations and wait for them to tear down
    pub async fn stop(&self) {
        self.stop.stop();
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active.is_empty() {
                break;
            }
            notified.await;
        }
        info!("Update simulator stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }
}

/// Warnings for metrics that regressed against the baseline: `*_time_ms`
/// above 110% of baseline, `throughput_*` below 90%.
pub fn degradation_warnings(
    metrics: &HashMap<String, f64>,
    baseline: &HashMap<String, f64>,
) -> Vec<String> {
    let mut keys: Vec<&String> = metrics.keys().filter(|k| is_metric_key(k)).collect();
    keys.sort();

    let mut warnings = Vec::new();
    for key in keys {
        let (Some(value), Some(base)) = (metrics.get(key), baseline.get(key)) else {
            continue;
        };
        if key.ends_with("_time_ms") && *value > base * 1.1 {
            warnings.push(format!(
                "performance degradation: {key} {value:.2} exceeds baseline {base:.2} by more than 10%"
            ));
        } else if key.starts_with("throughput_") && *value < base * 0.9 {
            warnings.push(format!(
                "performance degradation: {key} {value:.2} below baseline {base:.2} by more than 10%"
            ));
        }
    }
    warnings
}

/// Recommendation banded on pass ratio
pub fn recommendation(success_rate: f64) -> &'static str {
    if success_rate >= 1.0 {
        "All tests passed - safe to deploy"
    } else if success_rate >= 0.95 {
        "Minor test failures - review failures before deploying"
    } else if success_rate >= 0.90 {
        "Notable test failures - investigate before deploying"
    } else {
        "Significant test failures - do not deploy"
    }
}

//! CI/CD integrator - FIFO deployment queue with a single consumer

use crate::config::CicdConfig;
use crate::error::{CicdError, Result};
use crate::provider::{CicdProvider, DispatchReceipt, PipelineState};
use autopatch_types::{
    BackgroundTask, DeploymentResult, DeploymentStatus, DeploymentTrigger, PolicyEvaluation,
    StateMachine, StopSignal, TriggerId,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Aggregate view over finished deployments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub success_rate: f64,
    pub average_duration_secs: f64,
}

/// Dispatches approved updates to a CI/CD provider, one at a time
pub struct CicdIntegrator {
    config: CicdConfig,
    provider: Arc<dyn CicdProvider>,
    queue: Mutex<VecDeque<DeploymentTrigger>>,
    wake: Notify,
    /// Queued and in-flight deployments
    active: DashMap<TriggerId, DeploymentResult>,
    history: RwLock<VecDeque<DeploymentResult>>,
    task: Mutex<Option<BackgroundTask>>,
}

impl CicdIntegrator {
    pub fn new(config: CicdConfig, provider: Arc<dyn CicdProvider>) -> Self {
        Self {
            config,
            provider,
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            active: DashMap::new(),
            history: RwLock::new(VecDeque::new()),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CicdConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Queue a deployment for an approved evaluation.
    ///
    /// Anything but APPROVE is rejected without side effects, and so is any
    /// trigger while the consumer is stopped.
    #[instrument(skip(self, evaluation, deployment_config), fields(component = %evaluation.component, version = %evaluation.version))]
    pub async fn trigger_deployment(
        &self,
        evaluation: &PolicyEvaluation,
        deployment_config: serde_json::Value,
    ) -> Result<DeploymentTrigger> {
        let trigger = DeploymentTrigger::new(evaluation.clone(), deployment_config)?;
        if self.task.lock().await.is_none() {
            return Err(CicdError::NotRunning);
        }
        let result = DeploymentResult::pending(&trigger, self.provider.name());

        let mut queue = self.queue.lock().await;
        self.active.insert(trigger.id(), result);
        queue.push_back(trigger.clone());
        let position = queue.len();
        drop(queue);

        self.wake.notify_one();
        info!(trigger_id = %trigger.id(), position, "Deployment queued");
        Ok(trigger)
    }

    /// Cancel a queued deployment, or mark an in-flight one cancelled.
    pub async fn cancel_deployment(&self, trigger_id: &TriggerId) -> Result<DeploymentResult> {
        let removed = {
            let mut queue = self.queue.lock().await;
            let index = queue.iter().position(|t| t.id() == *trigger_id);
            index.and_then(|i| queue.remove(i))
        };

        if removed.is_some() {
            let result = {
                let mut entry = self
                    .active
                    .get_mut(trigger_id)
                    .ok_or(CicdError::NotFound(*trigger_id))?;
                entry.errors.push("cancelled while queued".to_string());
                let _ = entry.transition_to(DeploymentStatus::Cancelled);
                entry.clone()
            };
            self.archive(trigger_id).await;
            info!(trigger_id = %trigger_id, "Queued deployment cancelled");
            return Ok(result);
        }

        let mut entry = self
            .active
            .get_mut(trigger_id)
            .ok_or(CicdError::NotFound(*trigger_id))?;
        entry
            .transition_to(DeploymentStatus::Cancelled)
            .map_err(|_| CicdError::InvalidState {
                trigger_id: *trigger_id,
                status: entry.status,
            })?;
        entry.errors.push("cancelled while in progress".to_string());
        info!(trigger_id = %trigger_id, "In-flight deployment cancelled");
        Ok(entry.clone())
    }

    // ── Consumer ───────────────────────────────────────────────────────

    /// Start the queue consumer
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(CicdError::AlreadyRunning);
        }
        let integrator = Arc::clone(self);
        *task = Some(BackgroundTask::spawn("cicd-consumer", move |stop| async move {
            integrator.consume(stop).await;
        }));
        info!(provider = %self.provider.name(), "CI/CD integrator started");
        Ok(())
    }

    /// Stop the consumer; an in-flight deployment stops being monitored
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.shutdown().await;
            info!("CI/CD integrator stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    async fn consume(&self, mut stop: StopSignal) {
        loop {
            if stop.is_stopped() {
                break;
            }
            let next = self.queue.lock().await.pop_front();
            match next {
                Some(trigger) => self.process(trigger, &mut stop).await,
                None => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = stop.stopped() => break,
                    }
                }
            }
        }
    }

    fn update(&self, trigger_id: &TriggerId, f: impl FnOnce(&mut DeploymentResult)) {
        if let Some(mut entry) = self.active.get_mut(trigger_id) {
            f(&mut entry);
        }
    }

    fn status_of(&self, trigger_id: &TriggerId) -> Option<DeploymentStatus> {
        self.active.get(trigger_id).map(|r| r.status)
    }

    #[instrument(skip(self, trigger, stop), fields(trigger_id = %trigger.id()))]
    async fn process(&self, trigger: DeploymentTrigger, stop: &mut StopSignal) {
        let id = trigger.id();
        let receipt = match self.provider.dispatch(&trigger).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "Deployment dispatch failed");
                self.update(&id, |r| r.fail(format!("dispatch failed: {e}")));
                self.archive(&id).await;
                return;
            }
        };

        self.update(&id, |r| {
            r.pipeline_url = receipt.pipeline_url.clone();
            r.logs_url = receipt.logs_url.clone();
            r.external_id = receipt.external_id.clone();
            let _ = r.transition_to(DeploymentStatus::Queued);
        });
        info!(pipeline_url = ?receipt.pipeline_url, "Monitoring deployment");

        self.monitor(&trigger, &receipt, stop).await;
        self.archive(&id).await;
    }

    /// Follow the provider until a terminal state. The deployment stays
    /// Queued while the provider reports its run queued and moves to Running
    /// on the first running or finished poll.
    async fn monitor(&self, trigger: &DeploymentTrigger, receipt: &DispatchReceipt, stop: &mut StopSignal) {
        let id = trigger.id();
        let deadline = Instant::now() + self.config.monitoring_horizon();

        loop {
            match self.status_of(&id) {
                Some(DeploymentStatus::Cancelled) => {
                    if let Err(e) = self.provider.cancel(trigger, receipt).await {
                        warn!(trigger_id = %id, error = %e, "Provider cancellation failed");
                    }
                    return;
                }
                Some(status) if status.is_terminal() => return,
                None => return,
                _ => {}
            }

            match self.provider.poll(trigger, receipt).await {
                Ok(PipelineState::Succeeded) => {
                    self.update(&id, |r| {
                        if r.status == DeploymentStatus::Queued {
                            let _ = r.transition_to(DeploymentStatus::Running);
                        }
                        let _ = r.transition_to(DeploymentStatus::Success);
                    });
                    info!(trigger_id = %id, "Deployment succeeded");
                    return;
                }
                Ok(PipelineState::Failed(reason)) => {
                    warn!(trigger_id = %id, reason = %reason, "Deployment failed");
                    self.update(&id, |r| r.fail(reason));
                    return;
                }
                Ok(PipelineState::Cancelled) => {
                    self.update(&id, |r| {
                        r.errors.push("cancelled by provider".to_string());
                        let _ = r.transition_to(DeploymentStatus::Cancelled);
                    });
                    return;
                }
                Ok(PipelineState::Running) => self.update(&id, |r| {
                    if r.status == DeploymentStatus::Queued {
                        let _ = r.transition_to(DeploymentStatus::Running);
                    }
                }),
                Ok(PipelineState::Queued) => {}
                Err(e) => warn!(trigger_id = %id, error = %e, "Deployment poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                let secs = self.config.monitoring_horizon_secs;
                warn!(trigger_id = %id, horizon_secs = secs, "Deployment monitoring timed out");
                self.update(&id, |r| {
                    r.fail(format!("deployment timed out after {secs}s without a terminal status"))
                });
                return;
            }
            let wait = self.config.poll_interval().min(deadline - now);
            if !stop.sleep(wait).await {
                self.update(&id, |r| r.fail("deployment monitoring interrupted by shutdown"));
                return;
            }
        }
    }

    async fn archive(&self, trigger_id: &TriggerId) {
        let Some((_, result)) = self.active.remove(trigger_id) else {
            return;
        };
        info!(
            trigger_id = %trigger_id,
            status = %result.status,
            duration_secs = ?result.duration_secs(),
            "Deployment finished"
        );
        let mut history = self.history.write().await;
        history.push_back(result);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub async fn get_deployment(&self, trigger_id: &TriggerId) -> Option<DeploymentResult> {
        if let Some(active) = self.active.get(trigger_id) {
            return Some(active.clone());
        }
        self.history
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.trigger_id == *trigger_id)
            .cloned()
    }

    pub fn active_deployments(&self) -> Vec<DeploymentResult> {
        let mut active: Vec<DeploymentResult> =
            self.active.iter().map(|e| e.value().clone()).collect();
        active.sort_by_key(|r| r.created_at);
        active
    }

    pub async fn history(&self) -> Vec<DeploymentResult> {
        self.history.read().await.iter().cloned().collect()
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn statistics(&self) -> DeploymentStatistics {
        let history = self.history.read().await;
        let count = |status| history.iter().filter(|r| r.status == status).count();
        let total = history.len();
        let successful = count(DeploymentStatus::Success);
        let durations: Vec<f64> = history.iter().filter_map(DeploymentResult::duration_secs).collect();

        DeploymentStatistics {
            total,
            successful,
            failed: count(DeploymentStatus::Failed),
            cancelled: count(DeploymentStatus::Cancelled),
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
            average_duration_secs: if durations.is_empty() {
                0.0
            } else {
                durations.iter().sum::<f64>() / durations.len() as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryCicdProvider;
    use autopatch_types::{RiskLevel, UpdateDecision};
    use chrono::Utc;
    use std::time::Duration;

    fn evaluation(decision: UpdateDecision) -> PolicyEvaluation {
        PolicyEvaluation {
            component: "api-gateway".to_string(),
            version: "2.4.0".to_string(),
            decision,
            risk_level: RiskLevel::Low,
            risk_score: 1,
            matched_policies: vec!["low-risk-auto-approve".to_string()],
            reasons: Vec::new(),
            deployment_window: None,
            evaluated_at: Utc::now(),
        }
    }

    fn config() -> CicdConfig {
        CicdConfig {
            poll_interval_ms: 1_000,
            monitoring_horizon_secs: 30,
            ..CicdConfig::default()
        }
    }

    async fn wait_finished(integrator: &CicdIntegrator, id: &TriggerId) -> DeploymentResult {
        for _ in 0..600 {
            if let Some(result) = integrator.get_deployment(id).await {
                if result.is_terminal() {
                    return result;
                }
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        panic!("deployment {id} never finished");
    }

    #[tokio::test]
    async fn rejects_unapproved_evaluations_without_side_effects() {
        let integrator = CicdIntegrator::new(config(), Arc::new(InMemoryCicdProvider::succeeding()));
        for decision in [UpdateDecision::Reject, UpdateDecision::Defer, UpdateDecision::ManualReview] {
            let err = integrator
                .trigger_deployment(&evaluation(decision), serde_json::json!({}))
                .await
                .unwrap_err();
            assert!(matches!(err, CicdError::NotApproved(_)));
        }
        assert_eq!(integrator.queue_len().await, 0);
        assert!(integrator.active_deployments().is_empty());
    }

    async fn wait_for_status(integrator: &CicdIntegrator, id: &TriggerId, status: DeploymentStatus) {
        for _ in 0..600 {
            if integrator.get_deployment(id).await.is_some_and(|r| r.status == status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("deployment {id} never reached {status}");
    }

    #[tokio::test]
    async fn refuses_triggers_while_stopped() {
        let integrator = Arc::new(CicdIntegrator::new(config(), Arc::new(InMemoryCicdProvider::succeeding())));
        let err = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CicdError::NotRunning));
        assert_eq!(integrator.queue_len().await, 0);
        assert!(integrator.active_deployments().is_empty());

        integrator.start().await.unwrap();
        integrator.stop().await;
        let err = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CicdError::NotRunning));
    }

    #[tokio::test(start_paused = true)]
    async fn processes_queue_in_order_to_success() {
        let provider = Arc::new(InMemoryCicdProvider::succeeding());
        let integrator = Arc::new(CicdIntegrator::new(config(), provider.clone()));
        integrator.start().await.unwrap();

        let first = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({"env": "prod"}))
            .await
            .unwrap();
        let second = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(
            integrator.get_deployment(&second.id()).await.unwrap().status,
            DeploymentStatus::Pending
        );

        let result = wait_finished(&integrator, &second.id()).await;
        assert_eq!(result.status, DeploymentStatus::Success);
        assert!(result.pipeline_url.is_some());
        assert!(result.started_at.is_some());
        assert!(result.completed_at.is_some());

        assert_eq!(provider.dispatched().await, vec![first.id(), second.id()]);
        let stats = integrator.statistics().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.successful, 2);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
        integrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_failure_fails_deployment() {
        let provider = Arc::new(InMemoryCicdProvider::failing_dispatch("workflow disabled"));
        let integrator = Arc::new(CicdIntegrator::new(config(), provider));
        integrator.start().await.unwrap();

        let trigger = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap();
        let result = wait_finished(&integrator, &trigger.id()).await;
        assert_eq!(result.status, DeploymentStatus::Failed);
        assert!(result.errors[0].contains("workflow disabled"));
        integrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn monitoring_horizon_fails_stuck_pipeline() {
        let provider = Arc::new(InMemoryCicdProvider::never_finishing());
        let integrator = Arc::new(CicdIntegrator::new(config(), provider));
        integrator.start().await.unwrap();

        let trigger = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap();
        let result = wait_finished(&integrator, &trigger.id()).await;
        assert_eq!(result.status, DeploymentStatus::Failed);
        assert!(result.errors.iter().any(|e| e.contains("timed out")));
        integrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failure_is_recorded() {
        let provider = Arc::new(InMemoryCicdProvider::with_script(vec![
            PipelineState::Queued,
            PipelineState::Failed("smoke tests failed".to_string()),
        ]));
        let integrator = Arc::new(CicdIntegrator::new(config(), provider));
        integrator.start().await.unwrap();

        let trigger = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap();
        let result = wait_finished(&integrator, &trigger.id()).await;
        assert_eq!(result.status, DeploymentStatus::Failed);
        assert_eq!(result.errors, vec!["smoke tests failed".to_string()]);
        assert_eq!(integrator.statistics().await.failed, 1);
        integrator.stop().await;
    }

    /// Started integrator with one deployment holding the consumer
    async fn blocked() -> (Arc<CicdIntegrator>, TriggerId) {
        let integrator = Arc::new(CicdIntegrator::new(
            CicdConfig {
                monitoring_horizon_secs: 3_600,
                ..config()
            },
            Arc::new(InMemoryCicdProvider::never_finishing()),
        ));
        integrator.start().await.unwrap();
        let blocker = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap();
        wait_for_status(&integrator, &blocker.id(), DeploymentStatus::Running).await;
        (integrator, blocker.id())
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_removes_queued_trigger() {
        let (integrator, blocker) = blocked().await;
        let trigger = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(integrator.queue_len().await, 1);

        let result = integrator.cancel_deployment(&trigger.id()).await.unwrap();
        assert_eq!(result.status, DeploymentStatus::Cancelled);
        assert_eq!(result.errors, vec!["cancelled while queued".to_string()]);
        assert_eq!(integrator.queue_len().await, 0);
        assert_eq!(integrator.history().await.len(), 1);
        assert_eq!(
            integrator.get_deployment(&blocker).await.unwrap().status,
            DeploymentStatus::Running
        );

        let err = integrator.cancel_deployment(&trigger.id()).await.unwrap_err();
        assert!(matches!(err, CicdError::NotFound(_)));
        integrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn provider_queue_is_reflected_before_running() {
        let integrator = Arc::new(CicdIntegrator::new(
            config(),
            Arc::new(InMemoryCicdProvider::with_script(vec![
                PipelineState::Queued,
                PipelineState::Queued,
                PipelineState::Succeeded,
            ])),
        ));
        integrator.start().await.unwrap();

        let trigger = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap();
        wait_for_status(&integrator, &trigger.id(), DeploymentStatus::Queued).await;
        let queued = integrator.get_deployment(&trigger.id()).await.unwrap();
        assert!(queued.started_at.is_none());

        let result = wait_finished(&integrator, &trigger.id()).await;
        assert_eq!(result.status, DeploymentStatus::Success);
        assert!(result.started_at.is_some());
        assert!(result.completed_at.is_some());
        integrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_in_flight_notifies_provider() {
        let provider = Arc::new(InMemoryCicdProvider::never_finishing());
        let integrator = Arc::new(CicdIntegrator::new(
            CicdConfig {
                monitoring_horizon_secs: 3_600,
                ..config()
            },
            provider.clone(),
        ));
        integrator.start().await.unwrap();

        let trigger = integrator
            .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
            .await
            .unwrap();
        for _ in 0..100 {
            let running = integrator
                .get_deployment(&trigger.id())
                .await
                .is_some_and(|r| r.status == DeploymentStatus::Running);
            if running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        integrator.cancel_deployment(&trigger.id()).await.unwrap();
        let result = wait_finished(&integrator, &trigger.id()).await;
        assert_eq!(result.status, DeploymentStatus::Cancelled);

        for _ in 0..100 {
            if integrator.active_deployments().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert_eq!(provider.cancelled().await, vec![trigger.id()]);
        integrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_bounded() {
        let integrator = Arc::new(CicdIntegrator::new(
            CicdConfig {
                history_limit: 2,
                monitoring_horizon_secs: 3_600,
                ..config()
            },
            Arc::new(InMemoryCicdProvider::never_finishing()),
        ));
        integrator.start().await.unwrap();
        for _ in 0..4 {
            let trigger = integrator
                .trigger_deployment(&evaluation(UpdateDecision::Approve), serde_json::json!({}))
                .await
                .unwrap();
            integrator.cancel_deployment(&trigger.id()).await.unwrap();
        }
        assert_eq!(integrator.history().await.len(), 2);
        integrator.stop().await;
    }
}

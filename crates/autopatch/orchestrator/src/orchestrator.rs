//! Self-update orchestrator

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::profile::select_rollout_profile;
use crate::snapshot::{
    DeploymentSnapshot, OrchestratorSnapshot, RolloutSnapshot, SimulatorSnapshot,
    WorkflowStatistics,
};
use autopatch_cicd::{CicdError, CicdIntegrator};
use autopatch_detector::{DetectorError, VersionDetector};
use autopatch_policy::{deployment_window, PolicyUpdate, UpdatePolicyEngine};
use autopatch_rollout::{RolloutController, RolloutError};
use autopatch_simulator::UpdateSimulator;
use autopatch_types::{
    BackgroundTask, DeploymentResult, DeploymentStatus, PolicyEvaluation, RolloutId,
    RolloutStatus, StopSignal, StopSource, TriggerId, UpdateDecision, UpdateEvent,
    UpdateEventEnvelope, UpdatePolicy, UpdateWorkflow, VersionComparison, WorkflowId,
    WorkflowStage,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

const EVENT_CAPACITY: usize = 256;

/// Why a workflow stopped short of `completed`
enum Halt {
    Failed(String),
    AwaitingApproval(String),
}

/// Top-level coordinator of the update pipeline.
///
/// Constructed explicitly by the process entry point and shared by `Arc`.
pub struct SelfUpdateOrchestrator {
    config: OrchestratorConfig,
    detector: Arc<VersionDetector>,
    simulator: Arc<UpdateSimulator>,
    policy: Arc<UpdatePolicyEngine>,
    cicd: Arc<CicdIntegrator>,
    rollout: Arc<RolloutController>,

    /// Workflows still moving through the pipeline
    active: DashMap<WorkflowId, UpdateWorkflow>,
    history: RwLock<VecDeque<UpdateWorkflow>>,
    /// Approved workflow id to the workflow that resumed it
    approvals: DashMap<WorkflowId, WorkflowId>,
    events: broadcast::Sender<UpdateEventEnvelope>,

    stop: StopSource,
    check_task: Mutex<Option<BackgroundTask>>,
    /// Checks and approvals started from the control surface
    detached: Mutex<JoinSet<()>>,
}

impl SelfUpdateOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        detector: Arc<VersionDetector>,
        simulator: Arc<UpdateSimulator>,
        policy: Arc<UpdatePolicyEngine>,
        cicd: Arc<CicdIntegrator>,
        rollout: Arc<RolloutController>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            detector,
            simulator,
            policy,
            cicd,
            rollout,
            active: DashMap::new(),
            history: RwLock::new(VecDeque::new()),
            approvals: DashMap::new(),
            events,
            stop: StopSource::new(),
            check_task: Mutex::new(None),
            detached: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn detector(&self) -> &Arc<VersionDetector> {
        &self.detector
    }

    pub fn simulator(&self) -> &Arc<UpdateSimulator> {
        &self.simulator
    }

    pub fn policy_engine(&self) -> &Arc<UpdatePolicyEngine> {
        &self.policy
    }

    pub fn cicd(&self) -> &Arc<CicdIntegrator> {
        &self.cicd
    }

    pub fn rollout(&self) -> &Arc<RolloutController> {
        &self.rollout
    }

    /// Receive workflow progress events
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEventEnvelope> {
        self.events.subscribe()
    }

    fn emit(&self, event: UpdateEvent) {
        // no subscribers is fine
        let _ = self.events.send(UpdateEventEnvelope::new(event));
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Start every component loop and the periodic update check.
    ///
    /// The first check runs immediately.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self.check_task.lock().await;
        if task.is_some() {
            return Err(OrchestratorError::AlreadyRunning);
        }
        self.stop.reset();
        self.simulator.start();
        match self.detector.start().await {
            Ok(()) | Err(DetectorError::AlreadyRunning) => {}
            Err(e) => return Err(e.into()),
        }
        match self.cicd.start().await {
            Ok(()) | Err(CicdError::AlreadyRunning) => {}
            Err(e) => return Err(e.into()),
        }
        match self.rollout.start().await {
            Ok(()) | Err(RolloutError::AlreadyRunning) => {}
            Err(e) => return Err(e.into()),
        }

        let orchestrator = Arc::clone(self);
        *task = Some(BackgroundTask::spawn_periodic(
            "update-check",
            self.config.check_interval(),
            move || {
                let orchestrator = Arc::clone(&orchestrator);
                async move {
                    orchestrator.check_and_process_updates().await;
                }
            },
        ));
        info!(
            check_interval_secs = self.config.check_interval_secs,
            provider = %self.cicd.provider_name(),
            "Self-update orchestrator started"
        );
        Ok(())
    }

    /// Stop the update check and every component, waiting for in-flight
    /// workflows to record their outcome.
    pub async fn stop(&self) {
        // Workflows observe the flag at their next wait.
        self.stop.stop();
        self.simulator.stop().await;
        self.cicd.stop().await;
        self.rollout.stop().await;

        if let Some(task) = self.check_task.lock().await.take() {
            task.shutdown().await;
        }
        let mut detached = self.detached.lock().await;
        while let Some(joined) = detached.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!("Detached orchestrator task panicked");
                }
            }
        }
        drop(detached);

        self.detector.stop().await;
        info!("Self-update orchestrator stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.check_task.lock().await.is_some()
    }

    // ── Update Checks ──────────────────────────────────────────────────

    /// Poll the detector and run a workflow for every available update.
    ///
    /// Components with a workflow already in flight, and versions already
    /// waiting for approval, are skipped.
    #[instrument(skip(self))]
    pub async fn check_and_process_updates(&self) -> Vec<UpdateWorkflow> {
        let report = self.detector.poll_once().await;
        for failed in report.failed_sources() {
            warn!(
                component = %failed.component,
                source = %failed.source,
                error = ?failed.error,
                "Version source unavailable"
            );
        }

        let candidates: Vec<VersionComparison> = self
            .detector
            .get_all_comparisons()
            .into_iter()
            .filter(|c| c.update_available)
            .collect();
        info!(candidates = candidates.len(), "Update check complete");

        let mut processed = Vec::new();
        for comparison in candidates {
            if self.stop.is_stopped() {
                break;
            }
            if self.has_active_workflow(&comparison.component) {
                info!(component = %comparison.component, "Workflow already in progress, skipping");
                continue;
            }
            if self
                .is_pending_approval(&comparison.component, &comparison.available_version)
                .await
            {
                continue;
            }
            processed.push(self.process_update(comparison, false).await);
        }
        processed
    }

    /// Run the check on a detached task
    pub async fn trigger_check(self: &Arc<Self>) {
        let orchestrator = Arc::clone(self);
        self.detached.lock().await.spawn(async move {
            orchestrator.check_and_process_updates().await;
        });
    }

    fn has_active_workflow(&self, component: &str) -> bool {
        self.active.iter().any(|w| w.component == component)
    }

    async fn is_pending_approval(&self, component: &str, version: &str) -> bool {
        self.history.read().await.iter().any(|w| {
            self.awaits_approval(w)
                && w.component == component
                && w.version == version
        })
    }

    /// Drive one candidate through the pipeline and return the finished
    /// workflow record.
    pub async fn process_update(
        &self,
        comparison: VersionComparison,
        manual_approval: bool,
    ) -> UpdateWorkflow {
        self.run_workflow(UpdateWorkflow::new(comparison, manual_approval))
            .await
    }

    // ── Manual Approval ────────────────────────────────────────────────

    /// Resume an `awaiting_approval` workflow with operator approval and
    /// run it to completion in a fresh workflow.
    pub async fn approve_workflow(&self, workflow_id: &WorkflowId) -> Result<UpdateWorkflow> {
        let resumed = self.claim_approval(workflow_id).await?;
        Ok(self.run_workflow(resumed).await)
    }

    /// Validate and claim the approval now, run the resumed workflow on a
    /// detached task. Returns the id of the resumed workflow.
    pub async fn approve_workflow_detached(
        self: &Arc<Self>,
        workflow_id: &WorkflowId,
    ) -> Result<WorkflowId> {
        let resumed = self.claim_approval(workflow_id).await?;
        let id = resumed.id;
        let orchestrator = Arc::clone(self);
        self.detached.lock().await.spawn(async move {
            orchestrator.run_workflow(resumed).await;
        });
        Ok(id)
    }

    async fn claim_approval(&self, workflow_id: &WorkflowId) -> Result<UpdateWorkflow> {
        if let Some(active) = self.active.get(workflow_id) {
            return Err(OrchestratorError::InvalidState {
                workflow_id: *workflow_id,
                stage: active.current_stage,
            });
        }

        let history = self.history.read().await;
        let pending = history
            .iter()
            .rev()
            .find(|w| w.id == *workflow_id)
            .ok_or(OrchestratorError::WorkflowNotFound(*workflow_id))?;
        if !pending.is_awaiting_approval() {
            return Err(OrchestratorError::InvalidState {
                workflow_id: *workflow_id,
                stage: pending.current_stage,
            });
        }
        let comparison = pending.version_comparison.clone().ok_or(
            OrchestratorError::InvalidState {
                workflow_id: *workflow_id,
                stage: pending.current_stage,
            },
        )?;

        let mut resumed = UpdateWorkflow::new(comparison, true);
        resumed.resumed_from = Some(*workflow_id);
        match self.approvals.entry(*workflow_id) {
            Entry::Occupied(_) => return Err(OrchestratorError::AlreadyApproved(*workflow_id)),
            Entry::Vacant(slot) => {
                slot.insert(resumed.id);
            }
        }
        info!(workflow_id = %workflow_id, resumed_id = %resumed.id, "Workflow approved");
        Ok(resumed)
    }

    // ── Workflow Execution ─────────────────────────────────────────────

    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id, component = %workflow.component, version = %workflow.version))]
    async fn run_workflow(&self, mut workflow: UpdateWorkflow) -> UpdateWorkflow {
        self.active.insert(workflow.id, workflow.clone());
        self.emit(UpdateEvent::WorkflowStarted {
            workflow_id: workflow.id,
            component: workflow.component.clone(),
            version: workflow.version.clone(),
            manual_approval: workflow.manual_approval,
        });
        info!(manual = workflow.manual_approval, "Workflow started");

        let mut stop = self.stop.signal();
        let outcome = self.drive(&mut workflow, &mut stop).await;

        let from = workflow.current_stage;
        match outcome {
            Ok(()) => {
                info!("Workflow completed");
                self.emit(UpdateEvent::WorkflowCompleted {
                    workflow_id: workflow.id,
                    component: workflow.component.clone(),
                    version: workflow.version.clone(),
                });
            }
            Err(Halt::AwaitingApproval(reason)) => {
                info!(reason = %reason, "Workflow awaiting approval");
                workflow.await_approval(reason.clone());
                self.emit_stage(&workflow, from);
                self.emit(UpdateEvent::AwaitingApproval {
                    workflow_id: workflow.id,
                    reason,
                });
            }
            Err(Halt::Failed(reason)) => {
                warn!(stage = %from, reason = %reason, "Workflow failed");
                workflow.fail(reason.clone());
                self.emit_stage(&workflow, from);
                self.emit(UpdateEvent::WorkflowFailed {
                    workflow_id: workflow.id,
                    error: reason,
                });
            }
        }

        self.archive(workflow.clone()).await;
        workflow
    }

    fn emit_stage(&self, workflow: &UpdateWorkflow, from: WorkflowStage) {
        if from != workflow.current_stage {
            self.emit(UpdateEvent::StageChanged {
                workflow_id: workflow.id,
                from,
                to: workflow.current_stage,
            });
        }
    }

    /// Advance and publish the workflow
    fn enter(&self, workflow: &mut UpdateWorkflow, next: WorkflowStage) -> std::result::Result<(), Halt> {
        let from = workflow.current_stage;
        workflow
            .advance(next)
            .map_err(|e| Halt::Failed(e.to_string()))?;
        self.save(workflow);
        self.emit_stage(workflow, from);
        Ok(())
    }

    fn save(&self, workflow: &UpdateWorkflow) {
        self.active.insert(workflow.id, workflow.clone());
    }

    async fn drive(
        &self,
        workflow: &mut UpdateWorkflow,
        stop: &mut StopSignal,
    ) -> std::result::Result<(), Halt> {
        let comparison = workflow
            .version_comparison
            .clone()
            .ok_or_else(|| Halt::Failed("workflow has no version comparison".to_string()))?;

        // Simulation
        self.enter(workflow, WorkflowStage::Simulation)?;
        let simulation = self
            .simulator
            .simulate_update(&comparison.candidate, &self.config.simulation)
            .await;
        workflow.simulation_result = Some(simulation.clone());
        self.save(workflow);
        if !simulation.is_success() {
            let mut reason = format!(
                "simulation {}: {}/{} tests passed",
                simulation.status, simulation.tests_passed, simulation.tests_run
            );
            if !simulation.errors.is_empty() {
                reason.push_str(&format!(" ({})", simulation.errors.join("; ")));
            }
            return Err(Halt::Failed(reason));
        }

        // Policy evaluation
        self.enter(workflow, WorkflowStage::PolicyEvaluation)?;
        let mut evaluation = self.policy.evaluate_update(&comparison, &simulation).await;
        if workflow.manual_approval
            && matches!(
                evaluation.decision,
                UpdateDecision::ManualReview | UpdateDecision::Defer
            )
        {
            info!(decision = %evaluation.decision, "Operator approval overrides policy decision");
            evaluation.reasons.push(format!(
                "Operator approval overrides {} decision",
                evaluation.decision
            ));
            evaluation.matched_policies.push("manual-approval".to_string());
            evaluation.decision = UpdateDecision::Approve;
            evaluation.deployment_window = Some(deployment_window(comparison.priority, Utc::now()));
        }
        workflow.policy_evaluation = Some(evaluation.clone());
        self.save(workflow);

        let summary = evaluation.reasons.join("; ");
        match evaluation.decision {
            UpdateDecision::Approve => {}
            UpdateDecision::Reject if workflow.manual_approval => {
                return Err(Halt::AwaitingApproval(format!(
                    "Rejected by policy despite operator approval: {summary}"
                )));
            }
            UpdateDecision::Reject => {
                return Err(Halt::Failed(format!("Rejected by policy: {summary}")));
            }
            UpdateDecision::ManualReview | UpdateDecision::Defer => {
                return Err(Halt::AwaitingApproval(format!(
                    "Policy decision {}: {summary}",
                    evaluation.decision
                )));
            }
        }

        // CI/CD dispatch
        self.enter(workflow, WorkflowStage::CicdTrigger)?;
        let trigger = self
            .cicd
            .trigger_deployment(&evaluation, self.deployment_config(workflow, &evaluation))
            .await
            .map_err(|e| Halt::Failed(format!("deployment trigger failed: {e}")))?;
        workflow.deployment_trigger = Some(trigger.clone());
        self.save(workflow);

        let deployment = self.wait_for_deployment(&trigger.id(), stop).await?;
        workflow.deployment_result = Some(deployment.clone());
        self.save(workflow);
        if deployment.status != DeploymentStatus::Success {
            return Err(Halt::Failed(format!(
                "deployment {}: {}",
                deployment.status,
                deployment.errors.join("; ")
            )));
        }

        // Rollout
        self.enter(workflow, WorkflowStage::Rollout)?;
        let profile = select_rollout_profile(comparison.priority, evaluation.risk_level);
        info!(strategy = %profile.strategy, risk = %evaluation.risk_level, "Rollout profile selected");
        let started = self
            .rollout
            .start_rollout(&workflow.component, &workflow.version, profile)
            .map_err(|e| Halt::Failed(format!("rollout start failed: {e}")))?;
        workflow.rollout_status = Some(started.clone());
        self.save(workflow);

        let finished = self
            .wait_for_rollout(&started.id, workflow, stop)
            .await
            .ok_or_else(|| Halt::Failed("interrupted by shutdown while rolling out".to_string()))?;
        workflow.rollout_status = Some(finished.clone());
        self.save(workflow);
        if !finished.is_complete() {
            return Err(Halt::Failed(format!(
                "rollout {}: {}",
                finished.phase,
                finished.errors.join("; ")
            )));
        }

        self.detector
            .set_current_version(workflow.component.clone(), workflow.version.clone());
        self.enter(workflow, WorkflowStage::Completed)
    }

    fn deployment_config(&self, workflow: &UpdateWorkflow, evaluation: &PolicyEvaluation) -> Value {
        let mut config = self.config.deployment_config.clone();
        config.insert("workflow_id".to_string(), json!(workflow.id.to_string()));
        config.insert("risk_level".to_string(), json!(evaluation.risk_level));
        config.insert("deployment_window".to_string(), json!(evaluation.deployment_window));
        config.insert("manual_approval".to_string(), json!(workflow.manual_approval));
        Value::Object(config)
    }

    /// Poll until the deployment is terminal.
    ///
    /// Every deployment ahead in the queue, plus the one in flight, gets the
    /// integrator's monitoring horizon; a deployment still open after that
    /// is cancelled and fails the workflow.
    async fn wait_for_deployment(
        &self,
        trigger_id: &TriggerId,
        stop: &mut StopSignal,
    ) -> std::result::Result<DeploymentResult, Halt> {
        let ahead = self.cicd.queue_len().await as u32;
        let horizon = self.cicd.config().monitoring_horizon() * (ahead + 1);
        let deadline = Instant::now() + horizon;

        loop {
            if let Some(result) = self.cicd.get_deployment(trigger_id).await {
                if result.is_terminal() {
                    return Ok(result);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(trigger_id = %trigger_id, waited_secs = horizon.as_secs(), "Deployment did not finish in time");
                if let Err(e) = self.cicd.cancel_deployment(trigger_id).await {
                    warn!(trigger_id = %trigger_id, error = %e, "Cancelling overdue deployment failed");
                }
                return Err(Halt::Failed(format!(
                    "deployment {trigger_id} did not finish within {}s",
                    horizon.as_secs()
                )));
            }
            let wait = self.config.poll_interval().min(deadline - now);
            if !stop.sleep(wait).await {
                return Err(Halt::Failed(
                    "interrupted by shutdown while deploying".to_string(),
                ));
            }
        }
    }

    /// Poll the rollout, mirroring progress onto the workflow
    async fn wait_for_rollout(
        &self,
        rollout_id: &RolloutId,
        workflow: &mut UpdateWorkflow,
        stop: &mut StopSignal,
    ) -> Option<RolloutStatus> {
        loop {
            if let Some(status) = self.rollout.get_rollout(rollout_id).await {
                if status.is_terminal() {
                    return Some(status);
                }
                workflow.rollout_status = Some(status);
                self.save(workflow);
            }
            if !stop.sleep(self.config.poll_interval()).await {
                return self
                    .rollout
                    .get_rollout(rollout_id)
                    .await
                    .filter(RolloutStatus::is_terminal);
            }
        }
    }

    async fn archive(&self, workflow: UpdateWorkflow) {
        self.active.remove(&workflow.id);
        let mut history = self.history.write().await;
        history.push_back(workflow);
        while history.len() > self.config.history_limit {
            if let Some(evicted) = history.pop_front() {
                self.approvals.remove(&evicted.id);
            }
        }
    }

    fn awaits_approval(&self, workflow: &UpdateWorkflow) -> bool {
        workflow.is_awaiting_approval() && !self.approvals.contains_key(&workflow.id)
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Workflows halted at `awaiting_approval` that nobody approved yet
    pub async fn pending_approvals(&self) -> Vec<UpdateWorkflow> {
        self.history
            .read()
            .await
            .iter()
            .filter(|w| self.awaits_approval(w))
            .cloned()
            .collect()
    }

    /// The workflow started by approving `workflow_id`, if it was approved
    pub fn approved_as(&self, workflow_id: &WorkflowId) -> Option<WorkflowId> {
        self.approvals.get(workflow_id).map(|resumed| *resumed)
    }

    pub async fn get_workflow(&self, workflow_id: &WorkflowId) -> Option<UpdateWorkflow> {
        if let Some(active) = self.active.get(workflow_id) {
            return Some(active.clone());
        }
        self.history
            .read()
            .await
            .iter()
            .rev()
            .find(|w| w.id == *workflow_id)
            .cloned()
    }

    pub fn active_workflows(&self) -> Vec<UpdateWorkflow> {
        let mut active: Vec<UpdateWorkflow> =
            self.active.iter().map(|e| e.value().clone()).collect();
        active.sort_by_key(|w| w.started_at);
        active
    }

    pub async fn workflow_history(&self) -> Vec<UpdateWorkflow> {
        self.history.read().await.iter().cloned().collect()
    }

    pub async fn list_policies(&self) -> Vec<UpdatePolicy> {
        self.policy.list_policies().await
    }

    pub async fn update_policy(&self, name: &str, update: PolicyUpdate) -> Result<UpdatePolicy> {
        Ok(self.policy.update_policy(name, update).await?)
    }

    pub async fn workflow_statistics(&self) -> WorkflowStatistics {
        let history = self.history.read().await;
        WorkflowStatistics::collect(self.active.len(), history.iter())
    }

    /// Serializable state of every component
    pub async fn snapshot(&self) -> OrchestratorSnapshot {
        let history = self.workflow_history().await;
        let recent: Vec<UpdateWorkflow> = history.iter().rev().take(20).cloned().collect();

        OrchestratorSnapshot {
            generated_at: Utc::now(),
            running: self.is_running().await,
            config: self.config.clone(),
            workflows: WorkflowStatistics::collect(self.active.len(), history.iter()),
            active_workflows: self.active_workflows(),
            pending_approvals: self.pending_approvals().await,
            recent_workflows: recent,
            detector: self.detector.snapshot().await,
            simulator: SimulatorSnapshot {
                active: self.simulator.active_simulations(),
                statistics: self.simulator.statistics().await,
            },
            policies: self.policy.list_policies().await,
            policy_statistics: self.policy.statistics().await,
            deployments: DeploymentSnapshot {
                provider: self.cicd.provider_name().to_string(),
                running: self.cicd.is_running().await,
                queue_len: self.cicd.queue_len().await,
                active: self.cicd.active_deployments(),
                statistics: self.cicd.statistics().await,
            },
            rollouts: RolloutSnapshot {
                running: self.rollout.is_running().await,
                active: self.rollout.active_rollouts(),
                statistics: self.rollout.statistics().await,
            },
        }
    }
}

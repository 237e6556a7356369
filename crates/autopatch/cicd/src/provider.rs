//! CI/CD provider seam

use crate::error::{CicdError, Result};
use async_trait::async_trait;
use autopatch_types::{DeploymentTrigger, TriggerId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// What a provider returns when it accepts a deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub pipeline_url: Option<String>,
    pub logs_url: Option<String>,
    /// Provider-side run, pipeline or build identifier
    pub external_id: Option<String>,
}

/// Pipeline state as reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Queued,
    Running,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled)
    }
}

/// External build/deploy system.
///
/// A successful `dispatch` means the request was accepted into the
/// provider's queue, not that the deployment finished.
#[async_trait]
pub trait CicdProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn dispatch(&self, trigger: &DeploymentTrigger) -> Result<DispatchReceipt>;

    async fn poll(
        &self,
        trigger: &DeploymentTrigger,
        receipt: &DispatchReceipt,
    ) -> Result<PipelineState>;

    async fn cancel(&self, _trigger: &DeploymentTrigger, _receipt: &DispatchReceipt) -> Result<()> {
        Ok(())
    }
}

// ── In-Memory Provider ─────────────────────────────────────────────────

/// Scripted provider: each poll returns the next scripted state, and the
/// last state repeats once the script runs out.
#[derive(Debug)]
pub struct InMemoryCicdProvider {
    script: Vec<PipelineState>,
    dispatch_error: Option<String>,
    runs: Mutex<Vec<(TriggerId, VecDeque<PipelineState>)>>,
    cancelled: Mutex<Vec<TriggerId>>,
}

impl InMemoryCicdProvider {
    pub fn with_script(script: Vec<PipelineState>) -> Self {
        Self {
            script,
            dispatch_error: None,
            runs: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// One poll running, then success
    pub fn succeeding() -> Self {
        Self::with_script(vec![PipelineState::Running, PipelineState::Succeeded])
    }

    /// Reports running forever
    pub fn never_finishing() -> Self {
        Self::with_script(vec![PipelineState::Running])
    }

    /// Rejects every dispatch with `reason`
    pub fn failing_dispatch(reason: impl Into<String>) -> Self {
        Self {
            dispatch_error: Some(reason.into()),
            ..Self::with_script(Vec::new())
        }
    }

    /// Triggers dispatched so far, in dispatch order
    pub async fn dispatched(&self) -> Vec<TriggerId> {
        self.runs.lock().await.iter().map(|(id, _)| *id).collect()
    }

    pub async fn cancelled(&self) -> Vec<TriggerId> {
        self.cancelled.lock().await.clone()
    }
}

#[async_trait]
impl CicdProvider for InMemoryCicdProvider {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn dispatch(&self, trigger: &DeploymentTrigger) -> Result<DispatchReceipt> {
        if let Some(reason) = &self.dispatch_error {
            return Err(CicdError::Dispatch {
                provider: self.name().to_string(),
                reason: reason.clone(),
            });
        }
        let mut runs = self.runs.lock().await;
        runs.push((trigger.id(), self.script.iter().cloned().collect()));
        let number = runs.len();
        Ok(DispatchReceipt {
            pipeline_url: Some(format!("memory://pipelines/{number}")),
            logs_url: Some(format!("memory://pipelines/{number}/logs")),
            external_id: Some(number.to_string()),
        })
    }

    async fn poll(
        &self,
        trigger: &DeploymentTrigger,
        _receipt: &DispatchReceipt,
    ) -> Result<PipelineState> {
        let mut runs = self.runs.lock().await;
        let Some((_, states)) = runs.iter_mut().find(|(id, _)| *id == trigger.id()) else {
            return Err(CicdError::NotFound(trigger.id()));
        };
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().cloned()
        };
        Ok(state.unwrap_or(PipelineState::Running))
    }

    async fn cancel(&self, trigger: &DeploymentTrigger, _receipt: &DispatchReceipt) -> Result<()> {
        self.cancelled.lock().await.push(trigger.id());
        Ok(())
    }
}

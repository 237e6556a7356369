//! Policy, deployment and rollout handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use autopatch_cicd::DeploymentStatistics;
use autopatch_policy::{PolicyStatistics, PolicyUpdate, UpdatePolicy};
use autopatch_rollout::{RolloutStatistics, RolloutStatus};
use autopatch_types::DeploymentResult;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

/// Policy listing
#[derive(Debug, Serialize)]
pub struct PolicyListResponse {
    pub policies: Vec<UpdatePolicy>,
    pub statistics: PolicyStatistics,
}

/// List policies in evaluation order
pub async fn list_policies(State(state): State<AppState>) -> Json<PolicyListResponse> {
    Json(PolicyListResponse {
        policies: state.orchestrator.list_policies().await,
        statistics: state.orchestrator.policy_engine().statistics().await,
    })
}

/// Partially update a policy
pub async fn update_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(update): Json<PolicyUpdate>,
) -> ApiResult<Json<UpdatePolicy>> {
    let policy = state.orchestrator.update_policy(&name, update).await?;

    tracing::info!(
        policy = %policy.name,
        enabled = policy.enabled,
        priority = policy.priority,
        "Policy updated"
    );

    Ok(Json(policy))
}

/// Deployment listing
#[derive(Debug, Serialize)]
pub struct DeploymentListResponse {
    pub provider: String,
    pub queue_len: usize,
    pub statistics: DeploymentStatistics,
    pub active: Vec<DeploymentResult>,
    pub history: Vec<DeploymentResult>,
}

/// List queued, running and finished deployments
pub async fn list_deployments(State(state): State<AppState>) -> Json<DeploymentListResponse> {
    let cicd = state.orchestrator.cicd();
    Json(DeploymentListResponse {
        provider: cicd.provider_name().to_string(),
        queue_len: cicd.queue_len().await,
        statistics: cicd.statistics().await,
        active: cicd.active_deployments(),
        history: cicd.history().await,
    })
}

/// Rollout listing
#[derive(Debug, Serialize)]
pub struct RolloutListResponse {
    pub statistics: RolloutStatistics,
    pub active: Vec<RolloutStatus>,
    pub history: Vec<RolloutStatus>,
}

/// List in-flight and finished rollouts
pub async fn list_rollouts(State(state): State<AppState>) -> Json<RolloutListResponse> {
    let rollout = state.orchestrator.rollout();
    Json(RolloutListResponse {
        statistics: rollout.statistics().await,
        active: rollout.active_rollouts(),
        history: rollout.history().await,
    })
}

//! Update check and workflow handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use autopatch_orchestrator::{UpdateWorkflow, WorkflowId, WorkflowStatistics};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

/// Response for requests that start background work
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
    pub message: String,
}

/// Run an update check in the background
pub async fn trigger_check(State(state): State<AppState>) -> (StatusCode, Json<AcceptedResponse>) {
    state.orchestrator.trigger_check().await;
    tracing::info!("Update check requested");

    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            message: "update check started".to_string(),
        }),
    )
}

/// Workflow listing
#[derive(Debug, Serialize)]
pub struct WorkflowListResponse {
    pub statistics: WorkflowStatistics,
    pub active: Vec<UpdateWorkflow>,
    pub history: Vec<UpdateWorkflow>,
}

/// List active and finished workflows
pub async fn list_workflows(State(state): State<AppState>) -> Json<WorkflowListResponse> {
    let orchestrator = &state.orchestrator;
    Json(WorkflowListResponse {
        statistics: orchestrator.workflow_statistics().await,
        active: orchestrator.active_workflows(),
        history: orchestrator.workflow_history().await,
    })
}

/// Workflows waiting for operator approval
pub async fn pending_workflows(State(state): State<AppState>) -> Json<Vec<UpdateWorkflow>> {
    Json(state.orchestrator.pending_approvals().await)
}

/// A workflow plus the workflow that resumed it after approval
#[derive(Debug, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: UpdateWorkflow,
    pub approved_as: Option<WorkflowId>,
}

/// Get a specific workflow
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowDetail>> {
    let workflow_id = parse_workflow_id(&id)?;
    let workflow = state
        .orchestrator
        .get_workflow(&workflow_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Workflow {} not found", id)))?;
    Ok(Json(WorkflowDetail {
        approved_as: state.orchestrator.approved_as(&workflow_id),
        workflow,
    }))
}

/// Approval response
#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub approved: WorkflowId,
    /// Workflow that carries the update forward
    pub resumed_workflow_id: WorkflowId,
}

/// Approve a workflow halted at `awaiting_approval`.
///
/// The resumed workflow runs in the background.
pub async fn approve_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<ApproveResponse>)> {
    let workflow_id = parse_workflow_id(&id)?;
    let resumed = state
        .orchestrator
        .approve_workflow_detached(&workflow_id)
        .await?;

    tracing::info!(
        workflow_id = %workflow_id,
        resumed_workflow_id = %resumed,
        "Workflow approved"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ApproveResponse {
            approved: workflow_id,
            resumed_workflow_id: resumed,
        }),
    ))
}

fn parse_workflow_id(id: &str) -> ApiResult<WorkflowId> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid workflow ID: {}", id)))
}

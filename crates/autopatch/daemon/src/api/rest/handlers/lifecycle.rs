//! Orchestrator lifecycle handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use serde::Serialize;

/// Orchestrator run state
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub running: bool,
}

/// Start the orchestrator and every component loop
pub async fn start_orchestrator(State(state): State<AppState>) -> ApiResult<Json<LifecycleResponse>> {
    state.orchestrator.start().await?;
    Ok(Json(LifecycleResponse {
        running: state.orchestrator.is_running().await,
    }))
}

/// Stop the orchestrator; in-flight workflows record their outcome first
pub async fn stop_orchestrator(State(state): State<AppState>) -> Json<LifecycleResponse> {
    state.orchestrator.stop().await;
    Json(LifecycleResponse {
        running: state.orchestrator.is_running().await,
    })
}

//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health and status
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::daemon_status))
        // Update checks
        .route("/updates/check", post(handlers::trigger_check))
        // Workflows
        .route("/workflows", get(handlers::list_workflows))
        .route("/workflows/pending", get(handlers::pending_workflows))
        .route("/workflows/:id", get(handlers::get_workflow))
        .route("/workflows/:id/approve", post(handlers::approve_workflow))
        // Policies
        .route("/policies", get(handlers::list_policies))
        .route("/policies/:name", put(handlers::update_policy))
        // Deployments and rollouts
        .route("/deployments", get(handlers::list_deployments))
        .route("/rollouts", get(handlers::list_rollouts))
        // Orchestrator lifecycle
        .route("/orchestrator/start", post(handlers::start_orchestrator))
        .route("/orchestrator/stop", post(handlers::stop_orchestrator));

    // Build router with middleware
    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

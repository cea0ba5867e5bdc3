use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    handlers::{health, jobs, worker},
};

/// Job API, backend callbacks and the worker endpoint.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/jobs/{id}/restart", post(jobs::restart_job))
        .route("/jobs/{id}/fail", post(jobs::fail_job))
        .route("/jobs/{id}/executions", get(jobs::list_executions))
        .route(
            "/jobs/{id}/executions/{execution_id}",
            get(jobs::get_execution),
        )
        .route(
            "/jobs/{id}/executions/{execution_id}/notifications",
            post(worker::receive_notification),
        )
        .route("/worker", post(worker::execute))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

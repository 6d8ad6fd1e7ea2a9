use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    entity_sets: usize,
    analyses: usize,
    running_jobs: usize,
}

/// Health check endpoint
///
/// Reports liveness plus store and job-runner gauges.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            entity_sets: state.service.store().len(),
            analyses: state.service.analyses().len(),
            running_jobs: state.runner.running_jobs(),
        }),
    )
}

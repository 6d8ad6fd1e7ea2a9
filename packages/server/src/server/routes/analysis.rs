//! REST surface for union analyses.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::common::ServiceError;
use crate::domains::entityset::models::{
    AnalysisId, DerivedEntitySetDefinition, UnionAnalysisResult,
};
use crate::server::app::AppState;

/// POST /v1/analysis/union
///
/// Always asynchronous; returns 202 with the pending analysis.
pub async fn create_union_analysis(
    Extension(state): Extension<AppState>,
    Json(definition): Json<DerivedEntitySetDefinition>,
) -> Result<(StatusCode, Json<UnionAnalysisResult>), ServiceError> {
    let analysis = state.service.analyze(definition).await?;
    Ok((StatusCode::ACCEPTED, Json(analysis)))
}

/// GET /v1/analysis/union/{id}
pub async fn get_union_analysis(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UnionAnalysisResult>, ServiceError> {
    Ok(Json(state.service.get_analysis(AnalysisId::from_uuid(id))?))
}

/// POST /v1/analysis/union/preview
///
/// A capped literal sample of the union result, computed synchronously and
/// never persisted.
pub async fn preview_union(
    Extension(state): Extension<AppState>,
    Json(definition): Json<DerivedEntitySetDefinition>,
) -> Result<Json<Vec<String>>, ServiceError> {
    Ok(Json(state.service.preview(&definition)?))
}

//! REST surface for entity sets.
//!
//! `POST /v1/entityset` and `POST /v1/entityset/union` accept an `async`
//! query parameter (default true). Asynchronous submissions return the
//! pending record immediately; callers poll `GET /v1/entityset/{id}` until
//! the state is terminal.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::common::ServiceError;
use crate::domains::entityset::export::{export_members, write_manifest, ChannelWriter};
use crate::domains::entityset::models::{
    DerivedEntitySetDefinition, EntitySet, EntitySetDefinition, EntityType, SetId,
};
use crate::server::app::AppState;

#[derive(Deserialize)]
pub struct CreateParams {
    /// Set to false if a synchronous request is needed.
    #[serde(rename = "async", default = "default_async")]
    pub run_async: bool,
}

fn default_async() -> bool {
    true
}

#[derive(Deserialize)]
pub struct RenameBody {
    pub name: String,
}

/// POST /v1/entityset
pub async fn create_set(
    Extension(state): Extension<AppState>,
    Query(params): Query<CreateParams>,
    Json(definition): Json<EntitySetDefinition>,
) -> Result<(StatusCode, Json<EntitySet>), ServiceError> {
    let set = state.service.create(definition, params.run_async).await?;
    Ok((StatusCode::CREATED, Json(set)))
}

/// POST /v1/entityset/union
pub async fn union_sets(
    Extension(state): Extension<AppState>,
    Query(params): Query<CreateParams>,
    Json(definition): Json<DerivedEntitySetDefinition>,
) -> Result<(StatusCode, Json<EntitySet>), ServiceError> {
    let set = state.service.combine(definition, params.run_async).await?;
    Ok((StatusCode::CREATED, Json(set)))
}

/// GET /v1/entityset/{id}
pub async fn get_set(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EntitySet>, ServiceError> {
    Ok(Json(state.service.get(SetId::from_uuid(id))?))
}

/// PUT /v1/entityset/{id}
pub async fn rename_set(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RenameBody>,
) -> Result<Json<EntitySet>, ServiceError> {
    Ok(Json(state.service.rename(SetId::from_uuid(id), &body.name)?))
}

/// DELETE /v1/entityset/{id}
pub async fn delete_set(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.service.delete(SetId::from_uuid(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/entityset/sets/{id1,id2,...}
///
/// Tolerant read: malformed or unknown ids are omitted, not errors.
pub async fn get_sets(
    Extension(state): Extension<AppState>,
    Path(ids): Path<String>,
) -> Json<Vec<EntitySet>> {
    let parsed: Vec<SetId> = ids
        .split(',')
        .filter_map(|raw| raw.trim().parse().ok())
        .collect();
    Json(state.service.get_many(&parsed))
}

/// GET /v1/entityset/{id}/export
///
/// Streams the member list as tab-separated rows; 204 until the set is
/// finished.
pub async fn export_set(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let set = state.service.get(SetId::from_uuid(id))?;
    if !set.state.is_finished() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let members = state.service.members(&set)?;
    let symbols = if set.entity_type == EntityType::Gene {
        state
            .resolver
            .display_symbols(set.entity_type, members.as_slice())
            .await?
    } else {
        HashMap::new()
    };

    let filename = format!("{}.tsv", set.id);
    let (tx, rx) = mpsc::channel::<Bytes>(8);
    tokio::task::spawn_blocking(move || {
        let writer = ChannelWriter::new(tx);
        if let Err(e) = export_members(&set, members.as_slice(), &symbols, writer) {
            tracing::warn!(set_id = %set.id, error = %e, "export stream aborted");
        }
    });

    stream_response(rx, "text/tab-separated-values", &filename)
}

/// GET /v1/entityset/{id}/manifest
///
/// Streams a gzip manifest of the set grouped by source repository; 204
/// until the set is finished.
pub async fn manifest_set(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let set = state.service.get(SetId::from_uuid(id))?;
    if !set.state.is_finished() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let members = state.service.members(&set)?;
    let repositories = state.resolver.repositories(members.as_slice()).await?;

    let filename = format!("manifest.{}.gz", set.id);
    let (tx, rx) = mpsc::channel::<Bytes>(8);
    tokio::task::spawn_blocking(move || {
        let writer = ChannelWriter::new(tx);
        if let Err(e) = write_manifest(&set, &repositories, Utc::now(), writer) {
            tracing::warn!(set_id = %set.id, error = %e, "manifest stream aborted");
        }
    });

    stream_response(rx, "application/gzip", &filename)
}

fn stream_response(
    rx: mpsc::Receiver<Bytes>,
    content_type: &str,
    filename: &str,
) -> Result<Response, ServiceError> {
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ServiceError::Internal(e.into()))
}

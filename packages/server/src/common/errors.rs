//! Error taxonomy for the entity-set API.
//!
//! Validation failures and missing identifiers surface as HTTP errors.
//! Materialization failures never do: by the time they happen the original
//! request has already returned, so they are captured on the record as an
//! `error` state and observed through polling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced to API clients by the entity-set service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("no entity set found for id '{0}'")]
    NotFound(Uuid),

    #[error("export unavailable: {0}")]
    Export(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidDefinition(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Export(_) => StatusCode::CONFLICT,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

//! Error types for the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use taskport_store::{AllocationError, StoreError};
use thiserror::Error;
use tracing::{error, warn};

/// Errors a request handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed path parameter or body.
    #[error("{0}")]
    BadRequest(String),

    /// Target record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// No fresh id could be allocated; the request must not fall back to another source.
    #[error("failed to generate id")]
    Allocation(#[from] AllocationError),

    /// Document store error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A stored document did not match its API shape.
    #[error("failed to decode stored document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Allocation(e) => {
                error!(error = %e, "id allocation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Store(e) => {
                warn!(error = %e, "store operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Decode(e) => {
                warn!(error = %e, "stored document failed to decode");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

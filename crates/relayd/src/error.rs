//! Errors returned by HTTP handlers and their wire representation.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use crate::relay::ValidationError;
use crate::store::StoreError;

pub const INVALID_STATE_MESSAGE: &str = "Valid state (on/off) is required";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The client sent no state or an unrecognized one.
    #[error(transparent)]
    InvalidState(#[from] ValidationError),

    /// The store could not be reached or rejected the operation.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Body of every error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::InvalidState(e) => {
                tracing::debug!("Rejected command: {}", e);
                INVALID_STATE_MESSAGE
            }
            ApiError::Storage(e) => {
                tracing::error!("State store error: {}", e);
                INTERNAL_ERROR_MESSAGE
            }
        };

        (self.status(), Json(ErrorResponse { error: message })).into_response()
    }
}

//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kameo::error::SendError;
use serde::{Deserialize, Serialize};
use signhost_core::CoreError;
use tracing::error;
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

impl ApiError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Wrapper for API errors with status codes
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ApiError,
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let (status, code) = match &err {
            CoreError::NotFound(_) | CoreError::BackupUnavailable(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            CoreError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "INVALID_ADDRESS"),
            CoreError::InvalidSnapshot(_) => (StatusCode::BAD_REQUEST, "INVALID_SNAPSHOT"),
            CoreError::AddressInUse(_) => (StatusCode::CONFLICT, "ADDRESS_IN_USE"),
            CoreError::StoreIo(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_IO"),
            CoreError::PeerUnreachable { .. } => (StatusCode::BAD_GATEWAY, "PEER_UNREACHABLE"),
            CoreError::Discovery(_) | CoreError::ActorError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        Self {
            status,
            error: ApiError::new(code, err.to_string()),
        }
    }
}

impl<M> From<SendError<M, CoreError>> for AppError {
    fn from(err: SendError<M, CoreError>) -> Self {
        CoreError::from(err).into()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

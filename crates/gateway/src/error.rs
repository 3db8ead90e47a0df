//! Gateway error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ShardError;
use messaging::MessagingError;
use saga::SagaError;
use saga_log::SagaLogError;
use thiserror::Error;

/// Errors of the checkout wait bridge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A checkout of this order is already waiting for its saga.
    #[error("Checkout already in progress for order {0}")]
    AlreadyInProgress(String),

    /// The gateway is shutting down.
    #[error("Checkout gateway is closed")]
    Closed,
}

/// Errors raised while wiring the system at startup.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),

    #[error("Saga log error: {0}")]
    Log(#[from] SagaLogError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Shard configuration error: {0}")]
    Shard(#[from] ShardError),

    #[error("Unsupported configuration: {0}")]
    Unsupported(String),
}

/// Convenience type alias for gateway startup results.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout bridge refused the request.
    Bridge(BridgeError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Bridge(err) => bridge_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn bridge_error_to_response(err: BridgeError) -> (StatusCode, String) {
    match &err {
        BridgeError::AlreadyInProgress(_) => (StatusCode::CONFLICT, err.to_string()),
        BridgeError::Closed => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        ApiError::Bridge(err)
    }
}

impl From<SagaLogError> for ApiError {
    fn from(err: SagaLogError) -> Self {
        match err {
            SagaLogError::SagaNotFound(id) => ApiError::NotFound(format!("Saga not found: {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

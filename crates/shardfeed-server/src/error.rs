//! Server error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use shardfeed_core::EngineError;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The subscriber endpoint could not be started. Fatal.
    #[error("failed to start change feed endpoint on {addr}: {source}")]
    Startup {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] shardfeed_core::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::Engine(EngineError::IndexExists(_)) => {
                (StatusCode::CONFLICT, "INDEX_EXISTS")
            }
            ApiError::Engine(EngineError::IndexNotFound(_)) => {
                (StatusCode::NOT_FOUND, "INDEX_NOT_FOUND")
            }
            ApiError::Engine(EngineError::DocumentExists { .. }) => {
                (StatusCode::CONFLICT, "DOCUMENT_EXISTS")
            }
            ApiError::Engine(EngineError::DocumentNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "DOCUMENT_NOT_FOUND")
            }
            ApiError::Engine(EngineError::InvalidShards(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_SHARDS")
            }
            ApiError::Engine(EngineError::InvalidReplicas(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_REPLICAS")
            }
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

//! Error types for the data manager
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Data Error Enum ==
/// Unified error type for the data manager and the gateway.
///
/// Cloneable so one failed fetch can be handed to every caller that was
/// waiting on it.
#[derive(Error, Debug, Clone)]
pub enum DataError {
    /// Fetcher failed after all retries and no cached value was available
    #[error("Fetch failed for '{key}': {cause:#}")]
    Fetch {
        key: String,
        cause: Arc<anyhow::Error>,
    },

    /// Key holds a value of a different type than the caller asked for
    #[error("Type mismatch for key '{0}'")]
    TypeMismatch(String),

    /// Fetch task ended without producing a result
    #[error("Fetch aborted for '{key}': {reason}")]
    Aborted { key: String, reason: String },

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl DataError {
    /// Wraps a fetcher error for `key`.
    pub fn fetch(key: impl Into<String>, cause: anyhow::Error) -> Self {
        DataError::Fetch {
            key: key.into(),
            cause: Arc::new(cause),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for DataError {
    fn into_response(self) -> Response {
        let status = match &self {
            DataError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            DataError::TypeMismatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DataError::Aborted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DataError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the data manager.
pub type Result<T> = std::result::Result<T, DataError>;

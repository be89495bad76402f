//! Response envelopes
//!
//! Successful replies are wrapped as `{"code": 0, "data": ...}`. Failures are
//! reported as `{"success": false, "message": ..., "error": ...}`, with `path`
//! in place of `error` for unmatched routes.

use crate::backend::BackendError;
use crate::gateway::Operation;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

pub const NOT_FOUND_MESSAGE: &str = "not found";
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";
pub const INVALID_BODY_MESSAGE: &str = "invalid request body";
pub const INVALID_PATH_MESSAGE: &str = "invalid request path";

/// Success envelope
#[derive(Debug, Clone, Serialize)]
pub struct Success<T> {
    pub code: i32,
    pub data: T,
}

impl<T> Success<T> {
    pub fn new(data: T) -> Self {
        Self { code: 0, data }
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Error envelope
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub success: bool,
    pub message: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Any failure that ends a request
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{op} failed: {source}")]
    Backend {
        op: Operation,
        #[source]
        source: BackendError,
    },

    /// The body could not be read or is not a JSON object; `status` is 400 for
    /// malformed JSON and the extractor's own status otherwise (e.g. 413)
    #[error("invalid request body: {detail}")]
    InvalidBody { status: StatusCode, detail: String },

    #[error("invalid request path: {0}")]
    InvalidPath(String),

    #[error("no route for {path}")]
    NotFound { path: String },

    /// A fault that escaped normal handling; `expose` controls whether
    /// `detail` reaches the caller
    #[error("internal fault: {detail}")]
    Internal { detail: String, expose: bool },
}

impl ApiError {
    /// HTTP status of the reply
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Backend { source, .. } => match source {
                BackendError::Status { status, .. } => {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                }
                BackendError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                BackendError::InvalidUrl(_) => StatusCode::NOT_FOUND,
                BackendError::Unreachable(_) | BackendError::Decode(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::InvalidBody { status, .. } => *status,
            ApiError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error envelope of the reply
    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::Backend { op, source } => {
                let (message, detail) = match source {
                    BackendError::Status { reason, body, .. } => {
                        (backend_message(*op, body), reason.clone())
                    }
                    BackendError::Unreachable(msg)
                    | BackendError::Timeout(msg)
                    | BackendError::Decode(msg) => {
                        (Value::from(op.failure_message()), msg.clone())
                    }
                    other => (Value::from(op.failure_message()), other.to_string()),
                };
                ErrorBody {
                    success: false,
                    message,
                    error: Some(detail),
                    path: None,
                }
            }
            ApiError::InvalidBody { detail, .. } => ErrorBody {
                success: false,
                message: Value::from(INVALID_BODY_MESSAGE),
                error: Some(detail.clone()),
                path: None,
            },
            ApiError::InvalidPath(detail) => ErrorBody {
                success: false,
                message: Value::from(INVALID_PATH_MESSAGE),
                error: Some(detail.clone()),
                path: None,
            },
            ApiError::NotFound { path } => ErrorBody {
                success: false,
                message: Value::from(NOT_FOUND_MESSAGE),
                error: None,
                path: Some(path.clone()),
            },
            ApiError::Internal { detail, expose } => ErrorBody {
                success: false,
                message: Value::from(INTERNAL_ERROR_MESSAGE),
                error: expose.then(|| detail.clone()),
                path: None,
            },
        }
    }
}

/// The backend's own body if it sent one, JSON when it parses
fn backend_message(op: Operation, body: &str) -> Value {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Value::from(op.failure_message());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::from(trimmed))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self);
        } else {
            debug!(status = status.as_u16(), "{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

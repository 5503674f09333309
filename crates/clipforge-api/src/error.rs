//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Duplicate submission: {0}")]
    Duplicate(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Duplicate(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs, not the response body.
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(detail, "Internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<clipforge_records::RecordsError> for ApiError {
    fn from(e: clipforge_records::RecordsError) -> Self {
        use clipforge_records::RecordsError;
        match e {
            RecordsError::JobNotFound(_) | RecordsError::ClipNotFound(_) => ApiError::NotFound,
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<clipforge_queue::QueueError> for ApiError {
    fn from(e: clipforge_queue::QueueError) -> Self {
        match e {
            clipforge_queue::QueueError::Duplicate(key) => ApiError::Duplicate(key),
            other => ApiError::internal(other.to_string()),
        }
    }
}

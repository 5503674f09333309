//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Duplicate job rejected: {0}")]
    Duplicate(String),

    #[error("Lease for job {0} is held by another worker")]
    LeaseHeld(String),

    #[error("Lease for job {0} was lost")]
    LeaseLost(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn duplicate(key: impl Into<String>) -> Self {
        Self::Duplicate(key.into())
    }
}

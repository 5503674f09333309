//! Record store error types.

use thiserror::Error;

use clipforge_models::JobStatus;

pub type RecordsResult<T> = Result<T, RecordsError>;

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Clip not found: {0}")]
    ClipNotFound(String),

    #[error("Illegal status transition {from} -> {to} for job {job_id}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Clip set for job {0} is immutable after completion")]
    ClipsFrozen(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl RecordsError {
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::JobNotFound(id.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

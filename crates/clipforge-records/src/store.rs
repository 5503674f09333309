//! Store traits consumed from the CRUD layer.

use async_trait::async_trait;

use clipforge_models::{Clip, ClipId, JobId, JobRecord, JobStatus};

use crate::error::RecordsResult;

/// Job record persistence.
///
/// `update` implementations must reject illegal state-machine transitions
/// (`JobStatus::can_transition_to`); the pipeline relies on that to keep
/// status monotonic under concurrent writers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a new job record.
    async fn create_job(&self, job: &JobRecord) -> RecordsResult<()>;

    /// Fetch a job by id.
    async fn get_job(&self, job_id: &JobId) -> RecordsResult<Option<JobRecord>>;

    /// Replace a job record, enforcing transition legality against the
    /// stored status.
    async fn update_job(&self, job: &JobRecord) -> RecordsResult<()>;

    /// Set the cancel-requested flag.
    async fn request_cancel(&self, job_id: &JobId) -> RecordsResult<()>;

    /// List jobs belonging to an owner, newest first.
    async fn list_jobs_by_owner(&self, owner_id: &str) -> RecordsResult<Vec<JobRecord>>;
}

/// Clip record persistence.
///
/// Clips are append-only and owned exclusively by the job leaseholder, so
/// no cross-worker locking is required. Once the parent job reaches a
/// terminal state the clip set is immutable.
#[async_trait]
pub trait ClipStore: Send + Sync {
    /// Append a clip under its parent job.
    async fn append_clip(&self, clip: &Clip) -> RecordsResult<()>;

    /// Update a pending clip (publish outcome, locators, failure detail).
    async fn update_clip(&self, clip: &Clip) -> RecordsResult<()>;

    /// Fetch one clip.
    async fn get_clip(&self, clip_id: &ClipId) -> RecordsResult<Option<Clip>>;

    /// List clips for a job, ordered by rank.
    async fn list_clips(&self, job_id: &JobId) -> RecordsResult<Vec<Clip>>;
}

/// Convenience guard used by store implementations: is the clip set frozen?
pub fn clips_frozen(status: JobStatus) -> bool {
    status.is_terminal()
}

//! TTL'd job status cache for pollers.
//!
//! Every transition writes the snapshot here; `getStatus` reads it without
//! touching the persistence seam. Writes go through
//! `JobStatusSnapshot::set_status`/`set_progress`, so replayed events keep
//! polling idempotent and progress monotonic.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::debug;

use clipforge_models::{JobId, JobStatusSnapshot};

use crate::error::QueueResult;

/// Snapshot TTL; long enough for pollers to observe terminal states.
const SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Redis-backed status snapshot store.
pub struct StatusCache {
    client: redis::Client,
    key_prefix: String,
}

impl StatusCache {
    pub fn new(redis_url: &str, key_prefix: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}:status:{}", self.key_prefix, job_id)
    }

    /// Read the snapshot for a job.
    pub async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobStatusSnapshot>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(self.key(job_id)).await?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    /// Write a snapshot, refreshing its TTL.
    pub async fn put(&self, snapshot: &JobStatusSnapshot) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(snapshot)?;
        conn.set_ex::<_, _, ()>(self.key(&snapshot.job_id), payload, SNAPSHOT_TTL.as_secs())
            .await?;
        debug!(job_id = %snapshot.job_id, status = %snapshot.status, "Wrote status snapshot");
        Ok(())
    }

    /// Read-modify-write helper preserving monotonicity.
    ///
    /// The mutation runs against the stored snapshot (or the provided
    /// fallback when none exists yet); snapshot invariants reject illegal
    /// status regressions inside the model type itself.
    pub async fn update<F>(
        &self,
        job_id: &JobId,
        fallback: impl FnOnce() -> JobStatusSnapshot,
        mutate: F,
    ) -> QueueResult<JobStatusSnapshot>
    where
        F: FnOnce(&mut JobStatusSnapshot),
    {
        let mut snapshot = self.get(job_id).await?.unwrap_or_else(fallback);
        mutate(&mut snapshot);
        self.put(&snapshot).await?;
        Ok(snapshot)
    }

    /// Record a worker heartbeat on the snapshot.
    pub async fn heartbeat(&self, job_id: &JobId) -> QueueResult<()> {
        if let Some(mut snapshot) = self.get(job_id).await? {
            snapshot.record_heartbeat();
            self.put(&snapshot).await?;
        }
        Ok(())
    }
}

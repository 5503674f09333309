//! In-memory store for standalone deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::RwLock;
use tracing::info;

use clipforge_models::{Clip, ClipId, JobId, JobRecord};

use crate::error::{RecordsError, RecordsResult};
use crate::store::{clips_frozen, ClipStore, JobStore};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, JobRecord>,
    clips: HashMap<JobId, Vec<Clip>>,
}

/// Shared in-memory job/clip store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &JobRecord) -> RecordsResult<()> {
        let mut inner = self.inner.write().await;
        inner.jobs.insert(job.id.clone(), job.clone());
        counter!("records_jobs_created").increment(1);
        info!(job_id = %job.id, "Created job record");
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> RecordsResult<Option<JobRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(job_id).cloned())
    }

    async fn update_job(&self, job: &JobRecord) -> RecordsResult<()> {
        let mut inner = self.inner.write().await;
        let current = inner
            .jobs
            .get(&job.id)
            .ok_or_else(|| RecordsError::job_not_found(job.id.to_string()))?;

        if current.status != job.status && !current.status.can_transition_to(job.status) {
            return Err(RecordsError::IllegalTransition {
                job_id: job.id.to_string(),
                from: current.status,
                to: job.status,
            });
        }

        // Cancellation flags are sticky; a stale worker copy cannot clear one.
        let mut next = job.clone();
        next.cancel_requested |= current.cancel_requested;
        inner.jobs.insert(job.id.clone(), next);
        Ok(())
    }

    async fn request_cancel(&self, job_id: &JobId) -> RecordsResult<()> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RecordsError::job_not_found(job_id.to_string()))?;
        job.cancel_requested = true;
        Ok(())
    }

    async fn list_jobs_by_owner(&self, owner_id: &str) -> RecordsResult<Vec<JobRecord>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<JobRecord> = inner
            .jobs
            .values()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

#[async_trait]
impl ClipStore for MemoryStore {
    async fn append_clip(&self, clip: &Clip) -> RecordsResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.get(&clip.job_id) {
            if clips_frozen(job.status) {
                return Err(RecordsError::ClipsFrozen(clip.job_id.to_string()));
            }
        }
        inner
            .clips
            .entry(clip.job_id.clone())
            .or_default()
            .push(clip.clone());
        Ok(())
    }

    async fn update_clip(&self, clip: &Clip) -> RecordsResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.get(&clip.job_id) {
            if clips_frozen(job.status) {
                return Err(RecordsError::ClipsFrozen(clip.job_id.to_string()));
            }
        }
        let clips = inner
            .clips
            .get_mut(&clip.job_id)
            .ok_or_else(|| RecordsError::ClipNotFound(clip.id.to_string()))?;
        let slot = clips
            .iter_mut()
            .find(|c| c.id == clip.id)
            .ok_or_else(|| RecordsError::ClipNotFound(clip.id.to_string()))?;
        *slot = clip.clone();
        Ok(())
    }

    async fn get_clip(&self, clip_id: &ClipId) -> RecordsResult<Option<Clip>> {
        let inner = self.inner.read().await;
        Ok(inner
            .clips
            .values()
            .flatten()
            .find(|c| &c.id == clip_id)
            .cloned())
    }

    async fn list_clips(&self, job_id: &JobId) -> RecordsResult<Vec<Clip>> {
        let inner = self.inner.read().await;
        let mut clips = inner.clips.get(job_id).cloned().unwrap_or_default();
        clips.sort_by_key(|c| c.rank);
        Ok(clips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{
        Candidate, ClipCategory, ClipWindow, JobParams, JobStatus, SourceDescriptor,
    };

    fn job() -> JobRecord {
        JobRecord::new(
            "user-1",
            SourceDescriptor::Upload {
                path: "/tmp/v.mp4".into(),
            },
            JobParams::default(),
        )
    }

    fn clip_for(job_id: &JobId, rank: u32) -> Clip {
        Clip::from_candidate(
            job_id.clone(),
            rank,
            &Candidate {
                window: ClipWindow::new(10.0 * rank as f64, 10.0 * rank as f64 + 30.0),
                virality_score: 90,
                hook: "hook".into(),
                category: ClipCategory::Dramatic,
                reasoning: None,
            },
        )
    }

    #[tokio::test]
    async fn create_and_fetch_job() {
        let store = MemoryStore::new();
        let j = job();
        store.create_job(&j).await.unwrap();
        let got = store.get_job(&j.id).await.unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn update_rejects_illegal_transition() {
        let store = MemoryStore::new();
        let j = job();
        store.create_job(&j).await.unwrap();

        // queued -> completed is illegal without processing in between
        let bad = j.clone().start().complete(false);
        // stored status is still Queued; direct jump must fail
        let err = store.update_job(&bad).await.unwrap_err();
        assert!(matches!(err, RecordsError::IllegalTransition { .. }));

        let started = j.start();
        store.update_job(&started).await.unwrap();
        store.update_job(&started.complete(false)).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_flag_is_sticky() {
        let store = MemoryStore::new();
        let j = job();
        store.create_job(&j).await.unwrap();
        store.request_cancel(&j.id).await.unwrap();

        // a stale worker copy without the flag cannot clear it
        store.update_job(&j.clone().start()).await.unwrap();
        assert!(store.get_job(&j.id).await.unwrap().unwrap().cancel_requested);
    }

    #[tokio::test]
    async fn clips_freeze_after_terminal_status() {
        let store = MemoryStore::new();
        let j = job();
        store.create_job(&j).await.unwrap();
        let started = j.clone().start();
        store.update_job(&started).await.unwrap();

        store.append_clip(&clip_for(&j.id, 1)).await.unwrap();

        store.update_job(&started.complete(false)).await.unwrap();
        let err = store.append_clip(&clip_for(&j.id, 2)).await.unwrap_err();
        assert!(matches!(err, RecordsError::ClipsFrozen(_)));

        let clips = store.list_clips(&j.id).await.unwrap();
        assert_eq!(clips.len(), 1);
    }

    #[tokio::test]
    async fn list_jobs_by_owner_newest_first() {
        let store = MemoryStore::new();
        let a = job();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let b = job();
        store.create_job(&a).await.unwrap();
        store.create_job(&b).await.unwrap();

        let jobs = store.list_jobs_by_owner("user-1").await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, b.id);
        assert!(store.list_jobs_by_owner("other").await.unwrap().is_empty());
    }
}

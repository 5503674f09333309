//! Progress events via Redis Pub/Sub.
//!
//! Push delivery is best-effort on top of the poll-based status contract;
//! the status cache remains the source pollers read.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use clipforge_models::{JobId, JobStatus, ProgressUpdate, ReasonCode, Stage};

use crate::error::QueueResult;

/// Envelope published on a job's progress channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub update: ProgressUpdate,
}

/// Channel for publishing/subscribing to progress events.
pub struct ProgressChannel {
    client: redis::Client,
    key_prefix: String,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str, key_prefix: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    /// Channel name for a job.
    pub fn channel_name(&self, job_id: &JobId) -> String {
        format!("{}:progress:{}", self.key_prefix, job_id)
    }

    /// Publish a progress event.
    pub async fn publish(&self, job_id: &JobId, update: ProgressUpdate) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = self.channel_name(job_id);
        let payload = serde_json::to_string(&ProgressEvent {
            job_id: job_id.clone(),
            update,
        })?;

        debug!(%channel, "Publishing progress event");
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    /// Publish a stage entry.
    pub async fn stage(&self, job_id: &JobId, stage: Stage) -> QueueResult<()> {
        self.publish(
            job_id,
            ProgressUpdate::Stage {
                stage,
                percent: stage.entry_progress(),
            },
        )
        .await
    }

    /// Publish a log line.
    pub async fn log(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(
            job_id,
            ProgressUpdate::Log {
                message: message.into(),
            },
        )
        .await
    }

    /// Publish a per-clip success.
    pub async fn clip_published(&self, job_id: &JobId, rank: u32, total: u32) -> QueueResult<()> {
        self.publish(job_id, ProgressUpdate::ClipPublished { rank, total })
            .await
    }

    /// Publish a per-clip failure.
    pub async fn clip_failed(
        &self,
        job_id: &JobId,
        rank: u32,
        detail: impl Into<String>,
    ) -> QueueResult<()> {
        self.publish(
            job_id,
            ProgressUpdate::ClipFailed {
                rank,
                detail: detail.into(),
            },
        )
        .await
    }

    /// Publish terminal success.
    pub async fn done(&self, job_id: &JobId, status: JobStatus) -> QueueResult<()> {
        self.publish(job_id, ProgressUpdate::Done { status }).await
    }

    /// Publish terminal failure.
    pub async fn error(
        &self,
        job_id: &JobId,
        reason_code: ReasonCode,
        message: impl Into<String>,
    ) -> QueueResult<()> {
        self.publish(
            job_id,
            ProgressUpdate::Error {
                reason_code,
                message: message.into(),
            },
        )
        .await
    }

    /// Subscribe to progress events for a job.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>>
    {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(self.channel_name(job_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

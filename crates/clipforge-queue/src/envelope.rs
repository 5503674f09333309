//! The job envelope stored in the queue stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use clipforge_models::{JobId, JobParams, JobRecord, QueueClass, SourceDescriptor};

/// Context attached to jobs enqueued by the live event router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveTrigger {
    /// Combined salience that crossed the threshold
    pub combined_score: f64,
    /// Labels from the extractors that contributed ("sustained cheering", ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// Serialized unit of work placed on a queue stream.
///
/// Carries everything a worker needs to run the pipeline without a
/// persistence read; the `JobRecord` remains the durable source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// Job ID (matches the persisted record)
    pub job_id: JobId,
    /// Owning user
    pub owner_id: String,
    /// Source descriptor
    pub source: SourceDescriptor,
    /// Requested parameters
    pub params: JobParams,
    /// Live trigger context, present only on the live path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_trigger: Option<LiveTrigger>,
    /// When the envelope was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl JobEnvelope {
    /// Build an envelope from a persisted job record.
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            source: record.source.clone(),
            params: record.params.clone(),
            live_trigger: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Attach live trigger context.
    pub fn with_live_trigger(mut self, trigger: LiveTrigger) -> Self {
        self.live_trigger = Some(trigger);
        self
    }

    /// Queue class this envelope belongs to.
    pub fn queue_class(&self) -> QueueClass {
        self.params.queue_class
    }

    /// Idempotency key for enqueue-time deduplication.
    ///
    /// Both the interactive and live paths hash the owner, the canonical
    /// source content id (live anchors are quantized inside `content_id`),
    /// and the render-affecting parameters, so the same underlying content
    /// window cannot be enqueued twice while the dedup key lives.
    pub fn idempotency_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.owner_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.source.content_id().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.params.clip_count.to_le_bytes());
        hasher.update(self.params.target_duration_secs.to_le_bytes());
        hasher.update(self.params.aspect_ratio.as_str().as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::StreamId;

    fn record(url: &str) -> JobRecord {
        JobRecord::new(
            "user-1",
            SourceDescriptor::Url { url: url.into() },
            JobParams::default(),
        )
    }

    #[test]
    fn idempotency_key_is_stable_across_job_ids() {
        let a = JobEnvelope::from_record(&record("https://example.com/a"));
        let b = JobEnvelope::from_record(&record("https://example.com/a"));
        let c = JobEnvelope::from_record(&record("https://example.com/c"));
        // different JobIds, same content + params -> same key
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_ne!(a.idempotency_key(), c.idempotency_key());
    }

    #[test]
    fn live_anchor_quantization_dedups_nearby_triggers() {
        let mk = |anchor: f64| {
            JobEnvelope::from_record(&JobRecord::new(
                "user-1",
                SourceDescriptor::Live {
                    stream_id: StreamId::new("s1"),
                    anchor_secs: anchor,
                },
                JobParams::default(),
            ))
        };
        assert_eq!(mk(120.2).idempotency_key(), mk(120.4).idempotency_key());
        assert_ne!(mk(120.2).idempotency_key(), mk(240.0).idempotency_key());
    }

    #[test]
    fn envelope_serde_roundtrip() {
        let env = JobEnvelope::from_record(&record("https://example.com/v"))
            .with_live_trigger(LiveTrigger {
                combined_score: 0.83,
                labels: vec!["chat burst".into()],
            });
        let json = serde_json::to_string(&env).expect("serialize");
        let back: JobEnvelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.job_id, env.job_id);
        assert_eq!(back.live_trigger, env.live_trigger);
    }
}

//! Job records and the job status state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::render::{AspectRatio, CaptionStyle};
use crate::signal::StreamId;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the source video comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// A file already on local or mounted storage.
    Upload { path: String },
    /// A remote video URL to be downloaded before processing.
    Url { url: String },
    /// A live-stream trigger: clip from the stream archive around an anchor.
    Live {
        stream_id: StreamId,
        /// Anchor into the stream timeline (seconds), already lookback-adjusted.
        anchor_secs: f64,
    },
}

impl SourceDescriptor {
    /// Stable identifier of the underlying content, used for dedup keys.
    pub fn content_id(&self) -> String {
        match self {
            SourceDescriptor::Upload { path } => format!("upload:{path}"),
            SourceDescriptor::Url { url } => format!("url:{url}"),
            SourceDescriptor::Live {
                stream_id,
                anchor_secs,
            } => format!("live:{stream_id}:{anchor_secs:.0}"),
        }
    }

    /// Returns true for the live-path variant.
    pub fn is_live(&self) -> bool {
        matches!(self, SourceDescriptor::Live { .. })
    }
}

/// Priority class separating small interactive jobs from batch work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueClass {
    /// Small, latency-sensitive jobs (drained first).
    #[default]
    Interactive,
    /// Larger jobs that can wait behind interactive work.
    Batch,
}

impl QueueClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueClass::Interactive => "interactive",
            QueueClass::Batch => "batch",
        }
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_clip_count() -> u32 {
    5
}

fn default_target_duration() -> u32 {
    30
}

/// Requested processing parameters, as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobParams {
    /// Maximum number of clips to produce (1..=10).
    #[serde(default = "default_clip_count")]
    pub clip_count: u32,

    /// Target clip duration in seconds (10..=120).
    #[serde(default = "default_target_duration")]
    pub target_duration_secs: u32,

    /// Output aspect ratio.
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Caption rendering style.
    #[serde(default)]
    pub caption_style: CaptionStyle,

    /// Queue priority class.
    #[serde(default)]
    pub queue_class: QueueClass,

    /// Optional extra instructions forwarded to the selection model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_instructions: Option<String>,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            clip_count: default_clip_count(),
            target_duration_secs: default_target_duration(),
            aspect_ratio: AspectRatio::default(),
            caption_style: CaptionStyle::default(),
            queue_class: QueueClass::default(),
            prompt_instructions: None,
        }
    }
}

impl JobParams {
    /// Bounds-check the requested parameters.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=10).contains(&self.clip_count) {
            return Err(format!("clip_count must be 1..=10, got {}", self.clip_count));
        }
        if !(10..=120).contains(&self.target_duration_secs) {
            return Err(format!(
                "target_duration_secs must be 10..=120, got {}",
                self.target_duration_secs
            ));
        }
        Ok(())
    }
}

/// Job processing status.
///
/// Transitions are monotonic except `Processing -> Queued` on retry:
/// `Queued -> Processing -> {Completed, CompletedWithWarnings, Failed, Canceled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in queue for a worker lease.
    #[default]
    Queued,
    /// A worker holds the lease and is running the pipeline.
    Processing,
    /// All expected clips published.
    Completed,
    /// At least one clip published, at least one failed.
    CompletedWithWarnings,
    /// Terminal failure; see reason code.
    Failed,
    /// Cancel request honored before completion.
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithWarnings => "completed_with_warnings",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::CompletedWithWarnings
                | JobStatus::Failed
                | JobStatus::Canceled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Processing -> Queued` is the retry path and the only backward edge.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Queued, Processing) => true,
            (Queued, Canceled) => true,
            (Queued, Failed) => true, // retry budget exhausted while requeued
            (Processing, Completed)
            | (Processing, CompletedWithWarnings)
            | (Processing, Failed)
            | (Processing, Canceled) => true,
            (Processing, Queued) => true, // lease expiry / retry
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage labels surfaced to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Transcribe,
    Select,
    Render,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Transcribe => "transcribe",
            Stage::Select => "select",
            Stage::Render => "render",
            Stage::Publish => "publish",
        }
    }

    /// Nominal progress percentage when the stage begins.
    pub fn entry_progress(&self) -> u8 {
        match self {
            Stage::Ingest => 5,
            Stage::Transcribe => 20,
            Stage::Select => 40,
            Stage::Render => 55,
            Stage::Publish => 90,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured reason codes attached to terminal or noteworthy outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    InvalidInput,
    MediaUnreadable,
    UpstreamUnavailable,
    UpstreamQuotaExceeded,
    UpstreamSelectionFailed,
    ToolchainError,
    OutputWriteError,
    WorkerCrash,
    WarningNoContent,
    PartialFailure,
    Canceled,
    Unknown,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InvalidInput => "invalid_input",
            ReasonCode::MediaUnreadable => "media_unreadable",
            ReasonCode::UpstreamUnavailable => "upstream_unavailable",
            ReasonCode::UpstreamQuotaExceeded => "upstream_quota_exceeded",
            ReasonCode::UpstreamSelectionFailed => "upstream_selection_failed",
            ReasonCode::ToolchainError => "toolchain_error",
            ReasonCode::OutputWriteError => "output_write_error",
            ReasonCode::WorkerCrash => "worker_crash",
            ReasonCode::WarningNoContent => "warning_no_content",
            ReasonCode::PartialFailure => "partial_failure",
            ReasonCode::Canceled => "canceled",
            ReasonCode::Unknown => "unknown",
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

/// A job record as persisted through the `JobStore` seam.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Unique job ID
    pub id: JobId,

    /// Owning user (opaque to the pipeline)
    pub owner_id: String,

    /// Where the source video comes from
    pub source: SourceDescriptor,

    /// Requested parameters
    pub params: JobParams,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100), monotonic
    #[serde(default)]
    pub progress: u8,

    /// Current pipeline stage, if processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,

    /// Structured reason for the current status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,

    /// Human-readable error or warning detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Number of retry attempts so far
    #[serde(default)]
    pub retry_count: u32,

    /// Maximum retries allowed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Cancellation requested by the caller; workers check between stages
    #[serde(default)]
    pub cancel_requested: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a new queued job.
    pub fn new(owner_id: impl Into<String>, source: SourceDescriptor, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            source,
            params,
            status: JobStatus::Queued,
            progress: 0,
            stage: None,
            reason_code: None,
            message: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            cancel_requested: false,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Transition to processing.
    pub fn start(mut self) -> Self {
        debug_assert!(self.status.can_transition_to(JobStatus::Processing));
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark completed; `warnings` selects the mixed-result terminal state.
    pub fn complete(mut self, warnings: bool) -> Self {
        self.status = if warnings {
            JobStatus::CompletedWithWarnings
        } else {
            JobStatus::Completed
        };
        if warnings && self.reason_code.is_none() {
            self.reason_code = Some(ReasonCode::PartialFailure);
        }
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark failed with a reason.
    pub fn fail(mut self, reason: ReasonCode, message: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.reason_code = Some(reason);
        self.message = Some(message.into());
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Return to the queue for a retry, bumping the retry counter.
    pub fn requeue(mut self, message: impl Into<String>) -> Self {
        debug_assert!(self.status.can_transition_to(JobStatus::Queued));
        self.status = JobStatus::Queued;
        self.message = Some(message.into());
        self.retry_count += 1;
        self.updated_at = Utc::now();
        self
    }

    /// Mark canceled.
    pub fn cancel(mut self) -> Self {
        self.status = JobStatus::Canceled;
        self.reason_code = Some(ReasonCode::Canceled);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Check if the retry budget allows another attempt.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Update progress; values never move backwards.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = self.progress.max(progress.min(100));
        self.updated_at = Utc::now();
        self
    }

    /// Update the visible stage label.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobRecord {
        JobRecord::new(
            "user-1",
            SourceDescriptor::Url {
                url: "https://example.com/v.mp4".into(),
            },
            JobParams::default(),
        )
    }

    #[test]
    fn new_job_is_queued() {
        let j = job();
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.progress, 0);
        assert_eq!(j.retry_count, 0);
    }

    #[test]
    fn legal_transitions() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(CompletedWithWarnings));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Queued));
        // never queued -> completed directly
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Queued));
    }

    #[test]
    fn requeue_bumps_retry_count() {
        let j = job().start().requeue("lease expired");
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.retry_count, 1);
        assert!(j.can_retry());
    }

    #[test]
    fn progress_is_monotonic() {
        let j = job().start().with_progress(40).with_progress(20);
        assert_eq!(j.progress, 40);
    }

    #[test]
    fn mixed_completion_records_partial_failure() {
        let j = job().start().complete(true);
        assert_eq!(j.status, JobStatus::CompletedWithWarnings);
        assert_eq!(j.reason_code, Some(ReasonCode::PartialFailure));
        assert_eq!(j.progress, 100);
    }

    #[test]
    fn params_validation_bounds() {
        let mut p = JobParams::default();
        assert!(p.validate().is_ok());
        p.clip_count = 0;
        assert!(p.validate().is_err());
        p.clip_count = 5;
        p.target_duration_secs = 300;
        assert!(p.validate().is_err());
    }
}

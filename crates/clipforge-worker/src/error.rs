//! Pipeline error taxonomy.
//!
//! Errors are classified once, at the stage boundary where they occur;
//! everything downstream branches on the classification, not the message.

use thiserror::Error;

use clipforge_models::ReasonCode;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller input is unusable; surfaced verbatim, never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The media itself cannot be decoded; no automatic re-encode attempt.
    #[error("Media unreadable: {0}")]
    MediaUnreadable(String),

    /// Upstream service failure; retried with backoff inside the budget.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream quota/rate limit; retried on the longer backoff curve.
    #[error("Upstream quota exceeded: {0}")]
    UpstreamQuotaExceeded(String),

    /// Selection kept failing after its budget; the job must not complete
    /// silently with zero clips.
    #[error("Moment selection failed: {0}")]
    UpstreamSelectionFailed(String),

    /// Render toolchain failure; bounded retries, then terminal for the
    /// affected clip only.
    #[error("Toolchain error: {0}")]
    Toolchain(String),

    /// The source cannot cover this window; terminal for the clip only.
    #[error("Insufficient source: {0}")]
    InsufficientSource(String),

    /// Local or remote write failure; retryable.
    #[error("Output write error: {0}")]
    OutputWrite(String),

    /// Transient IO (network, disk); retryable.
    #[error("Transient IO error: {0}")]
    TransientIo(String),

    /// Cancellation honored between stages.
    #[error("Job canceled")]
    Canceled,

    /// This worker lost its lease; abandon without touching job state.
    #[error("Lease lost")]
    LeaseLost,

    /// Unclassified; retried to the limit, then terminal.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether the JOB may be re-queued for another attempt.
    pub fn is_job_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamUnavailable(_)
                | PipelineError::UpstreamQuotaExceeded(_)
                | PipelineError::OutputWrite(_)
                | PipelineError::TransientIo(_)
                | PipelineError::Unknown(_)
        )
    }

    /// Whether a single stage call may be retried in place.
    pub fn is_call_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamUnavailable(_)
                | PipelineError::UpstreamQuotaExceeded(_)
                | PipelineError::Toolchain(_)
                | PipelineError::OutputWrite(_)
                | PipelineError::TransientIo(_)
        )
    }

    /// Whether the quota backoff curve applies.
    pub fn is_quota(&self) -> bool {
        matches!(self, PipelineError::UpstreamQuotaExceeded(_))
    }

    /// Terminal for the affected clip only; sibling clips proceed.
    pub fn is_clip_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::Toolchain(_) | PipelineError::InsufficientSource(_)
        )
    }

    /// Structured reason surfaced to the caller.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            PipelineError::InvalidInput(_) => ReasonCode::InvalidInput,
            PipelineError::MediaUnreadable(_) => ReasonCode::MediaUnreadable,
            PipelineError::UpstreamUnavailable(_) => ReasonCode::UpstreamUnavailable,
            PipelineError::UpstreamQuotaExceeded(_) => ReasonCode::UpstreamQuotaExceeded,
            PipelineError::UpstreamSelectionFailed(_) => ReasonCode::UpstreamSelectionFailed,
            PipelineError::Toolchain(_) => ReasonCode::ToolchainError,
            PipelineError::InsufficientSource(_) => ReasonCode::ToolchainError,
            PipelineError::OutputWrite(_) => ReasonCode::OutputWriteError,
            PipelineError::TransientIo(_) => ReasonCode::UpstreamUnavailable,
            PipelineError::Canceled => ReasonCode::Canceled,
            PipelineError::LeaseLost => ReasonCode::WorkerCrash,
            PipelineError::Unknown(_) => ReasonCode::Unknown,
        }
    }
}

impl From<clipforge_ml::MlError> for PipelineError {
    fn from(e: clipforge_ml::MlError) -> Self {
        use clipforge_ml::MlError;
        match e {
            MlError::MediaUnreadable(msg) => PipelineError::MediaUnreadable(msg),
            MlError::QuotaExceeded(msg) => PipelineError::UpstreamQuotaExceeded(msg),
            // Malformed responses are treated as upstream flakiness: retried
            // with backoff, never coerced into partial data.
            MlError::MalformedResponse(msg) => PipelineError::UpstreamUnavailable(msg),
            MlError::Upstream { status, message } => {
                PipelineError::UpstreamUnavailable(format!("{status}: {message}"))
            }
            MlError::Timeout(secs) => {
                PipelineError::UpstreamUnavailable(format!("timed out after {secs}s"))
            }
            MlError::Network(e) => PipelineError::UpstreamUnavailable(e.to_string()),
            MlError::Config(msg) => PipelineError::Unknown(msg),
            MlError::Io(e) => PipelineError::TransientIo(e.to_string()),
        }
    }
}

impl From<clipforge_media::MediaError> for PipelineError {
    fn from(e: clipforge_media::MediaError) -> Self {
        use clipforge_media::MediaError;
        match e {
            MediaError::ToolchainFailed { message, stderr, .. } => {
                let detail = stderr
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| format!("{message}: {s}"))
                    .unwrap_or(message);
                PipelineError::Toolchain(detail)
            }
            MediaError::InsufficientSource(msg) => PipelineError::InsufficientSource(msg),
            MediaError::OutputWrite(msg) => PipelineError::OutputWrite(msg),
            MediaError::DownloadFailed { message } => {
                if clipforge_media::is_permanent_download_failure(&message) {
                    PipelineError::InvalidInput(format!("source unavailable: {message}"))
                } else {
                    PipelineError::TransientIo(message)
                }
            }
            MediaError::FileNotFound(path) => {
                PipelineError::InvalidInput(format!("no such file: {}", path.display()))
            }
            MediaError::InvalidVideo(msg) => PipelineError::MediaUnreadable(msg),
            MediaError::Cancelled => PipelineError::Canceled,
            MediaError::Timeout(secs) => {
                PipelineError::Toolchain(format!("ffmpeg timed out after {secs}s"))
            }
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => {
                PipelineError::Unknown(e.to_string())
            }
            MediaError::Io(e) => PipelineError::TransientIo(e.to_string()),
            MediaError::JsonParse(e) => PipelineError::Unknown(e.to_string()),
        }
    }
}

impl From<clipforge_storage::StorageError> for PipelineError {
    fn from(e: clipforge_storage::StorageError) -> Self {
        use clipforge_storage::StorageError;
        match e {
            StorageError::UploadFailed(msg) | StorageError::DeleteFailed(msg) => {
                PipelineError::OutputWrite(msg)
            }
            StorageError::NotFound(key) => PipelineError::OutputWrite(format!("missing: {key}")),
            StorageError::ConfigError(msg) => PipelineError::Unknown(msg),
            StorageError::Io(e) => PipelineError::TransientIo(e.to_string()),
        }
    }
}

impl From<clipforge_queue::QueueError> for PipelineError {
    fn from(e: clipforge_queue::QueueError) -> Self {
        use clipforge_queue::QueueError;
        match e {
            QueueError::LeaseLost(_) | QueueError::LeaseHeld(_) => PipelineError::LeaseLost,
            other => PipelineError::TransientIo(other.to_string()),
        }
    }
}

impl From<clipforge_records::RecordsError> for PipelineError {
    fn from(e: clipforge_records::RecordsError) -> Self {
        PipelineError::TransientIo(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matrix() {
        assert!(!PipelineError::invalid_input("bad").is_job_retryable());
        assert!(PipelineError::UpstreamUnavailable("503".into()).is_job_retryable());
        assert!(PipelineError::UpstreamQuotaExceeded("rpm".into()).is_quota());
        assert!(PipelineError::Toolchain("boom".into()).is_clip_scoped());
        assert!(!PipelineError::Toolchain("boom".into()).is_job_retryable());
        assert!(PipelineError::InsufficientSource("short".into()).is_clip_scoped());
        assert!(PipelineError::OutputWrite("disk".into()).is_call_retryable());
    }

    #[test]
    fn ml_errors_classify_at_the_boundary() {
        let e: PipelineError = clipforge_ml::MlError::malformed("schema").into();
        assert!(matches!(e, PipelineError::UpstreamUnavailable(_)));

        let e: PipelineError = clipforge_ml::MlError::media_unreadable("bad").into();
        assert!(matches!(e, PipelineError::MediaUnreadable(_)));
        assert_eq!(e.reason_code(), ReasonCode::MediaUnreadable);
    }

    #[test]
    fn permanent_download_failures_become_invalid_input() {
        let e: PipelineError =
            clipforge_media::MediaError::download_failed("ERROR: Private video").into();
        assert!(matches!(e, PipelineError::InvalidInput(_)));

        let e: PipelineError =
            clipforge_media::MediaError::download_failed("HTTP Error 503").into();
        assert!(matches!(e, PipelineError::TransientIo(_)));
    }
}

//! ML adapter error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Media unreadable: {0}")]
    MediaUnreadable(String),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Upstream quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MlError {
    pub fn media_unreadable(msg: impl Into<String>) -> Self {
        Self::MediaUnreadable(msg.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the stage-level retry policy may try again.
    ///
    /// Malformed responses count as retryable upstream flakiness; the media
    /// itself being unreadable is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            MlError::MediaUnreadable(_) | MlError::Config(_) => false,
            MlError::Upstream { status, .. } => *status >= 500 || *status == 408,
            MlError::QuotaExceeded(_) => true,
            MlError::MalformedResponse(_) => true,
            MlError::Timeout(_) => true,
            MlError::Network(_) => true,
            MlError::Io(_) => false,
        }
    }

    /// Whether the retry should use the longer quota backoff curve.
    pub fn is_quota(&self) -> bool {
        matches!(self, MlError::QuotaExceeded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(!MlError::media_unreadable("bad container").is_retryable());
        assert!(MlError::upstream(503, "unavailable").is_retryable());
        assert!(!MlError::upstream(400, "bad request").is_retryable());
        assert!(MlError::malformed("missing field").is_retryable());
        assert!(MlError::QuotaExceeded("rpm".into()).is_quota());
    }
}

//! Transcription client for a Whisper-style HTTP service.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

use clipforge_models::{Transcript, TranscriptSegment};

use crate::error::{MlError, MlResult};

/// Configuration for the transcription client.
#[derive(Debug, Clone)]
pub struct TranscribeConfig {
    /// Base URL of the transcription service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl TranscribeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("TRANSCRIBE_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            timeout: Duration::from_secs(
                std::env::var("TRANSCRIBE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Wire format returned by the service.
#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    start: f64,
    end: f64,
    text: String,
}

/// HTTP client for the transcription service.
pub struct TranscribeClient {
    http: reqwest::Client,
    config: TranscribeConfig,
}

impl TranscribeClient {
    /// Create a new client.
    pub fn new(config: TranscribeConfig) -> MlResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(TranscribeConfig::from_env())
    }

    /// Transcribe a local media file.
    ///
    /// A caption sidecar (`<media>.vtt`) short-circuits the service call.
    /// Silent media yields an empty segment list, not placeholders. A file
    /// the service cannot decode is `MediaUnreadable` (terminal, no
    /// automatic re-encode attempt).
    pub async fn transcribe(&self, media_path: &Path) -> MlResult<Transcript> {
        if !media_path.exists() {
            return Err(MlError::media_unreadable(format!(
                "no such file: {}",
                media_path.display()
            )));
        }

        let sidecar = media_path.with_extension("vtt");
        if sidecar.exists() {
            let content = tokio::fs::read_to_string(&sidecar).await?;
            let transcript = crate::vtt::parse_vtt(&content);
            if !transcript.is_empty() {
                info!(path = %sidecar.display(), "Using caption sidecar as transcript");
                return Ok(transcript);
            }
        }

        info!(path = %media_path.display(), "Transcribing media");

        let bytes = tokio::fs::read(media_path).await?;
        let filename = media_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "media.mp4".to_string());

        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(bytes)
                .file_name(filename)
                .mime_str("application/octet-stream")
                .map_err(MlError::Network)?,
        );

        let url = format!("{}/v1/transcribe", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MlError::Timeout(self.config.timeout.as_secs())
                } else {
                    MlError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 422 is the service's "decodable media required" answer.
            if status.as_u16() == 422 {
                return Err(MlError::media_unreadable(body));
            }
            return Err(MlError::upstream(status.as_u16(), body));
        }

        let wire: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| MlError::malformed(format!("transcribe response: {e}")))?;

        let segments = wire
            .segments
            .into_iter()
            .map(|s| TranscriptSegment::new(s.start, s.end, s.text))
            .collect();

        let transcript = Transcript::new(wire.language, segments);
        debug!(
            segments = transcript.segments.len(),
            language = ?transcript.language,
            "Transcription complete"
        );

        Ok(transcript)
    }
}

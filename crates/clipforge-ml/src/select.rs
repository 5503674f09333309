//! Moment-selection client.
//!
//! Sends the transcript (plus a signal-window summary on the live path) to
//! an LLM ranking endpoint and decodes ranked candidate windows against a
//! strict schema. Malformed responses are classified errors, never coerced.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clipforge_models::timestamp::parse_timestamp;
use clipforge_models::{Candidate, ClipCategory, ClipWindow, Transcript};

use crate::error::{MlError, MlResult};

/// Configuration for the selection client.
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Base URL of the ranking API
    pub base_url: String,
    /// API key
    pub api_key: String,
    /// Models to try, in order
    pub models: Vec<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl SelectionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Ok(Self {
            base_url: std::env::var("SELECTION_API_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
            api_key: std::env::var("SELECTION_API_KEY")
                .map_err(|_| MlError::config("SELECTION_API_KEY not set"))?,
            models: std::env::var("SELECTION_MODELS")
                .map(|s| s.split(',').map(|m| m.trim().to_string()).collect())
                .unwrap_or_else(|_| {
                    vec![
                        "gemini-2.5-flash".to_string(),
                        "gemini-2.5-flash-lite".to_string(),
                        "gemini-2.5-pro".to_string(),
                    ]
                }),
            timeout: Duration::from_secs(
                std::env::var("SELECTION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

/// What to select moments from.
#[derive(Debug, Clone)]
pub struct SelectionRequest<'a> {
    /// Source transcript
    pub transcript: &'a Transcript,
    /// Total source duration in seconds
    pub source_duration_secs: f64,
    /// Maximum candidates wanted
    pub clip_count: u32,
    /// Target clip duration in seconds
    pub target_duration_secs: u32,
    /// Optional caller instructions
    pub instructions: Option<&'a str>,
    /// Live-path signal summary ("audio_energy=0.9 (sustained cheering), ...")
    pub live_context: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// The ranked-candidate schema the model must return.
#[derive(Debug, Deserialize)]
struct WireCandidates {
    moments: Vec<WireMoment>,
}

#[derive(Debug, Deserialize)]
struct WireMoment {
    start: String,
    end: String,
    virality_score: u8,
    hook: String,
    category: ClipCategory,
    #[serde(default)]
    reasoning: Option<String>,
}

/// HTTP client for the ranking API.
pub struct SelectionClient {
    http: reqwest::Client,
    config: SelectionConfig,
}

impl SelectionClient {
    /// Create a new client.
    pub fn new(config: SelectionConfig) -> MlResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(SelectionConfig::from_env()?)
    }

    /// Rank candidate moments.
    ///
    /// Tries each configured model in order; the first decodable response
    /// wins. Windows are clamped to source bounds with a warning, sorted by
    /// score (ties: earlier start, then longer window), and capped at the
    /// requested count. Fewer candidates than requested is a valid result.
    pub async fn select_moments(&self, request: &SelectionRequest<'_>) -> MlResult<Vec<Candidate>> {
        let prompt = build_prompt(request);

        let mut last_error = None;
        for model in &self.config.models {
            info!(%model, "Requesting moment ranking");
            match self.call_model(model, &prompt).await {
                Ok(wire) => {
                    return Ok(normalize_candidates(
                        wire,
                        request.source_duration_secs,
                        request.clip_count,
                    ))
                }
                Err(e) => {
                    warn!(%model, error = %e, "Ranking model failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| MlError::config("no selection models configured")))
    }

    async fn call_model(&self, model: &str, prompt: &str) -> MlResult<WireCandidates> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, model, self.config.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
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
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::QuotaExceeded(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::upstream(status.as_u16(), body));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| MlError::malformed(format!("generate response: {e}")))?;

        let text = generated
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| MlError::malformed("empty model response"))?;

        serde_json::from_str(strip_fences(text))
            .map_err(|e| MlError::malformed(format!("candidate schema: {e}")))
    }
}

/// Remove a surrounding ```json fence, if present.
fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn build_prompt(request: &SelectionRequest<'_>) -> String {
    let mut prompt = format!(
        r#"You are a short-form video editor. From the transcript below, pick up to {count} moments most likely to perform as standalone clips of roughly {duration} seconds.

Return ONLY a single JSON object with this schema:
{{
  "moments": [
    {{
      "start": "HH:MM:SS",
      "end": "HH:MM:SS",
      "virality_score": 0,
      "hook": "One-line hook for the clip",
      "category": "emotional|educational|controversial|inspirational|humorous|dramatic|surprising|other",
      "reasoning": "Why this moment works"
    }}
  ]
}}

Rules:
- Timestamps must come from the transcript and stay within the source.
- virality_score is an integer 0-100.
- Return fewer moments when the content is thin; never invent quotes.
"#,
        count = request.clip_count,
        duration = request.target_duration_secs,
    );

    if let Some(instructions) = request.instructions {
        prompt.push_str(&format!("\nCaller instructions: {instructions}\n"));
    }
    if let Some(context) = &request.live_context {
        prompt.push_str(&format!(
            "\nLive signal window around the trigger (favor moments inside it):\n{context}\n"
        ));
    }

    prompt.push_str("\nTRANSCRIPT:\n");
    prompt.push_str(&request.transcript.to_prompt_text());
    prompt
}

/// Decode, clamp, rank, and cap wire candidates.
fn normalize_candidates(
    wire: WireCandidates,
    source_duration_secs: f64,
    clip_count: u32,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::new();

    for moment in wire.moments {
        let (Ok(start), Ok(end)) = (parse_timestamp(&moment.start), parse_timestamp(&moment.end))
        else {
            warn!(start = %moment.start, end = %moment.end, "Dropping candidate with bad timestamps");
            continue;
        };
        if end <= start {
            warn!(start, end, "Dropping candidate with inverted window");
            continue;
        }

        let window = ClipWindow::new(start, end);
        let window = match window.clamped_to(source_duration_secs) {
            Some(w) => {
                if w != window {
                    warn!(
                        start,
                        end, source_duration_secs, "Clamped candidate window to source bounds"
                    );
                }
                w
            }
            None => {
                warn!(start, end, "Dropping candidate outside source bounds");
                continue;
            }
        };

        candidates.push(Candidate {
            window,
            virality_score: moment.virality_score.min(100),
            hook: moment.hook,
            category: moment.category,
            reasoning: moment.reasoning,
        });
    }

    candidates.sort_by(|a, b| a.rank_cmp(b));
    candidates.truncate(clip_count as usize);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::TranscriptSegment;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transcript() -> Transcript {
        Transcript::new(
            Some("en".into()),
            vec![TranscriptSegment::new(0.0, 500.0, "lots of talking")],
        )
    }

    fn request(t: &Transcript) -> SelectionRequest<'_> {
        SelectionRequest {
            transcript: t,
            source_duration_secs: 600.0,
            clip_count: 5,
            target_duration_secs: 30,
            instructions: None,
            live_context: None,
        }
    }

    fn config_for(server: &MockServer, models: &[&str]) -> SelectionConfig {
        SelectionConfig {
            base_url: server.uri(),
            api_key: "test-key".into(),
            models: models.iter().map(|m| m.to_string()).collect(),
            timeout: Duration::from_secs(5),
        }
    }

    fn model_body(inner_json: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [
                {"content": {"parts": [{"text": inner_json}]}}
            ]
        })
    }

    #[tokio::test]
    async fn decodes_and_ranks_candidates() {
        let server = MockServer::start().await;
        let inner = r#"```json
{"moments": [
  {"start": "00:05:00", "end": "00:05:30", "virality_score": 70, "hook": "B", "category": "humorous"},
  {"start": "00:01:00", "end": "00:01:30", "virality_score": 95, "hook": "A", "category": "dramatic", "reasoning": "peak"}
]}
```"#;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/.*:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_body(inner)))
            .mount(&server)
            .await;

        let t = transcript();
        let client = SelectionClient::new(config_for(&server, &["m1"])).unwrap();
        let candidates = client.select_moments(&request(&t)).await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].hook, "A");
        assert_eq!(candidates[0].window.start_secs, 60.0);
        assert_eq!(candidates[1].virality_score, 70);
    }

    #[tokio::test]
    async fn clamps_windows_to_source_bounds() {
        let server = MockServer::start().await;
        let inner = r#"{"moments": [
  {"start": "00:09:50", "end": "00:10:40", "virality_score": 80, "hook": "tail", "category": "surprising"}
]}"#;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/.*:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_body(inner)))
            .mount(&server)
            .await;

        let t = transcript();
        let client = SelectionClient::new(config_for(&server, &["m1"])).unwrap();
        let candidates = client.select_moments(&request(&t)).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].window.end_secs, 600.0);
    }

    #[tokio::test]
    async fn malformed_response_is_classified_not_coerced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/.*:generateContent$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(model_body(r#"{"moments": "definitely not a list"}"#)),
            )
            .mount(&server)
            .await;

        let t = transcript();
        let client = SelectionClient::new(config_for(&server, &["m1"])).unwrap();
        let err = client.select_moments(&request(&t)).await.unwrap_err();
        assert!(matches!(err, MlError::MalformedResponse(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn falls_through_model_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/broken:generateContent$"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let inner = r#"{"moments": [
  {"start": "00:00:10", "end": "00:00:40", "virality_score": 60, "hook": "ok", "category": "other"}
]}"#;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/working:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_body(inner)))
            .mount(&server)
            .await;

        let t = transcript();
        let client = SelectionClient::new(config_for(&server, &["broken", "working"])).unwrap();
        let candidates = client.select_moments(&request(&t)).await.unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn quota_status_maps_to_quota_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/.*:generateContent$"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let t = transcript();
        let client = SelectionClient::new(config_for(&server, &["m1"])).unwrap();
        let err = client.select_moments(&request(&t)).await.unwrap_err();
        assert!(err.is_quota());
    }

    #[test]
    fn caps_at_requested_count() {
        let wire = WireCandidates {
            moments: (0..8)
                .map(|i| WireMoment {
                    start: format!("00:0{i}:00"),
                    end: format!("00:0{i}:30"),
                    virality_score: 50 + i as u8,
                    hook: format!("hook {i}"),
                    category: ClipCategory::Other,
                    reasoning: None,
                })
                .collect(),
        };
        let candidates = normalize_candidates(wire, 600.0, 3);
        assert_eq!(candidates.len(), 3);
        // top scores kept
        assert_eq!(candidates[0].virality_score, 57);
    }
}

//! Live-stream signal events.
//!
//! These are ephemeral: they live in a bounded per-stream rolling window
//! and are never persisted long-term.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a live stream feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signal capability set on the live path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    AudioEnergy,
    SceneCut,
    FaceEmotion,
    ChatActivity,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::AudioEnergy => "audio_energy",
            SignalKind::SceneCut => "scene_cut",
            SignalKind::FaceEmotion => "face_emotion",
            SignalKind::ChatActivity => "chat_activity",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of one live event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPayload {
    /// Short audio window with its RMS level (0..=1 normalized upstream)
    AudioPeak { rms: f64 },
    /// A camera cut detected in the relay feed
    SceneCut,
    /// A face snapshot with an optional pre-classified emotion label
    FaceSnapshot {
        #[serde(skip_serializing_if = "Option::is_none")]
        emotion: Option<String>,
    },
    /// One chat message (counted toward activity rate)
    ChatMessage,
    /// A pre-aggregated chat burst
    ChatSpike { count: u32 },
}

impl SignalPayload {
    /// Which extractor consumes this payload.
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalPayload::AudioPeak { .. } => SignalKind::AudioEnergy,
            SignalPayload::SceneCut => SignalKind::SceneCut,
            SignalPayload::FaceSnapshot { .. } => SignalKind::FaceEmotion,
            SignalPayload::ChatMessage | SignalPayload::ChatSpike { .. } => {
                SignalKind::ChatActivity
            }
        }
    }
}

/// One event received from a live stream relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SignalEvent {
    /// Stream this event belongs to
    pub stream_id: StreamId,

    /// Position in the stream timeline (seconds since stream start)
    pub stream_ts_secs: f64,

    /// Payload
    #[serde(flatten)]
    pub payload: SignalPayload,

    /// Wall-clock arrival time
    pub received_at: DateTime<Utc>,
}

impl SignalEvent {
    pub fn new(stream_id: StreamId, stream_ts_secs: f64, payload: SignalPayload) -> Self {
        Self {
            stream_id,
            stream_ts_secs,
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Normalized score produced by one extractor over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    /// Score in [0, 1]
    pub value: f64,
    /// Short human-readable label ("sustained cheering", "chat burst", ...)
    pub label: String,
}

impl SignalScore {
    /// Build a score, clamping into [0, 1].
    pub fn new(value: f64, label: impl Into<String>) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            label: label.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_maps_to_extractor_kind() {
        assert_eq!(
            SignalPayload::AudioPeak { rms: 0.7 }.kind(),
            SignalKind::AudioEnergy
        );
        assert_eq!(
            SignalPayload::ChatSpike { count: 40 }.kind(),
            SignalKind::ChatActivity
        );
        assert_eq!(SignalPayload::ChatMessage.kind(), SignalKind::ChatActivity);
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(SignalScore::new(1.7, "x").value, 1.0);
        assert_eq!(SignalScore::new(-0.2, "x").value, 0.0);
    }

    #[test]
    fn event_serde_roundtrip() {
        let evt = SignalEvent::new(
            StreamId::new("stream-1"),
            123.4,
            SignalPayload::AudioPeak { rms: 0.8 },
        );
        let json = serde_json::to_string(&evt).expect("serialize");
        let back: SignalEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, evt);
    }
}

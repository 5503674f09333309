//! Signal extractors.
//!
//! Each extractor reduces the rolling window to a normalized salience
//! score with a label, or `None` when its signal type is absent. All of
//! them are best-effort; detection proceeds with whatever is available.

use clipforge_models::{SignalKind, SignalPayload, SignalScore};

use crate::buffer::StreamWindow;

/// A salience scorer over the rolling window.
pub trait SignalExtractor: Send + Sync {
    /// Which capability this extractor provides.
    fn kind(&self) -> SignalKind;

    /// Score the window, or `None` when no relevant events exist.
    fn score(&self, window: &StreamWindow) -> Option<SignalScore>;
}

/// The full default capability set.
pub fn default_extractors(
    chat_sample_secs: f64,
    chat_spike_multiplier: f64,
) -> Vec<Box<dyn SignalExtractor>> {
    vec![
        Box::new(AudioEnergyExtractor),
        Box::new(SceneCutExtractor),
        Box::new(FaceEmotionExtractor),
        Box::new(ChatActivityExtractor {
            sample_secs: chat_sample_secs,
            spike_multiplier: chat_spike_multiplier,
        }),
    ]
}

/// Audio hype: peak RMS among buffered audio windows, boosted when the
/// spike is sustained across several events.
pub struct AudioEnergyExtractor;

impl SignalExtractor for AudioEnergyExtractor {
    fn kind(&self) -> SignalKind {
        SignalKind::AudioEnergy
    }

    fn score(&self, window: &StreamWindow) -> Option<SignalScore> {
        let mut peak: f64 = 0.0;
        let mut count = 0u32;
        for event in window.events() {
            if let SignalPayload::AudioPeak { rms } = &event.payload {
                peak = peak.max(rms.clamp(0.0, 1.0));
                count += 1;
            }
        }
        if count == 0 {
            return None;
        }

        let label = if count >= 3 {
            "sustained audio spike"
        } else {
            "audio peak"
        };
        // Sustained spikes read hotter than a single loud frame.
        let sustain_bonus = ((count.saturating_sub(1)) as f64 * 0.05).min(0.2);
        Some(SignalScore::new(peak + sustain_bonus, label))
    }
}

/// Camera-cut density: frequent cuts inside the window read as action.
pub struct SceneCutExtractor;

impl SceneCutExtractor {
    /// Cuts per window considered full-strength.
    const SATURATION_CUTS: f64 = 5.0;
}

impl SignalExtractor for SceneCutExtractor {
    fn kind(&self) -> SignalKind {
        SignalKind::SceneCut
    }

    fn score(&self, window: &StreamWindow) -> Option<SignalScore> {
        let cuts = window
            .events()
            .filter(|e| matches!(e.payload, SignalPayload::SceneCut))
            .count();
        if cuts == 0 {
            return None;
        }
        Some(SignalScore::new(
            cuts as f64 / Self::SATURATION_CUTS,
            format!("{cuts} scene cuts"),
        ))
    }
}

/// Face emotion heuristic over pre-classified snapshot labels.
pub struct FaceEmotionExtractor;

impl FaceEmotionExtractor {
    fn emotion_weight(emotion: &str) -> f64 {
        match emotion {
            "surprise" | "surprised" => 1.0,
            "happy" | "excited" | "joy" => 0.85,
            "angry" | "fear" => 0.6,
            "sad" => 0.3,
            _ => 0.15,
        }
    }
}

impl SignalExtractor for FaceEmotionExtractor {
    fn kind(&self) -> SignalKind {
        SignalKind::FaceEmotion
    }

    fn score(&self, window: &StreamWindow) -> Option<SignalScore> {
        let mut best: Option<(f64, String)> = None;
        for event in window.events() {
            if let SignalPayload::FaceSnapshot {
                emotion: Some(emotion),
            } = &event.payload
            {
                let weight = Self::emotion_weight(emotion);
                if best.as_ref().map(|(w, _)| weight > *w).unwrap_or(true) {
                    best = Some((weight, emotion.clone()));
                }
            }
        }
        best.map(|(weight, emotion)| SignalScore::new(weight, format!("face: {emotion}")))
    }
}

/// Chat activity: message rate in the recent sample window against the
/// baseline rate over the whole buffered span.
pub struct ChatActivityExtractor {
    pub sample_secs: f64,
    pub spike_multiplier: f64,
}

impl SignalExtractor for ChatActivityExtractor {
    fn kind(&self) -> SignalKind {
        SignalKind::ChatActivity
    }

    fn score(&self, window: &StreamWindow) -> Option<SignalScore> {
        let latest = window.latest_ts()?;
        let span = window.span_secs().max(self.sample_secs);
        let sample_cut = latest - self.sample_secs;

        let mut total = 0.0f64;
        let mut recent = 0.0f64;
        for event in window.events() {
            let count = match &event.payload {
                SignalPayload::ChatMessage => 1.0,
                SignalPayload::ChatSpike { count } => *count as f64,
                _ => continue,
            };
            total += count;
            if event.stream_ts_secs >= sample_cut {
                recent += count;
            }
        }
        if total == 0.0 {
            return None;
        }

        let baseline_rate = (total / span).max(1e-6);
        let recent_rate = recent / self.sample_secs;
        let ratio = recent_rate / baseline_rate;

        Some(SignalScore::new(
            ratio / self.spike_multiplier,
            format!("chat {:.1}x baseline", ratio),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{SignalEvent, StreamId};

    fn window_with(events: Vec<(f64, SignalPayload)>) -> StreamWindow {
        let mut w = StreamWindow::new(60.0, 256);
        for (ts, payload) in events {
            w.push(SignalEvent::new(StreamId::new("s1"), ts, payload));
        }
        w
    }

    #[test]
    fn audio_extractor_scores_peak_and_sustain() {
        let w = window_with(vec![
            (1.0, SignalPayload::AudioPeak { rms: 0.5 }),
            (2.0, SignalPayload::AudioPeak { rms: 0.8 }),
            (3.0, SignalPayload::AudioPeak { rms: 0.7 }),
        ]);
        let score = AudioEnergyExtractor.score(&w).unwrap();
        assert!(score.value > 0.8);
        assert_eq!(score.label, "sustained audio spike");
    }

    #[test]
    fn extractors_return_none_without_their_signal() {
        let w = window_with(vec![(1.0, SignalPayload::ChatMessage)]);
        assert!(AudioEnergyExtractor.score(&w).is_none());
        assert!(SceneCutExtractor.score(&w).is_none());
        assert!(FaceEmotionExtractor.score(&w).is_none());
    }

    #[test]
    fn scene_cut_density_saturates() {
        let w = window_with((0..8).map(|i| (i as f64, SignalPayload::SceneCut)).collect());
        let score = SceneCutExtractor.score(&w).unwrap();
        assert_eq!(score.value, 1.0);
    }

    #[test]
    fn face_emotion_picks_strongest() {
        let w = window_with(vec![
            (
                1.0,
                SignalPayload::FaceSnapshot {
                    emotion: Some("sad".into()),
                },
            ),
            (
                2.0,
                SignalPayload::FaceSnapshot {
                    emotion: Some("surprise".into()),
                },
            ),
            (3.0, SignalPayload::FaceSnapshot { emotion: None }),
        ]);
        let score = FaceEmotionExtractor.score(&w).unwrap();
        assert_eq!(score.value, 1.0);
        assert_eq!(score.label, "face: surprise");
    }

    #[test]
    fn chat_spike_over_baseline() {
        // Sparse baseline for 50s, then a burst in the last 5s.
        let mut events: Vec<(f64, SignalPayload)> =
            (0..10).map(|i| (i as f64 * 5.0, SignalPayload::ChatMessage)).collect();
        for i in 0..30 {
            events.push((50.0 + i as f64 * 0.15, SignalPayload::ChatMessage));
        }
        let w = window_with(events);
        let extractor = ChatActivityExtractor {
            sample_secs: 5.0,
            spike_multiplier: 3.0,
        };
        let score = extractor.score(&w).unwrap();
        assert!(score.value > 0.9, "burst should read as a spike: {score:?}");
    }

    #[test]
    fn steady_chat_is_not_a_spike() {
        let events: Vec<(f64, SignalPayload)> =
            (0..60).map(|i| (i as f64, SignalPayload::ChatMessage)).collect();
        let w = window_with(events);
        let extractor = ChatActivityExtractor {
            sample_secs: 5.0,
            spike_multiplier: 3.0,
        };
        let score = extractor.score(&w).unwrap();
        assert!(score.value < 0.5);
    }
}

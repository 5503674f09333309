//! Live path configuration.

use std::collections::HashMap;

use clipforge_models::SignalKind;

/// Configuration for the live event router and detector.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Rolling window length per stream (stream-timeline seconds)
    pub window_secs: f64,
    /// Maximum buffered events per stream; oldest dropped beyond this
    pub buffer_cap: usize,
    /// Combined-salience threshold that triggers a clip job
    pub threshold: f64,
    /// Seconds of lookback before the triggering event
    pub lookback_secs: f64,
    /// Suppression period after a trigger, per stream
    pub cooldown_secs: f64,
    /// Extractor weights; the combined score is normalized over the FULL
    /// weight set, so a missing extractor degrades the score instead of
    /// blocking detection
    pub weights: HashMap<SignalKind, f64>,
    /// Sample window for chat rate computation
    pub chat_sample_secs: f64,
    /// Chat rate over baseline considered a full-strength spike
    pub chat_spike_multiplier: f64,
    /// Event channel capacity for the router
    pub channel_cap: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert(SignalKind::AudioEnergy, 0.35);
        weights.insert(SignalKind::ChatActivity, 0.30);
        weights.insert(SignalKind::FaceEmotion, 0.20);
        weights.insert(SignalKind::SceneCut, 0.15);

        Self {
            window_secs: 30.0,
            buffer_cap: 256,
            threshold: 0.6,
            lookback_secs: 20.0,
            cooldown_secs: 60.0,
            weights,
            chat_sample_secs: 5.0,
            chat_spike_multiplier: 3.0,
            channel_cap: 1024,
        }
    }
}

impl LiveConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            window_secs: env_f64("LIVE_WINDOW_SECS", defaults.window_secs),
            buffer_cap: env_usize("LIVE_BUFFER_CAP", defaults.buffer_cap),
            threshold: env_f64("LIVE_THRESHOLD", defaults.threshold),
            lookback_secs: env_f64("LIVE_LOOKBACK_SECS", defaults.lookback_secs),
            cooldown_secs: env_f64("LIVE_COOLDOWN_SECS", defaults.cooldown_secs),
            chat_sample_secs: env_f64("LIVE_CHAT_SAMPLE_SECS", defaults.chat_sample_secs),
            chat_spike_multiplier: env_f64(
                "LIVE_CHAT_SPIKE_MULTIPLIER",
                defaults.chat_spike_multiplier,
            ),
            channel_cap: env_usize("LIVE_CHANNEL_CAP", defaults.channel_cap),
            weights: defaults.weights,
        }
    }

    /// Sum of all configured weights (the combiner's denominator).
    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

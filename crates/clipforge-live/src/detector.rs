//! Weighted salience combination and trigger gating.

use std::collections::HashMap;

use tracing::debug;

use clipforge_models::StreamId;

use crate::buffer::StreamWindow;
use crate::config::LiveConfig;
use crate::extractor::{default_extractors, SignalExtractor};

/// A detected hype moment, ready to anchor a live clip job.
#[derive(Debug, Clone, PartialEq)]
pub struct HypeMoment {
    pub stream_id: StreamId,
    /// Trigger position minus lookback, floored at stream start
    pub anchor_secs: f64,
    /// Combined salience that crossed the threshold
    pub combined_score: f64,
    /// Labels from the contributing extractors
    pub labels: Vec<String>,
}

/// Combines extractor scores and gates triggers with a per-stream cooldown.
pub struct HypeDetector {
    extractors: Vec<Box<dyn SignalExtractor>>,
    config: LiveConfig,
    /// Stream timestamp of the last trigger, per stream
    last_trigger: HashMap<StreamId, f64>,
}

impl HypeDetector {
    /// Detector with the default capability set.
    pub fn new(config: LiveConfig) -> Self {
        let extractors = default_extractors(config.chat_sample_secs, config.chat_spike_multiplier);
        Self::with_extractors(config, extractors)
    }

    /// Detector with an explicit capability set (missing extractors degrade
    /// the combined score; they never block detection).
    pub fn with_extractors(config: LiveConfig, extractors: Vec<Box<dyn SignalExtractor>>) -> Self {
        Self {
            extractors,
            config,
            last_trigger: HashMap::new(),
        }
    }

    /// Combined salience of a window plus contributing labels.
    ///
    /// The weighted sum is normalized over the FULL configured weight set;
    /// an extractor with nothing to say contributes zero, lowering the
    /// score instead of aborting detection.
    pub fn combined_score(&self, window: &StreamWindow) -> (f64, Vec<String>) {
        let total_weight = self.config.total_weight().max(1e-6);
        let mut sum = 0.0;
        let mut labels = Vec::new();

        for extractor in &self.extractors {
            let Some(weight) = self.config.weights.get(&extractor.kind()) else {
                continue;
            };
            if let Some(score) = extractor.score(window) {
                sum += weight * score.value;
                labels.push(score.label);
            }
        }

        (sum / total_weight, labels)
    }

    /// Evaluate the window after a new event; returns a moment exactly when
    /// the threshold is crossed outside the stream's cooldown period.
    pub fn evaluate(&mut self, stream_id: &StreamId, window: &StreamWindow) -> Option<HypeMoment> {
        let trigger_ts = window.latest_ts()?;

        if let Some(last) = self.last_trigger.get(stream_id) {
            if trigger_ts - last < self.config.cooldown_secs {
                return None;
            }
        }

        let (combined, labels) = self.combined_score(window);
        debug!(%stream_id, combined, trigger_ts, "Evaluated live window");
        if combined < self.config.threshold {
            return None;
        }

        self.last_trigger.insert(stream_id.clone(), trigger_ts);
        Some(HypeMoment {
            stream_id: stream_id.clone(),
            anchor_secs: (trigger_ts - self.config.lookback_secs).max(0.0),
            combined_score: combined,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{SignalEvent, SignalPayload};

    fn hype_config() -> LiveConfig {
        LiveConfig {
            threshold: 0.3,
            cooldown_secs: 60.0,
            lookback_secs: 20.0,
            ..LiveConfig::default()
        }
    }

    fn audio_event(ts: f64, rms: f64) -> SignalEvent {
        SignalEvent::new(
            StreamId::new("s1"),
            ts,
            SignalPayload::AudioPeak { rms },
        )
    }

    #[test]
    fn crossing_triggers_once_per_cooldown() {
        let stream = StreamId::new("s1");
        let mut detector = HypeDetector::new(hype_config());
        let mut window = StreamWindow::new(30.0, 256);

        // Loud sustained audio from t=100 on.
        let mut triggers = Vec::new();
        for i in 0..40 {
            let ts = 100.0 + i as f64;
            window.push(audio_event(ts, 0.95));
            if let Some(moment) = detector.evaluate(&stream, &window) {
                triggers.push(moment);
            }
        }

        // Threshold is crossed continuously, but the cooldown admits one
        // trigger per 60s window.
        assert_eq!(triggers.len(), 1);
        let moment = &triggers[0];
        assert!((moment.anchor_secs - 80.0).abs() < 0.001);
        assert!(moment.combined_score >= 0.3);
        assert!(!moment.labels.is_empty());
    }

    #[test]
    fn quiet_stream_never_triggers() {
        let stream = StreamId::new("s1");
        let mut detector = HypeDetector::new(hype_config());
        let mut window = StreamWindow::new(30.0, 256);

        for i in 0..60 {
            window.push(audio_event(i as f64, 0.05));
            assert!(detector.evaluate(&stream, &window).is_none());
        }
    }

    #[test]
    fn second_trigger_after_cooldown_expires() {
        let stream = StreamId::new("s1");
        let mut detector = HypeDetector::new(hype_config());
        let mut window = StreamWindow::new(30.0, 256);

        window.push(audio_event(10.0, 0.95));
        window.push(audio_event(11.0, 0.95));
        window.push(audio_event(12.0, 0.95));
        assert!(detector.evaluate(&stream, &window).is_some());

        window.push(audio_event(30.0, 0.95));
        assert!(detector.evaluate(&stream, &window).is_none());

        window.push(audio_event(80.0, 0.95));
        assert!(detector.evaluate(&stream, &window).is_some());
    }

    #[test]
    fn cooldowns_are_per_stream() {
        let mut detector = HypeDetector::new(hype_config());
        let a = StreamId::new("a");
        let b = StreamId::new("b");

        let mut wa = StreamWindow::new(30.0, 256);
        let mut wb = StreamWindow::new(30.0, 256);
        for ts in [1.0, 2.0, 3.0] {
            wa.push(audio_event(ts, 0.95));
            wb.push(audio_event(ts, 0.95));
        }

        assert!(detector.evaluate(&a, &wa).is_some());
        assert!(detector.evaluate(&b, &wb).is_some());
    }

    #[test]
    fn missing_extractors_degrade_but_do_not_block() {
        // Audio-only capability set; strong audio alone must still be able
        // to cross a modest threshold.
        let config = LiveConfig {
            threshold: 0.3,
            ..hype_config()
        };
        let mut detector = HypeDetector::with_extractors(
            config,
            vec![Box::new(crate::extractor::AudioEnergyExtractor)],
        );
        let stream = StreamId::new("s1");
        let mut window = StreamWindow::new(30.0, 256);
        for ts in [1.0, 2.0, 3.0, 4.0] {
            window.push(audio_event(ts, 1.0));
        }

        let (combined, _) = detector.combined_score(&window);
        // Full audio score is weight-limited: 0.35 of the total weight.
        assert!(combined < 0.4);
        assert!(detector.evaluate(&stream, &window).is_some());
    }

    #[test]
    fn anchor_floors_at_stream_start() {
        let stream = StreamId::new("s1");
        let mut detector = HypeDetector::new(hype_config());
        let mut window = StreamWindow::new(30.0, 256);
        for ts in [1.0, 2.0, 3.0] {
            window.push(audio_event(ts, 0.95));
        }
        let moment = detector.evaluate(&stream, &window).unwrap();
        assert_eq!(moment.anchor_secs, 0.0);
    }
}

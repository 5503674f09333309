//! Transcript models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clip::ClipWindow;

/// One timestamped transcript segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    /// Segment start (seconds from source start)
    pub start_secs: f64,
    /// Segment end (seconds from source start)
    pub end_secs: f64,
    /// Spoken text
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start_secs: f64, end_secs: f64, text: impl Into<String>) -> Self {
        Self {
            start_secs,
            end_secs,
            text: text.into(),
        }
    }
}

/// An ordered transcript for one source video.
///
/// Invariant: segment start times are non-decreasing and segments do not
/// overlap. `Transcript::new` normalizes input to uphold this.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Transcript {
    /// BCP-47-ish language tag reported by the transcriber
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Ordered segments; empty for silent sources
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Build a transcript, sorting by start time and trimming overlaps.
    pub fn new(language: Option<String>, mut segments: Vec<TranscriptSegment>) -> Self {
        segments.retain(|s| s.end_secs > s.start_secs && !s.text.trim().is_empty());
        segments.sort_by(|a, b| {
            a.start_secs
                .partial_cmp(&b.start_secs)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Clip each segment's start to the previous end so starts stay
        // non-decreasing and windows never overlap.
        let mut prev_end = 0.0f64;
        let mut normalized = Vec::with_capacity(segments.len());
        for mut seg in segments {
            if seg.start_secs < prev_end {
                seg.start_secs = prev_end;
            }
            if seg.end_secs <= seg.start_secs {
                continue;
            }
            prev_end = seg.end_secs;
            normalized.push(seg);
        }

        Self {
            language,
            segments: normalized,
        }
    }

    /// True when the source produced no speech.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments overlapping the given window, for caption burn-in.
    pub fn segments_in_window(&self, window: &ClipWindow) -> Vec<&TranscriptSegment> {
        self.segments
            .iter()
            .filter(|s| s.start_secs < window.end_secs && s.end_secs > window.start_secs)
            .collect()
    }

    /// Render the transcript as timestamped prompt lines (`[HH:MM:SS] text`).
    pub fn to_prompt_text(&self) -> String {
        use crate::timestamp::format_seconds;

        let mut out = String::new();
        for seg in &self.segments {
            out.push_str(&format!(
                "[{}] {}\n",
                format_seconds(seg.start_secs),
                seg.text.trim()
            ));
        }
        out
    }

    /// Total duration covered by speech.
    pub fn spoken_secs(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.end_secs - s.start_secs)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_order_and_overlap() {
        let t = Transcript::new(
            Some("en".into()),
            vec![
                TranscriptSegment::new(5.0, 8.0, "second"),
                TranscriptSegment::new(0.0, 6.0, "first"),
                TranscriptSegment::new(7.0, 7.0, "empty window"),
                TranscriptSegment::new(9.0, 10.0, "   "),
            ],
        );

        assert_eq!(t.segments.len(), 2);
        assert_eq!(t.segments[0].text, "first");
        // overlapping start pushed to previous end
        assert_eq!(t.segments[1].start_secs, 6.0);
        assert_eq!(t.segments[1].end_secs, 8.0);
    }

    #[test]
    fn silent_source_is_empty_not_placeholder() {
        let t = Transcript::new(Some("en".into()), vec![]);
        assert!(t.is_empty());
        assert_eq!(t.to_prompt_text(), "");
    }

    #[test]
    fn window_overlap_query() {
        let t = Transcript::new(
            None,
            vec![
                TranscriptSegment::new(0.0, 5.0, "a"),
                TranscriptSegment::new(10.0, 15.0, "b"),
                TranscriptSegment::new(20.0, 25.0, "c"),
            ],
        );
        let hits = t.segments_in_window(&ClipWindow::new(4.0, 12.0));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "a");
        assert_eq!(hits[1].text, "b");
    }

    #[test]
    fn prompt_text_includes_timestamps() {
        let t = Transcript::new(None, vec![TranscriptSegment::new(90.0, 95.0, "hello")]);
        assert_eq!(t.to_prompt_text(), "[00:01:30] hello\n");
    }
}

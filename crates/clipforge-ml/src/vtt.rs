//! WebVTT caption parsing.
//!
//! Fallback transcript source when a caption sidecar already exists for the
//! media (uploaded alongside, or fetched with the source). Rolling captions
//! repeat their text across cues; consecutive duplicates are collapsed.

use clipforge_models::timestamp::parse_timestamp;
use clipforge_models::{Transcript, TranscriptSegment};

/// Parse WebVTT content into a transcript.
pub fn parse_vtt(content: &str) -> Transcript {
    let mut segments: Vec<TranscriptSegment> = Vec::new();
    let mut current: Option<(f64, f64)> = None;
    let mut last_text = String::new();

    for raw_line in content.lines() {
        let line = strip_tags(raw_line.trim());

        if line.is_empty() || line == "WEBVTT" || line.starts_with("NOTE") {
            continue;
        }

        if let Some((start, end)) = parse_cue_timing(&line) {
            current = Some((start, end));
            continue;
        }

        // Bare cue numbers
        if line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        if let Some((start, end)) = current {
            if line != last_text {
                segments.push(TranscriptSegment::new(start, end, line.clone()));
                last_text = line;
            }
        }
    }

    Transcript::new(None, segments)
}

/// Parse a `HH:MM:SS.mmm --> HH:MM:SS.mmm` cue timing line.
fn parse_cue_timing(line: &str) -> Option<(f64, f64)> {
    let (start_raw, rest) = line.split_once("-->")?;
    // Cue settings may trail the end timestamp.
    let end_raw = rest.trim().split_whitespace().next()?;
    let start = parse_timestamp(start_raw.trim()).ok()?;
    let end = parse_timestamp(end_raw.trim()).ok()?;
    Some((start, end))
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_cues() {
        let vtt = "WEBVTT\n\n1\n00:00:01.000 --> 00:00:04.000\nhello world\n\n2\n00:00:04.000 --> 00:00:08.500\nsecond cue\n";
        let t = parse_vtt(vtt);
        assert_eq!(t.segments.len(), 2);
        assert_eq!(t.segments[0].text, "hello world");
        assert_eq!(t.segments[0].start_secs, 1.0);
        assert!((t.segments[1].end_secs - 8.5).abs() < 0.001);
    }

    #[test]
    fn collapses_rolling_duplicates_and_tags() {
        let vtt = "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\n<c.color>same line</c>\n\n00:00:02.000 --> 00:00:03.000\nsame line\n";
        let t = parse_vtt(vtt);
        assert_eq!(t.segments.len(), 1);
        assert_eq!(t.segments[0].text, "same line");
    }

    #[test]
    fn ignores_cue_settings_after_timing() {
        let vtt = "WEBVTT\n\n00:01:00.000 --> 00:01:05.000 align:start position:0%\ncaption text\n";
        let t = parse_vtt(vtt);
        assert_eq!(t.segments.len(), 1);
        assert_eq!(t.segments[0].start_secs, 60.0);
    }

    #[test]
    fn empty_input_is_empty_transcript() {
        assert!(parse_vtt("WEBVTT\n").is_empty());
    }
}

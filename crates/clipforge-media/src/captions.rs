//! Subtitle sidecar emission and caption burn-in.
//!
//! Every clip gets an SRT and a VTT sidecar built from the transcript
//! segments overlapping its window, timestamps rebased to the window
//! start. Burn-in uses the SRT through ffmpeg's `subtitles` filter.

use std::path::Path;

use tokio::io::AsyncWriteExt;

use clipforge_models::{ClipWindow, TranscriptSegment};

use crate::error::{MediaError, MediaResult};

/// A caption cue rebased to clip-local time.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Rebase the overlapping transcript segments into clip-local cues.
pub fn cues_for_window(segments: &[&TranscriptSegment], window: &ClipWindow) -> Vec<Cue> {
    let clip_len = window.duration_secs();
    segments
        .iter()
        .filter_map(|seg| {
            let start = (seg.start_secs - window.start_secs).max(0.0);
            let end = (seg.end_secs - window.start_secs).min(clip_len);
            if end <= start {
                return None;
            }
            Some(Cue {
                start_secs: start,
                end_secs: end,
                text: seg.text.replace('\n', " ").trim().to_string(),
            })
        })
        .filter(|cue| !cue.text.is_empty())
        .collect()
}

/// Write cues as SRT (`HH:MM:SS,mmm` timestamps).
pub async fn write_srt(cues: &[Cue], path: &Path) -> MediaResult<()> {
    let mut body = String::new();
    for (i, cue) in cues.iter().enumerate() {
        body.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(cue.start_secs),
            srt_timestamp(cue.end_secs),
            cue.text
        ));
    }
    write_atomic(path, body.as_bytes()).await
}

/// Write cues as WebVTT (same cues, dot millisecond separator).
pub async fn write_vtt(cues: &[Cue], path: &Path) -> MediaResult<()> {
    let mut body = String::from("WEBVTT\n\n");
    for cue in cues {
        body.push_str(&format!(
            "{} --> {}\n{}\n\n",
            srt_timestamp(cue.start_secs).replace(',', "."),
            srt_timestamp(cue.end_secs).replace(',', "."),
            cue.text
        ));
    }
    write_atomic(path, body.as_bytes()).await
}

/// Burn-in filter referencing an SRT sidecar.
pub fn burn_in_filter(srt_path: &Path, font_size: u32, bottom_margin: u32) -> String {
    // The subtitles filter parses its argument with its own quoting rules;
    // escape the characters that terminate the filename.
    let escaped = srt_path
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'");
    format!(
        "subtitles='{escaped}':force_style='FontSize={font_size},Outline=2,MarginV={margin}'",
        margin = bottom_margin / 10
    )
}

fn srt_timestamp(secs: f64) -> String {
    let total_ms = (secs * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let mins = (total_ms % 3_600_000) / 60_000;
    let s = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;
    format!("{hours:02}:{mins:02}:{s:02},{ms:03}")
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> MediaResult<()> {
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| MediaError::output_write(format!("{}: {e}", tmp.display())))?;
    file.write_all(bytes)
        .await
        .map_err(|e| MediaError::output_write(format!("{}: {e}", tmp.display())))?;
    file.flush().await.ok();
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| MediaError::output_write(format!("{}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start, end, text)
    }

    #[test]
    fn cues_are_rebased_and_clipped() {
        let segments = vec![
            seg(58.0, 63.0, "spans the start"),
            seg(65.0, 70.0, "inside"),
            seg(88.0, 95.0, "spans the end"),
        ];
        let refs: Vec<&TranscriptSegment> = segments.iter().collect();
        let cues = cues_for_window(&refs, &ClipWindow::new(60.0, 90.0));

        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].start_secs, 0.0);
        assert_eq!(cues[0].end_secs, 3.0);
        assert_eq!(cues[1].start_secs, 5.0);
        assert_eq!(cues[2].end_secs, 30.0);
    }

    #[test]
    fn srt_timestamps_use_comma_millis() {
        assert_eq!(srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(srt_timestamp(61.5), "00:01:01,500");
        assert_eq!(srt_timestamp(3661.042), "01:01:01,042");
    }

    #[tokio::test]
    async fn writes_both_sidecar_formats() {
        let dir = tempfile::tempdir().unwrap();
        let cues = vec![Cue {
            start_secs: 1.0,
            end_secs: 3.5,
            text: "hello".into(),
        }];

        let srt = dir.path().join("clip.srt");
        let vtt = dir.path().join("clip.vtt");
        write_srt(&cues, &srt).await.unwrap();
        write_vtt(&cues, &vtt).await.unwrap();

        let srt_body = std::fs::read_to_string(&srt).unwrap();
        assert!(srt_body.starts_with("1\n00:00:01,000 --> 00:00:03,500\nhello"));

        let vtt_body = std::fs::read_to_string(&vtt).unwrap();
        assert!(vtt_body.starts_with("WEBVTT\n\n"));
        assert!(vtt_body.contains("00:00:01.000 --> 00:00:03.500"));
    }

    #[test]
    fn burn_in_filter_escapes_path() {
        let f = burn_in_filter(Path::new("/tmp/a:b.srt"), 48, 150);
        assert!(f.contains("a\\:b.srt"));
        assert!(f.contains("FontSize=48"));
    }
}

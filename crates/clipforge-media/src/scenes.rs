//! Scene (camera cut) detection.
//!
//! Thin wrapper around ffmpeg's scene filter: frames clearing the scene
//! threshold pass through `showinfo`, whose stderr lines carry `pts_time`.

use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Detect scene-change timestamps (seconds), sorted ascending.
///
/// `threshold` is the scene-change sensitivity in 0.0..=1.0; lower values
/// report more cuts.
pub async fn detect_scene_cuts(
    media_path: &Path,
    threshold: f64,
    timeout_secs: u64,
) -> MediaResult<Vec<f64>> {
    let cmd = FfmpegCommand::analyze(media_path).filter_complex(format!(
        "select='gt(scene,{threshold})',showinfo"
    ));

    let stderr = FfmpegRunner::new()
        .with_timeout(timeout_secs)
        .run(&cmd)
        .await?;

    let cuts = parse_showinfo_timestamps(&stderr);
    debug!(count = cuts.len(), threshold, "Detected scene cuts");
    Ok(cuts)
}

fn parse_showinfo_timestamps(stderr: &str) -> Vec<f64> {
    let re = Regex::new(r"pts_time:([0-9.]+)").expect("static regex");
    let mut cuts: Vec<f64> = stderr
        .lines()
        .filter(|line| line.contains("showinfo"))
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps[1].parse().ok())
        .collect();
    cuts.sort_by(|a: &f64, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    cuts.dedup();
    cuts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_showinfo_lines_only() {
        let stderr = "\
[Parsed_showinfo_1 @ 0x2] n:   0 pts:  80000 pts_time:3.2     duration:...\n\
[Parsed_showinfo_1 @ 0x2] n:   1 pts: 300000 pts_time:12.0    duration:...\n\
[other] pts_time:99.0\n";
        assert_eq!(parse_showinfo_timestamps(stderr), vec![3.2, 12.0]);
    }

    #[test]
    fn output_is_sorted_and_deduped() {
        let stderr = "\
[Parsed_showinfo_1] pts_time:12.0\n\
[Parsed_showinfo_1] pts_time:3.2\n\
[Parsed_showinfo_1] pts_time:12.0\n";
        assert_eq!(parse_showinfo_timestamps(stderr), vec![3.2, 12.0]);
    }

    #[test]
    fn no_cuts_is_empty() {
        assert!(parse_showinfo_timestamps("frame= 100 fps=25\n").is_empty());
    }
}

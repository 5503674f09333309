//! Audio energy analysis.
//!
//! Splits the audio track into fixed windows and reports the RMS level of
//! each via ffmpeg's `astats` metadata output. Hype windows are the ones
//! whose level clears mean + k·stddev over the analyzed span.

use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// One analyzed audio window.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyWindow {
    pub start_secs: f64,
    pub end_secs: f64,
    /// Linear RMS level in 0..=1
    pub rms: f64,
    /// Standard deviations above the mean level
    pub score: f64,
}

/// Analyze audio energy in `window_secs` windows and return the windows
/// that spike `rms_multiplier` standard deviations above the mean.
pub async fn detect_energy_windows(
    media_path: &Path,
    window_secs: f64,
    rms_multiplier: f64,
    timeout_secs: u64,
) -> MediaResult<Vec<EnergyWindow>> {
    let samples_per_window = (48_000.0 * window_secs).round() as u64;
    let cmd = FfmpegCommand::analyze(media_path)
        .output_args(["-vn", "-ar", "48000"])
        .audio_filter(format!(
            "asetnsamples=n={samples_per_window},astats=metadata=1:reset=1,\
             ametadata=mode=print:key=lavfi.astats.Overall.RMS_level"
        ));

    let stderr = FfmpegRunner::new()
        .with_timeout(timeout_secs)
        .run(&cmd)
        .await?;

    let windows = parse_rms_windows(&stderr, window_secs);
    Ok(spike_windows(&windows, rms_multiplier))
}

/// Parse `(pts_time, rms_db)` pairs from ametadata print output.
fn parse_rms_windows(stderr: &str, window_secs: f64) -> Vec<(f64, f64)> {
    let pts_re = Regex::new(r"pts_time:([0-9.]+)").expect("static regex");
    let rms_re =
        Regex::new(r"lavfi\.astats\.Overall\.RMS_level=(-?[0-9.]+|-inf)").expect("static regex");

    let mut windows = Vec::new();
    let mut current_pts: Option<f64> = None;

    for line in stderr.lines() {
        if let Some(caps) = pts_re.captures(line) {
            current_pts = caps[1].parse().ok();
        } else if let Some(caps) = rms_re.captures(line) {
            let Some(pts) = current_pts.take() else {
                continue;
            };
            let db: f64 = match &caps[1] {
                "-inf" => -120.0,
                raw => raw.parse().unwrap_or(-120.0),
            };
            windows.push((pts, db));
        }
    }

    debug!(count = windows.len(), window_secs, "Parsed RMS windows");
    windows
}

/// Convert dB levels to linear and keep the spiking windows.
fn spike_windows(windows: &[(f64, f64)], rms_multiplier: f64) -> Vec<EnergyWindow> {
    if windows.is_empty() {
        return Vec::new();
    }

    let linear: Vec<(f64, f64)> = windows
        .iter()
        .map(|(pts, db)| (*pts, 10f64.powf(db / 20.0)))
        .collect();

    let mean = linear.iter().map(|(_, v)| v).sum::<f64>() / linear.len() as f64;
    let variance = linear
        .iter()
        .map(|(_, v)| (v - mean).powi(2))
        .sum::<f64>()
        / linear.len() as f64;
    let std = variance.sqrt().max(1e-6);
    let threshold = mean + rms_multiplier * std;

    let window_len = if linear.len() >= 2 {
        (linear[1].0 - linear[0].0).max(0.1)
    } else {
        1.0
    };

    linear
        .iter()
        .filter(|(_, v)| *v >= threshold)
        .map(|(pts, v)| EnergyWindow {
            start_secs: *pts,
            end_secs: pts + window_len,
            rms: v.min(1.0),
            score: (v - mean) / std,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pts_and_rms_pairs() {
        let stderr = "\
[Parsed_ametadata_2 @ 0x1] frame:0    pts:0      pts_time:0\n\
[Parsed_ametadata_2 @ 0x1] lavfi.astats.Overall.RMS_level=-32.5\n\
[Parsed_ametadata_2 @ 0x1] frame:1    pts:24000  pts_time:0.5\n\
[Parsed_ametadata_2 @ 0x1] lavfi.astats.Overall.RMS_level=-12.1\n\
[Parsed_ametadata_2 @ 0x1] frame:2    pts:48000  pts_time:1\n\
[Parsed_ametadata_2 @ 0x1] lavfi.astats.Overall.RMS_level=-inf\n";
        let windows = parse_rms_windows(stderr, 0.5);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], (0.0, -32.5));
        assert_eq!(windows[1], (0.5, -12.1));
        assert_eq!(windows[2], (1.0, -120.0));
    }

    #[test]
    fn flat_audio_has_no_spikes() {
        let windows: Vec<(f64, f64)> = (0..20).map(|i| (i as f64 * 0.5, -30.0)).collect();
        assert!(spike_windows(&windows, 2.0).is_empty());
    }

    #[test]
    fn loud_burst_is_detected() {
        let mut windows: Vec<(f64, f64)> = (0..40).map(|i| (i as f64 * 0.5, -40.0)).collect();
        windows[20] = (10.0, -6.0);
        windows[21] = (10.5, -7.0);

        let spikes = spike_windows(&windows, 2.0);
        assert_eq!(spikes.len(), 2);
        assert_eq!(spikes[0].start_secs, 10.0);
        assert!(spikes[0].score > 2.0);
        assert!(spikes[0].rms <= 1.0);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(spike_windows(&[], 2.0).is_empty());
    }
}

//! Clip rendering.
//!
//! Extracts one window from the source, reframes it to the target aspect
//! ratio, optionally burns in captions, and emits the normalized artifact
//! plus SRT/VTT sidecars. Rendering is idempotent per (job, window): output
//! names derive from a hash of both, and re-runs overwrite in place.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info};

use clipforge_models::{CaptionStyle, ClipWindow, JobId, RenderSpec, Transcript};

use crate::captions::{burn_in_filter, cues_for_window, write_srt, write_vtt};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::reframe::reframe_filter;

/// Normalized per-second horizontal subject centers for tracked crops.
#[derive(Debug, Clone, Default)]
pub struct SubjectTrack {
    /// (clip-local time, normalized center x in 0..=1) keyframes
    pub centers: Vec<(f64, f64)>,
}

/// One render request.
#[derive(Debug)]
pub struct RenderRequest<'a> {
    pub job_id: &'a JobId,
    pub source_path: &'a Path,
    pub source_duration_secs: f64,
    pub window: ClipWindow,
    pub spec: &'a RenderSpec,
    pub transcript: &'a Transcript,
    /// Subject track for `TrackedCrop`, when available
    pub track: Option<&'a SubjectTrack>,
    /// Directory the outputs land in
    pub output_dir: &'a Path,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Cancellation signal
    pub cancel: Option<watch::Receiver<bool>>,
}

/// Paths produced by a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub video_path: PathBuf,
    pub srt_path: PathBuf,
    pub vtt_path: PathBuf,
    /// Stable per-(job, window) key the outputs are named by
    pub window_key: String,
}

/// Stable output key for a (job, window) pair.
///
/// The window is quantized to milliseconds so float jitter from re-selection
/// cannot produce a second artifact for the same cut.
pub fn window_key(job_id: &JobId, window: &ClipWindow) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_id.as_str().as_bytes());
    hasher.update(((window.start_secs * 1000.0).round() as i64).to_le_bytes());
    hasher.update(((window.end_secs * 1000.0).round() as i64).to_le_bytes());
    hex::encode(&hasher.finalize()[..12])
}

/// Render one clip window.
pub async fn render_clip(request: &RenderRequest<'_>) -> MediaResult<RenderOutput> {
    let window = validate_window(&request.window, request.source_duration_secs, request.spec)?;

    tokio::fs::create_dir_all(request.output_dir)
        .await
        .map_err(|e| {
            MediaError::output_write(format!("{}: {e}", request.output_dir.display()))
        })?;

    let key = window_key(request.job_id, &window);
    let video_path = request.output_dir.join(format!("clip_{key}.mp4"));
    let srt_path = request.output_dir.join(format!("clip_{key}.srt"));
    let vtt_path = request.output_dir.join(format!("clip_{key}.vtt"));

    // Sidecars first: the burn-in filter reads the SRT.
    let segments = request.transcript.segments_in_window(&window);
    let cues = cues_for_window(&segments, &window);
    write_srt(&cues, &srt_path).await?;
    write_vtt(&cues, &vtt_path).await?;

    let mut filter = reframe_filter(request.spec.reframe, request.spec.aspect_ratio, request.track);
    if let CaptionStyle::BurnIn {
        font_size,
        bottom_margin,
    } = &request.spec.captions
    {
        if !cues.is_empty() {
            filter = format!(
                "{filter},{}",
                burn_in_filter(&srt_path, *font_size, *bottom_margin)
            );
        }
    }

    let cmd = FfmpegCommand::new(request.source_path, &video_path)
        .window(window.start_secs, window.duration_secs())
        .video_filter(filter)
        .normalized_encode();

    let mut runner = FfmpegRunner::new().with_timeout(request.timeout_secs);
    if let Some(cancel) = &request.cancel {
        runner = runner.with_cancel(cancel.clone());
    }

    runner.run(&cmd).await?;

    if !video_path.exists() {
        return Err(MediaError::output_write(format!(
            "ffmpeg reported success but {} is missing",
            video_path.display()
        )));
    }

    info!(
        job_id = %request.job_id,
        key,
        start = window.start_secs,
        end = window.end_secs,
        "Rendered clip"
    );

    Ok(RenderOutput {
        video_path,
        srt_path,
        vtt_path,
        window_key: key,
    })
}

/// Extract a thumbnail frame from the middle of a rendered clip.
pub async fn render_thumbnail(video_path: &Path, timeout_secs: u64) -> MediaResult<PathBuf> {
    let thumb_path = video_path.with_extension("jpg");
    let cmd = FfmpegCommand::new(video_path, &thumb_path)
        .input_arg("-ss")
        .input_arg("1")
        .single_frame()
        .output_args(["-q:v", "4"]);

    FfmpegRunner::new()
        .with_timeout(timeout_secs)
        .run(&cmd)
        .await?;
    Ok(thumb_path)
}

/// Validate the window against source bounds and the spec's duration floor.
fn validate_window(
    window: &ClipWindow,
    source_duration_secs: f64,
    spec: &RenderSpec,
) -> MediaResult<ClipWindow> {
    let clamped = window
        .clamped_to(source_duration_secs)
        .ok_or_else(|| {
            MediaError::insufficient_source(format!(
                "window [{:.1}, {:.1}) lies outside the {:.1}s source",
                window.start_secs, window.end_secs, source_duration_secs
            ))
        })?;

    if clamped.duration_secs() + 1.0 < spec.min_duration_secs {
        return Err(MediaError::insufficient_source(format!(
            "window [{:.1}, {:.1}) is shorter than the {:.0}s minimum",
            clamped.start_secs, clamped.end_secs, spec.min_duration_secs
        )));
    }

    if clamped != *window {
        debug!(
            start = window.start_secs,
            end = window.end_secs,
            source_duration_secs,
            "Clamped render window to source bounds"
        );
    }

    Ok(clamped)
}

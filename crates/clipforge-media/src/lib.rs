//! FFmpeg CLI wrapper for the render stage and media analysis.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with cancellation and timeouts
//! - Source probing via ffprobe
//! - Reframing filters (pad, center crop, tracked crop)
//! - Caption burn-in plus SRT/VTT sidecar emission
//! - Idempotent per-(job, window) clip rendering
//! - Audio-energy and scene-cut analysis primitives for the live path
//! - URL source download into a job workdir

pub mod captions;
pub mod command;
pub mod download;
pub mod energy;
pub mod error;
pub mod probe;
pub mod reframe;
pub mod render;
pub mod scenes;

pub use captions::{write_srt, write_vtt};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use download::{download_source, is_permanent_download_failure};
pub use energy::{detect_energy_windows, EnergyWindow};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_source, SourceInfo};
pub use render::{render_clip, render_thumbnail, RenderOutput, RenderRequest, SubjectTrack};
pub use scenes::detect_scene_cuts;

//! Shared data models for the ClipForge pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, sources, and the job status state machine
//! - Clips and candidate windows
//! - Transcripts
//! - Render specifications
//! - Live signal events
//! - Progress messages and the poller status snapshot

pub mod clip;
pub mod job;
pub mod progress;
pub mod render;
pub mod signal;
pub mod timestamp;
pub mod transcript;

// Re-export common types
pub use clip::{Candidate, Clip, ClipCategory, ClipId, ClipOutcome, ClipWindow};
pub use job::{
    JobId, JobParams, JobRecord, JobStatus, QueueClass, ReasonCode, SourceDescriptor, Stage,
};
pub use progress::{JobStatusSnapshot, ProgressUpdate, StatusSummary};
pub use render::{AspectRatio, CaptionStyle, ReframeMode, RenderSpec};
pub use signal::{SignalEvent, SignalKind, SignalPayload, SignalScore, StreamId};
pub use transcript::{Transcript, TranscriptSegment};

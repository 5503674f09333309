//! Upstream ML adapters.
//!
//! This crate provides:
//! - A transcription client for a Whisper-style HTTP service, with a VTT
//!   sidecar parser as a caption-file fallback
//! - A moment-selection client that turns a transcript (and, on the live
//!   path, a signal-window summary) into ranked candidate windows with a
//!   strict response schema
//!
//! Both adapters classify failures at the boundary: malformed upstream
//! payloads surface as typed errors, never coerced fields.

pub mod error;
pub mod select;
pub mod transcribe;
pub mod vtt;

pub use error::{MlError, MlResult};
pub use select::{SelectionClient, SelectionConfig, SelectionRequest};
pub use transcribe::{TranscribeClient, TranscribeConfig};
pub use vtt::parse_vtt;

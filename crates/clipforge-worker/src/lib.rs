//! Clip pipeline worker.
//!
//! Pulls job envelopes from the shared queue, takes an exclusive lease,
//! and runs Transcription -> Moment-Selection -> Render -> Publish
//! sequentially for each job, with independent jobs running in parallel
//! up to the pool size.

pub mod config;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod retry;
pub mod seams;

pub use config::WorkerConfig;
pub use error::{PipelineError, PipelineResult};
pub use executor::JobExecutor;
pub use pipeline::{run_job, PipelineContext};
pub use retry::RetryPolicy;
pub use seams::{
    ArtifactPublisher, ClipRenderer, MomentSelector, RenderInput, RenderedClip, SelectionInput,
    SourceResolver, Transcriber,
};

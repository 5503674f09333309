//! Stage seams.
//!
//! Each external stage sits behind a trait so the pipeline can be driven
//! end-to-end against fakes. The production implementations wrap the ml,
//! media, and storage crates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use clipforge_models::{Candidate, ClipWindow, JobId, RenderSpec, SourceDescriptor, Transcript};
use clipforge_storage::{ClipUpload, ObjectStoreClient, PublishedClip};

use crate::config::WorkerConfig;
use crate::error::{PipelineError, PipelineResult};

/// A resolved local source plus its probed duration.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Resolves a source descriptor to a local media file.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(
        &self,
        source: &SourceDescriptor,
        workdir: &Path,
    ) -> PipelineResult<ResolvedSource>;
}

/// Transcription stage.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media: &Path) -> PipelineResult<Transcript>;
}

/// Everything the selection stage needs.
#[derive(Debug, Clone)]
pub struct SelectionInput {
    pub transcript: Transcript,
    pub source_duration_secs: f64,
    pub clip_count: u32,
    pub target_duration_secs: u32,
    pub instructions: Option<String>,
    pub live_context: Option<String>,
}

/// Moment-selection stage.
#[async_trait]
pub trait MomentSelector: Send + Sync {
    async fn select(&self, input: &SelectionInput) -> PipelineResult<Vec<Candidate>>;
}

/// One render invocation.
pub struct RenderInput<'a> {
    pub job_id: &'a JobId,
    pub source: &'a ResolvedSource,
    pub window: ClipWindow,
    pub spec: &'a RenderSpec,
    pub transcript: &'a Transcript,
    pub output_dir: &'a Path,
    pub cancel: watch::Receiver<bool>,
}

/// Files a render produced.
#[derive(Debug, Clone)]
pub struct RenderedClip {
    pub window_key: String,
    pub video_path: PathBuf,
    pub srt_path: PathBuf,
    pub vtt_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
}

/// Render stage.
#[async_trait]
pub trait ClipRenderer: Send + Sync {
    async fn render(&self, input: RenderInput<'_>) -> PipelineResult<RenderedClip>;
}

/// Publish stage.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(
        &self,
        owner_id: &str,
        job_id: &JobId,
        clip: &RenderedClip,
    ) -> PipelineResult<PublishedClip>;
}

// ---------------------------------------------------------------------------
// Production implementations
// ---------------------------------------------------------------------------

/// Source resolution over local paths, yt-dlp downloads, and the live
/// archive mount.
pub struct MediaSourceResolver {
    config: WorkerConfig,
}

impl MediaSourceResolver {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    async fn probe(path: &Path) -> PipelineResult<ResolvedSource> {
        let info = clipforge_media::probe_source(path).await?;
        Ok(ResolvedSource {
            path: path.to_path_buf(),
            duration_secs: info.duration_secs,
        })
    }
}

#[async_trait]
impl SourceResolver for MediaSourceResolver {
    async fn resolve(
        &self,
        source: &SourceDescriptor,
        workdir: &Path,
    ) -> PipelineResult<ResolvedSource> {
        match source {
            SourceDescriptor::Upload { path } => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(PipelineError::invalid_input(format!(
                        "uploaded file missing: {}",
                        path.display()
                    )));
                }
                Self::probe(&path).await
            }
            SourceDescriptor::Url { url } => {
                let local = clipforge_media::download_source(
                    url,
                    workdir,
                    self.config.download_timeout.as_secs(),
                )
                .await?;
                Self::probe(&local).await
            }
            SourceDescriptor::Live { stream_id, .. } => {
                // The stream relay writes a rolling archive per stream; the
                // anchor selects within it via the selection stage.
                let path = Path::new(&self.config.live_archive_dir)
                    .join(format!("{stream_id}.mp4"));
                if !path.exists() {
                    return Err(PipelineError::TransientIo(format!(
                        "live archive not yet available: {}",
                        path.display()
                    )));
                }
                Self::probe(&path).await
            }
        }
    }
}

/// `Transcriber` over the HTTP transcription service.
pub struct HttpTranscriber {
    client: clipforge_ml::TranscribeClient,
}

impl HttpTranscriber {
    pub fn from_env() -> PipelineResult<Self> {
        Ok(Self {
            client: clipforge_ml::TranscribeClient::from_env()
                .map_err(PipelineError::from)?,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, media: &Path) -> PipelineResult<Transcript> {
        Ok(self.client.transcribe(media).await?)
    }
}

/// `MomentSelector` over the LLM ranking API.
pub struct LlmMomentSelector {
    client: clipforge_ml::SelectionClient,
}

impl LlmMomentSelector {
    pub fn from_env() -> PipelineResult<Self> {
        Ok(Self {
            client: clipforge_ml::SelectionClient::from_env().map_err(PipelineError::from)?,
        })
    }
}

#[async_trait]
impl MomentSelector for LlmMomentSelector {
    async fn select(&self, input: &SelectionInput) -> PipelineResult<Vec<Candidate>> {
        let request = clipforge_ml::SelectionRequest {
            transcript: &input.transcript,
            source_duration_secs: input.source_duration_secs,
            clip_count: input.clip_count,
            target_duration_secs: input.target_duration_secs,
            instructions: input.instructions.as_deref(),
            live_context: input.live_context.clone(),
        };
        Ok(self.client.select_moments(&request).await?)
    }
}

/// `ClipRenderer` over the ffmpeg render path.
pub struct FfmpegClipRenderer {
    config: WorkerConfig,
}

impl FfmpegClipRenderer {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClipRenderer for FfmpegClipRenderer {
    async fn render(&self, input: RenderInput<'_>) -> PipelineResult<RenderedClip> {
        let request = clipforge_media::RenderRequest {
            job_id: input.job_id,
            source_path: &input.source.path,
            source_duration_secs: input.source.duration_secs,
            window: input.window,
            spec: input.spec,
            transcript: input.transcript,
            track: None,
            output_dir: input.output_dir,
            timeout_secs: self.config.render_timeout.as_secs(),
            cancel: Some(input.cancel),
        };
        let output = clipforge_media::render_clip(&request).await?;

        // Thumbnails are best-effort; a failure never fails the clip.
        let thumbnail_path = clipforge_media::render_thumbnail(&output.video_path, 60)
            .await
            .ok();

        Ok(RenderedClip {
            window_key: output.window_key,
            video_path: output.video_path,
            srt_path: output.srt_path,
            vtt_path: output.vtt_path,
            thumbnail_path,
        })
    }
}

/// `ArtifactPublisher` over the object store.
pub struct ObjectStorePublisher {
    client: Arc<ObjectStoreClient>,
}

impl ObjectStorePublisher {
    pub fn new(client: Arc<ObjectStoreClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactPublisher for ObjectStorePublisher {
    async fn publish(
        &self,
        owner_id: &str,
        job_id: &JobId,
        clip: &RenderedClip,
    ) -> PipelineResult<PublishedClip> {
        let upload = ClipUpload {
            window_key: clip.window_key.clone(),
            video_path: clip.video_path.clone(),
            srt_path: clip.srt_path.clone(),
            vtt_path: clip.vtt_path.clone(),
            thumbnail_path: clip.thumbnail_path.clone(),
        };
        Ok(self.client.publish_clip(owner_id, job_id, &upload).await?)
    }
}

//! End-to-end pipeline scenarios against seam fakes and in-memory stores.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use clipforge_models::{
    Candidate, ClipCategory, ClipOutcome, ClipWindow, JobParams, JobRecord, JobStatus, ReasonCode,
    SourceDescriptor, Transcript, TranscriptSegment,
};
use clipforge_queue::JobEnvelope;
use clipforge_records::{ClipStore, JobStore, MemoryStore};
use clipforge_storage::PublishedClip;
use clipforge_worker::{
    run_job, ArtifactPublisher, ClipRenderer, MomentSelector, PipelineContext, PipelineError,
    PipelineResult, RenderInput, RenderedClip, RetryPolicy, SelectionInput, SourceResolver,
    Transcriber, WorkerConfig,
};

const SOURCE_DURATION: f64 = 600.0;

struct FakeResolver;

#[async_trait]
impl SourceResolver for FakeResolver {
    async fn resolve(
        &self,
        _source: &SourceDescriptor,
        _workdir: &Path,
    ) -> PipelineResult<clipforge_worker::seams::ResolvedSource> {
        Ok(clipforge_worker::seams::ResolvedSource {
            path: PathBuf::from("/tmp/fake-source.mp4"),
            duration_secs: SOURCE_DURATION,
        })
    }
}

struct FakeTranscriber {
    transcript: Transcript,
}

impl FakeTranscriber {
    fn talky() -> Self {
        let segments = (0..60)
            .map(|i| TranscriptSegment::new(i as f64 * 10.0, i as f64 * 10.0 + 8.0, format!("line {i}")))
            .collect();
        Self {
            transcript: Transcript::new(Some("en".into()), segments),
        }
    }

    fn silent() -> Self {
        Self {
            transcript: Transcript::new(Some("en".into()), vec![]),
        }
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _media: &Path) -> PipelineResult<Transcript> {
        Ok(self.transcript.clone())
    }
}

struct FakeSelector {
    count: u32,
}

#[async_trait]
impl MomentSelector for FakeSelector {
    async fn select(&self, input: &SelectionInput) -> PipelineResult<Vec<Candidate>> {
        let n = self.count.min(input.clip_count);
        Ok((0..n)
            .map(|i| {
                let start = 50.0 + i as f64 * 100.0;
                Candidate {
                    window: ClipWindow::new(start, start + input.target_duration_secs as f64),
                    virality_score: 90 - i as u8,
                    hook: format!("Hook for moment {}", i + 1),
                    category: ClipCategory::Dramatic,
                    reasoning: Some("peak moment".into()),
                }
            })
            .collect())
    }
}

struct FailingSelector;

#[async_trait]
impl MomentSelector for FailingSelector {
    async fn select(&self, _input: &SelectionInput) -> PipelineResult<Vec<Candidate>> {
        Err(PipelineError::UpstreamUnavailable("503 from ranker".into()))
    }
}

#[derive(Default)]
struct FakeRenderer {
    /// Ranks that must fail with a toolchain error (1-indexed render order)
    fail_windows: Vec<u32>,
    calls: AtomicU32,
    rendered_keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ClipRenderer for FakeRenderer {
    async fn render(&self, input: RenderInput<'_>) -> PipelineResult<RenderedClip> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_windows.contains(&call) {
            return Err(PipelineError::Toolchain("synthetic encoder failure".into()));
        }

        let key = format!(
            "{}-{}-{}",
            input.job_id,
            input.window.start_secs as u64,
            input.window.end_secs as u64
        );
        self.rendered_keys.lock().await.push(key.clone());
        Ok(RenderedClip {
            window_key: key.clone(),
            video_path: PathBuf::from(format!("/tmp/{key}.mp4")),
            srt_path: PathBuf::from(format!("/tmp/{key}.srt")),
            vtt_path: PathBuf::from(format!("/tmp/{key}.vtt")),
            thumbnail_path: None,
        })
    }
}

#[derive(Default)]
struct FakePublisher {
    published: Mutex<Vec<String>>,
}

#[async_trait]
impl ArtifactPublisher for FakePublisher {
    async fn publish(
        &self,
        owner_id: &str,
        job_id: &clipforge_models::JobId,
        clip: &RenderedClip,
    ) -> PipelineResult<PublishedClip> {
        let base = format!("{owner_id}/{job_id}/clips/clip_{}", clip.window_key);
        self.published.lock().await.push(base.clone());
        Ok(PublishedClip {
            artifact_locator: format!("{base}.mp4"),
            srt_locator: format!("{base}.srt"),
            vtt_locator: format!("{base}.vtt"),
            thumbnail_locator: None,
        })
    }
}

struct Harness {
    ctx: PipelineContext,
    store: MemoryStore,
}

fn fast_retry(stage: &'static str) -> RetryPolicy {
    RetryPolicy::new(stage).with_base_delay(Duration::from_millis(1))
}

fn harness(
    transcriber: FakeTranscriber,
    selector: Arc<dyn MomentSelector>,
    renderer: Arc<FakeRenderer>,
) -> Harness {
    let store = MemoryStore::new();
    let ctx = PipelineContext {
        config: WorkerConfig::default(),
        queue: None,
        progress: None,
        status: None,
        jobs: Arc::new(store.clone()),
        clips: Arc::new(store.clone()),
        resolver: Arc::new(FakeResolver),
        transcriber: Arc::new(transcriber),
        selector,
        renderer,
        publisher: Arc::new(FakePublisher::default()),
        ingest_retry: fast_retry("ingest"),
        transcribe_retry: fast_retry("transcribe"),
        select_retry: fast_retry("select"),
        render_retry: fast_retry("render"),
        publish_retry: fast_retry("publish"),
    };
    Harness { ctx, store }
}

async fn submit(store: &MemoryStore, params: JobParams) -> (JobRecord, JobEnvelope) {
    let record = JobRecord::new(
        "user-1",
        SourceDescriptor::Url {
            url: "https://example.com/v.mp4".into(),
        },
        params,
    );
    let envelope = JobEnvelope::from_record(&record);
    store.create_job(&record).await.unwrap();
    (record, envelope)
}

fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn happy_path_produces_requested_clip_set() {
    let renderer = Arc::new(FakeRenderer::default());
    let h = harness(
        FakeTranscriber::talky(),
        Arc::new(FakeSelector { count: 5 }),
        Arc::clone(&renderer),
    );
    let (record, envelope) = submit(&h.store, JobParams::default()).await;

    let status = run_job(&h.ctx, &envelope, no_cancel()).await.unwrap();
    assert_eq!(status, JobStatus::Completed);

    let stored = h.store.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 100);

    let clips = h.store.list_clips(&record.id).await.unwrap();
    assert_eq!(clips.len(), 5);
    for clip in &clips {
        assert_eq!(clip.outcome, ClipOutcome::Published);
        assert!(!clip.hook.is_empty());
        assert!(clip.artifact_locator.is_some());
        assert!(clip.srt_locator.is_some());
        assert!(clip.vtt_locator.is_some());
        // requested 30s windows, within the 1s boundary-clamp tolerance
        assert!((clip.window.duration_secs() - 30.0).abs() <= 1.0);
        assert!(clip.window.start_secs >= 0.0);
        assert!(clip.window.end_secs <= SOURCE_DURATION);
    }
    // ranks are 1..=5 in order
    let ranks: Vec<u32> = clips.iter().map(|c| c.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn silent_source_completes_with_zero_clips_and_warning() {
    let h = harness(
        FakeTranscriber::silent(),
        Arc::new(FakeSelector { count: 5 }),
        Arc::new(FakeRenderer::default()),
    );
    let (record, envelope) = submit(&h.store, JobParams::default()).await;

    let status = run_job(&h.ctx, &envelope, no_cancel()).await.unwrap();
    assert_eq!(status, JobStatus::Completed);

    let stored = h.store.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.reason_code, Some(ReasonCode::WarningNoContent));
    assert!(h.store.list_clips(&record.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn one_bad_window_yields_completed_with_warnings() {
    // Window 3's render fails through the whole retry budget (3 attempts:
    // calls 3, 4, 5 in render order), siblings proceed.
    let renderer = Arc::new(FakeRenderer {
        fail_windows: vec![3, 4, 5],
        ..Default::default()
    });
    let h = harness(
        FakeTranscriber::talky(),
        Arc::new(FakeSelector { count: 5 }),
        Arc::clone(&renderer),
    );
    let (record, envelope) = submit(&h.store, JobParams::default()).await;

    let status = run_job(&h.ctx, &envelope, no_cancel()).await.unwrap();
    assert_eq!(status, JobStatus::CompletedWithWarnings);

    let stored = h.store.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.reason_code, Some(ReasonCode::PartialFailure));

    let clips = h.store.list_clips(&record.id).await.unwrap();
    assert_eq!(clips.len(), 5);
    let published: Vec<_> = clips
        .iter()
        .filter(|c| c.outcome == ClipOutcome::Published)
        .collect();
    let failed: Vec<_> = clips
        .iter()
        .filter(|c| c.outcome == ClipOutcome::Failed)
        .collect();
    assert_eq!(published.len(), 4);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].rank, 3);
    assert!(failed[0].failure.as_deref().unwrap().contains("encoder"));
}

#[tokio::test]
async fn persistent_selection_failure_is_never_a_silent_empty_result() {
    let h = harness(
        FakeTranscriber::talky(),
        Arc::new(FailingSelector),
        Arc::new(FakeRenderer::default()),
    );
    let (record, envelope) = submit(&h.store, JobParams::default()).await;

    let err = run_job(&h.ctx, &envelope, no_cancel()).await.unwrap_err();
    assert!(matches!(err, PipelineError::UpstreamSelectionFailed(_)));

    // The record is still processing; the executor owns the terminal
    // transition after classifying the error.
    let stored = h.store.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert!(h.store.list_clips(&record.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_is_honored_before_clips_exist() {
    let h = harness(
        FakeTranscriber::talky(),
        Arc::new(FakeSelector { count: 5 }),
        Arc::new(FakeRenderer::default()),
    );
    let (record, envelope) = submit(&h.store, JobParams::default()).await;
    h.store.request_cancel(&record.id).await.unwrap();

    let status = run_job(&h.ctx, &envelope, no_cancel()).await.unwrap();
    assert_eq!(status, JobStatus::Canceled);

    let stored = h.store.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Canceled);
    assert!(h.store.list_clips(&record.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_params_fail_without_touching_stages() {
    let h = harness(
        FakeTranscriber::talky(),
        Arc::new(FakeSelector { count: 5 }),
        Arc::new(FakeRenderer::default()),
    );
    let params = JobParams {
        clip_count: 0,
        ..JobParams::default()
    };
    let (_, envelope) = submit(&h.store, params).await;

    let err = run_job(&h.ctx, &envelope, no_cancel()).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[tokio::test]
async fn redelivery_of_a_finished_job_is_a_no_op() {
    let renderer = Arc::new(FakeRenderer::default());
    let h = harness(
        FakeTranscriber::talky(),
        Arc::new(FakeSelector { count: 2 }),
        Arc::clone(&renderer),
    );
    let (record, envelope) = submit(&h.store, JobParams::default()).await;

    let first = run_job(&h.ctx, &envelope, no_cancel()).await.unwrap();
    assert_eq!(first, JobStatus::Completed);
    let renders_after_first = renderer.calls.load(Ordering::SeqCst);

    // Same envelope delivered again (queue at-least-once semantics)
    let second = run_job(&h.ctx, &envelope, no_cancel()).await.unwrap();
    assert_eq!(second, JobStatus::Completed);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), renders_after_first);
    assert_eq!(h.store.list_clips(&record.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn requeue_after_lease_expiry_then_success_counts_one_retry() {
    // The crash/retry path: the record goes processing -> queued with a
    // bumped retry count, then a fresh attempt completes it.
    let renderer = Arc::new(FakeRenderer::default());
    let h = harness(
        FakeTranscriber::talky(),
        Arc::new(FakeSelector { count: 1 }),
        Arc::clone(&renderer),
    );
    let (record, envelope) = submit(&h.store, JobParams::default()).await;

    // First worker died mid-processing; the queue requeues the job.
    let started = h.store.get_job(&record.id).await.unwrap().unwrap().start();
    h.store.update_job(&started).await.unwrap();
    let requeued = started.requeue("lease expired");
    h.store.update_job(&requeued).await.unwrap();
    assert_eq!(requeued.retry_count, 1);

    let status = run_job(&h.ctx, &envelope, no_cancel()).await.unwrap();
    assert_eq!(status, JobStatus::Completed);

    let stored = h.store.get_job(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.status, JobStatus::Completed);
}

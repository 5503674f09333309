//! The four-stage job pipeline.
//!
//! Stages run sequentially inside one worker: resolve/ingest, transcribe,
//! select, then render+publish per candidate with per-clip failure
//! isolation. Cancellation is honored between stages. Job-level terminal
//! failures propagate as errors; the executor owns the final record
//! transition for those.

use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::watch;
use tracing::{info, warn};

use clipforge_models::{
    Clip, JobId, JobRecord, JobStatus, ProgressUpdate, ReasonCode, RenderSpec, Stage,
    StatusSummary,
};
use clipforge_queue::{JobEnvelope, JobQueue, ProgressChannel, StatusCache};
use clipforge_records::{ClipStore, JobStore};

use crate::config::WorkerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::retry::RetryPolicy;
use crate::seams::{
    ArtifactPublisher, ClipRenderer, MomentSelector, RenderInput, SelectionInput, SourceResolver,
    Transcriber,
};

/// Everything a worker needs to run jobs.
///
/// The queue, progress channel, and status cache are optional so the
/// pipeline also runs in standalone mode (and under test) with only the
/// record stores.
pub struct PipelineContext {
    pub config: WorkerConfig,
    pub queue: Option<Arc<JobQueue>>,
    pub progress: Option<Arc<ProgressChannel>>,
    pub status: Option<Arc<StatusCache>>,
    pub jobs: Arc<dyn JobStore>,
    pub clips: Arc<dyn ClipStore>,
    pub resolver: Arc<dyn SourceResolver>,
    pub transcriber: Arc<dyn Transcriber>,
    pub selector: Arc<dyn MomentSelector>,
    pub renderer: Arc<dyn ClipRenderer>,
    pub publisher: Arc<dyn ArtifactPublisher>,
    pub ingest_retry: RetryPolicy,
    pub transcribe_retry: RetryPolicy,
    pub select_retry: RetryPolicy,
    pub render_retry: RetryPolicy,
    pub publish_retry: RetryPolicy,
}

impl PipelineContext {
    /// Default retry policies per stage.
    pub fn default_retries() -> (RetryPolicy, RetryPolicy, RetryPolicy, RetryPolicy, RetryPolicy) {
        (
            RetryPolicy::new("ingest"),
            RetryPolicy::new("transcribe"),
            RetryPolicy::new("select").with_max_attempts(4),
            RetryPolicy::new("render"),
            RetryPolicy::new("publish"),
        )
    }

    async fn publish_update(&self, job_id: &JobId, update: ProgressUpdate) {
        if let Some(progress) = &self.progress {
            progress.publish(job_id, update).await.ok();
        }
    }

    async fn snapshot<F>(&self, record: &JobRecord, mutate: F)
    where
        F: FnOnce(&mut clipforge_models::JobStatusSnapshot),
    {
        if let Some(status) = &self.status {
            let job_id = record.id.clone();
            let owner = record.owner_id.clone();
            status
                .update(
                    &record.id,
                    move || clipforge_models::JobStatusSnapshot::new(job_id, owner),
                    mutate,
                )
                .await
                .ok();
        }
    }

    async fn enter_stage(&self, record: &JobRecord, stage: Stage) {
        info!(job_id = %record.id, stage = %stage, "Entering stage");
        self.snapshot(record, |s| s.set_stage(stage)).await;
        self.publish_update(
            &record.id,
            ProgressUpdate::Stage {
                stage,
                percent: stage.entry_progress(),
            },
        )
        .await;
    }

    /// Cancellation is checked between stages: the sticky record flag or
    /// the queue-side flag both count.
    async fn cancel_requested(&self, job_id: &JobId) -> bool {
        if let Ok(Some(record)) = self.jobs.get_job(job_id).await {
            if record.cancel_requested {
                return true;
            }
        }
        if let Some(queue) = &self.queue {
            if let Ok(true) = queue.is_cancel_requested(job_id).await {
                return true;
            }
        }
        false
    }
}

/// Run one job to a terminal state, or to a job-level error the executor
/// classifies for retry.
pub async fn run_job(
    ctx: &PipelineContext,
    envelope: &JobEnvelope,
    cancel: watch::Receiver<bool>,
) -> PipelineResult<JobStatus> {
    let job_id = &envelope.job_id;

    // The record is the durable source of truth; redelivered envelopes for
    // finished jobs are a no-op.
    let mut record = match ctx.jobs.get_job(job_id).await? {
        Some(record) => record,
        None => {
            let record = record_from_envelope(envelope);
            ctx.jobs.create_job(&record).await?;
            record
        }
    };
    if record.status.is_terminal() {
        info!(%job_id, status = %record.status, "Job already terminal, skipping");
        return Ok(record.status);
    }

    if let Err(msg) = record.params.validate() {
        return Err(PipelineError::invalid_input(msg));
    }

    if ctx.cancel_requested(job_id).await {
        return finalize_canceled(ctx, record).await;
    }

    // queued -> processing
    record = record.start().with_stage(Stage::Ingest);
    ctx.jobs.update_job(&record).await?;
    ctx.snapshot(&record, |s| {
        s.set_status(JobStatus::Processing);
        s.record_heartbeat();
    })
    .await;
    ctx.enter_stage(&record, Stage::Ingest).await;
    counter!("pipeline_jobs_started").increment(1);

    let workdir = PathBuf::from(&ctx.config.work_dir).join(job_id.as_str());
    let source = ctx
        .ingest_retry
        .run(|| ctx.resolver.resolve(&record.source, &workdir))
        .await?;

    if ctx.cancel_requested(job_id).await {
        return finalize_canceled(ctx, record).await;
    }
    ctx.enter_stage(&record, Stage::Transcribe).await;

    let transcript = ctx
        .transcribe_retry
        .run(|| ctx.transcriber.transcribe(&source.path))
        .await?;

    // Silent source: zero segments is a valid, complete result.
    if transcript.is_empty() {
        info!(%job_id, "No speech in source; completing with zero clips");
        return finalize_no_content(ctx, record, "no speech detected in source").await;
    }

    if ctx.cancel_requested(job_id).await {
        return finalize_canceled(ctx, record).await;
    }
    ctx.enter_stage(&record, Stage::Select).await;

    let selection_input = SelectionInput {
        transcript: transcript.clone(),
        source_duration_secs: source.duration_secs,
        clip_count: record.params.clip_count,
        target_duration_secs: record.params.target_duration_secs,
        instructions: record.params.prompt_instructions.clone(),
        live_context: envelope.live_trigger.as_ref().map(|t| {
            format!(
                "combined salience {:.2}; signals: {}",
                t.combined_score,
                t.labels.join(", ")
            )
        }),
    };
    let candidates = match ctx
        .select_retry
        .run(|| ctx.selector.select(&selection_input))
        .await
    {
        Ok(candidates) => candidates,
        // The budget is spent; candidates may well have existed, so this
        // must surface as a selection failure, never a quiet empty result.
        Err(e) if e.is_call_retryable() => {
            return Err(PipelineError::UpstreamSelectionFailed(e.to_string()))
        }
        Err(e) => return Err(e),
    };

    if candidates.is_empty() {
        info!(%job_id, "Selection returned no candidates; completing with zero clips");
        return finalize_no_content(ctx, record, "content too thin for clip candidates").await;
    }

    if ctx.cancel_requested(job_id).await {
        return finalize_canceled(ctx, record).await;
    }
    ctx.enter_stage(&record, Stage::Render).await;

    let spec = RenderSpec::resolve(&record.params);
    let total = candidates.len() as u32;
    let mut summary = StatusSummary::default();
    let mut last_clip_error: Option<PipelineError> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let rank = index as u32 + 1;

        if ctx.cancel_requested(job_id).await {
            return finalize_canceled(ctx, record).await;
        }

        let mut clip = Clip::from_candidate(job_id.clone(), rank, candidate);
        ctx.clips.append_clip(&clip).await?;

        let outcome = render_and_publish(ctx, &record, &source, &spec, &transcript, candidate, &workdir, cancel.clone())
            .await;

        match outcome {
            Ok(published) => {
                clip = clip.published(
                    published.artifact_locator,
                    published.srt_locator,
                    published.vtt_locator,
                );
                ctx.clips.update_clip(&clip).await?;
                summary.clips_published += 1;
                counter!("pipeline_clips_published").increment(1);

                let done = summary.clips_published + summary.clips_failed;
                let percent = Stage::Render.entry_progress()
                    + ((90 - Stage::Render.entry_progress() as u32) * done / total) as u8;
                record = record.with_progress(percent);
                ctx.jobs.update_job(&record).await?;
                ctx.snapshot(&record, |s| {
                    s.set_progress(percent);
                    s.summary.clips_published += 1;
                })
                .await;
                ctx.publish_update(job_id, ProgressUpdate::ClipPublished { rank, total })
                    .await;
            }
            Err(PipelineError::Canceled) => return finalize_canceled(ctx, record).await,
            Err(PipelineError::LeaseLost) => return Err(PipelineError::LeaseLost),
            Err(e) => {
                // Everything else is terminal for this window only.
                warn!(%job_id, rank, error = %e, "Clip failed; siblings proceed");
                let detail = e.to_string();
                clip = clip.failed(detail.clone());
                ctx.clips.update_clip(&clip).await?;
                summary.clips_failed += 1;
                summary.failures.push((rank, detail.clone()));
                counter!("pipeline_clips_failed").increment(1);
                ctx.snapshot(&record, |s| {
                    s.summary.clips_failed += 1;
                    s.summary.failures.push((rank, detail.clone()));
                })
                .await;
                ctx.publish_update(job_id, ProgressUpdate::ClipFailed { rank, detail })
                    .await;
                last_clip_error = Some(e);
            }
        }
    }

    ctx.enter_stage(&record, Stage::Publish).await;

    if summary.clips_published == 0 {
        // Candidates existed and every one failed; that is a job failure,
        // not a quiet empty completion.
        let last = last_clip_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "all clips failed".to_string());
        return Err(PipelineError::Toolchain(format!(
            "all {total} clips failed; last error: {last}"
        )));
    }

    let warnings = summary.clips_failed > 0;
    record = record.complete(warnings);
    if warnings {
        record.message = Some(format!(
            "{} of {total} clips failed",
            summary.clips_failed
        ));
    }
    ctx.jobs.update_job(&record).await?;
    let final_status = record.status;
    let summary_clone = summary.clone();
    ctx.snapshot(&record, move |s| {
        s.set_status(final_status);
        s.set_progress(100);
        s.summary = summary_clone;
    })
    .await;
    ctx.publish_update(job_id, ProgressUpdate::Done { status: final_status })
        .await;

    info!(
        %job_id,
        published = summary.clips_published,
        failed = summary.clips_failed,
        "Job finished"
    );
    counter!("pipeline_jobs_completed").increment(1);
    Ok(final_status)
}

/// Render one candidate and publish its artifacts, both under their own
/// retry budgets.
#[allow(clippy::too_many_arguments)]
async fn render_and_publish(
    ctx: &PipelineContext,
    record: &JobRecord,
    source: &crate::seams::ResolvedSource,
    spec: &RenderSpec,
    transcript: &clipforge_models::Transcript,
    candidate: &clipforge_models::Candidate,
    workdir: &std::path::Path,
    cancel: watch::Receiver<bool>,
) -> PipelineResult<clipforge_storage::PublishedClip> {
    let output_dir = workdir.join("clips");

    let rendered = ctx
        .render_retry
        .run(|| {
            ctx.renderer.render(RenderInput {
                job_id: &record.id,
                source,
                window: candidate.window,
                spec,
                transcript,
                output_dir: &output_dir,
                cancel: cancel.clone(),
            })
        })
        .await?;

    ctx.publish_retry
        .run(|| ctx.publisher.publish(&record.owner_id, &record.id, &rendered))
        .await
}

fn record_from_envelope(envelope: &JobEnvelope) -> JobRecord {
    let mut record = JobRecord::new(
        envelope.owner_id.clone(),
        envelope.source.clone(),
        envelope.params.clone(),
    );
    record.id = envelope.job_id.clone();
    record
}

async fn finalize_no_content(
    ctx: &PipelineContext,
    record: JobRecord,
    note: &str,
) -> PipelineResult<JobStatus> {
    let mut record = record.complete(false);
    record.reason_code = Some(ReasonCode::WarningNoContent);
    record.message = Some(note.to_string());
    ctx.jobs.update_job(&record).await?;
    let note = note.to_string();
    ctx.snapshot(&record, move |s| {
        s.set_status(JobStatus::Completed);
        s.set_progress(100);
        s.reason_code = Some(ReasonCode::WarningNoContent);
        s.message = Some(note);
    })
    .await;
    ctx.publish_update(
        &record.id,
        ProgressUpdate::Done {
            status: JobStatus::Completed,
        },
    )
    .await;
    Ok(JobStatus::Completed)
}

async fn finalize_canceled(ctx: &PipelineContext, record: JobRecord) -> PipelineResult<JobStatus> {
    info!(job_id = %record.id, "Cancellation honored between stages");
    let record = record.cancel();
    ctx.jobs.update_job(&record).await?;
    ctx.snapshot(&record, |s| {
        s.set_status(JobStatus::Canceled);
        s.reason_code = Some(ReasonCode::Canceled);
    })
    .await;
    ctx.publish_update(
        &record.id,
        ProgressUpdate::Done {
            status: JobStatus::Canceled,
        },
    )
    .await;
    counter!("pipeline_jobs_canceled").increment(1);
    Ok(JobStatus::Canceled)
}

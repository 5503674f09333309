//! Job executor: queue consumption, leasing, retries, shutdown.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use clipforge_models::ReasonCode;
use clipforge_queue::{Delivery, JobLease, JobQueue, LeaseKeeper};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{run_job, PipelineContext};

/// Pulls deliveries from the queue and runs them through the pipeline,
/// at most `max_concurrent_jobs` at a time.
pub struct JobExecutor {
    ctx: Arc<PipelineContext>,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new executor.
    pub fn new(ctx: Arc<PipelineContext>, queue: Arc<JobQueue>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            ctx,
            queue,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Signal shutdown.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Run until shutdown, then drain in-flight jobs.
    pub async fn run(&self) -> PipelineResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_jobs = self.ctx.config.max_concurrent_jobs,
            "Starting job executor"
        );

        self.queue.init().await.map_err(PipelineError::from)?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically claim entries whose worker stopped heartbeating.
        let claim_task = self.spawn_claim_task();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_once() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error consuming jobs, backing off");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to finish");
        let _ = tokio::time::timeout(self.ctx.config.shutdown_timeout, self.drain()).await;
        info!("Job executor stopped");
        Ok(())
    }

    async fn consume_once(&self) -> PipelineResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await
            .map_err(PipelineError::from)?;

        for delivery in deliveries {
            self.spawn_delivery(delivery).await?;
        }
        Ok(())
    }

    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.ctx.config.claim_interval;
        let min_idle = self.ctx.config.claim_min_idle;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut shutdown_rx = shutdown.subscribe();
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() { break; }
                    }
                    _ = ticker.tick() => {
                        match queue.claim_stale(&consumer_name, min_idle, 5).await {
                            Ok(deliveries) if !deliveries.is_empty() => {
                                info!(count = deliveries.len(), "Claimed stale deliveries");
                                for delivery in deliveries {
                                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                        return;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    let queue = Arc::clone(&queue);
                                    let consumer = consumer_name.clone();
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_delivery(ctx, queue, consumer, delivery).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Failed to claim stale deliveries"),
                        }
                    }
                }
            }
        })
    }

    async fn spawn_delivery(&self, delivery: Delivery) -> PipelineResult<()> {
        let permit = self
            .job_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::unknown("job semaphore closed"))?;

        let ctx = Arc::clone(&self.ctx);
        let queue = Arc::clone(&self.queue);
        let consumer = self.consumer_name.clone();
        tokio::spawn(async move {
            let _permit = permit;
            Self::execute_delivery(ctx, queue, consumer, delivery).await;
        });
        Ok(())
    }

    /// Execute one delivery end-to-end: lease, heartbeat, pipeline,
    /// ack/retry/DLQ bookkeeping.
    async fn execute_delivery(
        ctx: Arc<PipelineContext>,
        queue: Arc<JobQueue>,
        consumer_name: String,
        delivery: Delivery,
    ) {
        let job_id = delivery.envelope.job_id.clone();
        info!(%job_id, "Executing delivery");

        // Exactly one worker per job: the lease is the gate. Losing the
        // race means another worker is live on it; leave the entry alone.
        let lease = match JobLease::acquire(&queue, &job_id, &consumer_name).await {
            Ok(lease) => Arc::new(lease),
            Err(clipforge_queue::QueueError::LeaseHeld(_)) => {
                debug!(%job_id, "Lease held elsewhere, skipping delivery");
                return;
            }
            Err(e) => {
                warn!(%job_id, error = %e, "Lease acquisition failed");
                return;
            }
        };

        let keeper = LeaseKeeper::spawn(Arc::clone(&lease));
        let mut lease_lost = keeper.lost();

        // Status-cache heartbeat while processing.
        let heartbeat_task = {
            let ctx = Arc::clone(&ctx);
            let job_id = job_id.clone();
            let interval = ctx.config.heartbeat_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    if let Some(status) = &ctx.status {
                        status.heartbeat(&job_id).await.ok();
                    }
                }
            })
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let job_future = async {
            tokio::select! {
                result = tokio::time::timeout(
                    ctx.config.job_timeout,
                    run_job(&ctx, &delivery.envelope, cancel_rx.clone()),
                ) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(PipelineError::unknown(format!(
                        "job exceeded its {}s wall-clock budget",
                        ctx.config.job_timeout.as_secs()
                    ))),
                },
                _ = lease_lost.changed() => Err(PipelineError::LeaseLost),
            }
        };
        let result = job_future.await;
        let _ = cancel_tx.send(true);

        heartbeat_task.abort();
        keeper.stop();

        match result {
            Ok(status) => {
                info!(%job_id, %status, "Delivery finished");
                queue.ack(delivery.class, &delivery.message_id).await.ok();
                queue.clear_dedup(&delivery.envelope).await.ok();
                lease.release().await.ok();
            }
            Err(PipelineError::LeaseLost) => {
                // Another worker owns the job now; no state transitions,
                // no ack. The entry will be claimed by the live holder.
                warn!(%job_id, "Lease lost mid-job, abandoning");
                counter!("executor_leases_lost").increment(1);
            }
            Err(e) => {
                Self::handle_failure(&ctx, &queue, &delivery, e).await;
                lease.release().await.ok();
            }
        }
    }

    /// Classify a job-level failure: requeue inside the budget, otherwise
    /// terminal failure (plus DLQ for the unexplained ones).
    async fn handle_failure(
        ctx: &PipelineContext,
        queue: &JobQueue,
        delivery: &Delivery,
        error: PipelineError,
    ) {
        let job_id = &delivery.envelope.job_id;
        error!(%job_id, error = %error, "Job failed");

        let retry_count = queue.increment_retry(job_id).await.unwrap_or(u32::MAX);
        let within_budget = retry_count <= queue.max_retries();

        if error.is_job_retryable() && within_budget {
            info!(
                %job_id,
                retry_count,
                max_retries = queue.max_retries(),
                "Requeueing job for retry"
            );
            // processing -> queued, retry counter mirrored on the record
            if let Ok(Some(record)) = ctx.jobs.get_job(job_id).await {
                if record.status == clipforge_models::JobStatus::Processing {
                    let mut requeued = record.requeue(error.to_string());
                    requeued.retry_count = retry_count;
                    ctx.jobs.update_job(&requeued).await.ok();
                    ctx_snapshot_requeue(ctx, &requeued).await;
                }
            }
            queue.ack(delivery.class, &delivery.message_id).await.ok();
            queue.requeue(&delivery.envelope).await.ok();
            counter!("executor_jobs_requeued").increment(1);
            return;
        }

        // Terminal: mark the record failed with the structured reason.
        let reason = if error.is_job_retryable() {
            // Budget exhausted on a retryable class
            ReasonCode::WorkerCrash
        } else {
            error.reason_code()
        };
        if let Ok(Some(record)) = ctx.jobs.get_job(job_id).await {
            if !record.status.is_terminal() {
                let failed = record.fail(reason, error.to_string());
                ctx.jobs.update_job(&failed).await.ok();
                if let Some(status) = &ctx.status {
                    let message = error.to_string();
                    status
                        .update(
                            job_id,
                            {
                                let job_id = job_id.clone();
                                let owner = failed.owner_id.clone();
                                move || clipforge_models::JobStatusSnapshot::new(job_id, owner)
                            },
                            move |s| {
                                s.set_status(clipforge_models::JobStatus::Failed);
                                s.reason_code = Some(reason);
                                s.message = Some(message);
                            },
                        )
                        .await
                        .ok();
                }
            }
        }
        if let Some(progress) = &ctx.progress {
            progress
                .error(job_id, reason, error.to_string())
                .await
                .ok();
        }

        if matches!(error, PipelineError::Unknown(_)) {
            queue.dead_letter(delivery, &error.to_string()).await.ok();
        } else {
            queue.ack(delivery.class, &delivery.message_id).await.ok();
        }
        queue.clear_dedup(&delivery.envelope).await.ok();
        counter!("executor_jobs_failed").increment(1);
    }

    async fn drain(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.ctx.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn ctx_snapshot_requeue(ctx: &PipelineContext, record: &clipforge_models::JobRecord) {
    if let Some(status) = &ctx.status {
        let job_id = record.id.clone();
        let owner = record.owner_id.clone();
        let message = record.message.clone();
        status
            .update(
                &record.id,
                move || clipforge_models::JobStatusSnapshot::new(job_id, owner),
                move |s| {
                    s.set_status(clipforge_models::JobStatus::Queued);
                    s.message = message;
                },
            )
            .await
            .ok();
    }
}

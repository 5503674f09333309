//! Live event router.
//!
//! Receives fire-and-forget signal events, maintains the per-stream
//! rolling windows, and enqueues a clip job when the detector reports a
//! hype moment. Runs as its own consumer loop, decoupled from the
//! ingestion gateway by a bounded channel.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use clipforge_models::{JobParams, JobRecord, QueueClass, SignalEvent, SourceDescriptor, StreamId};
use clipforge_queue::{JobEnvelope, JobQueue, LiveTrigger};
use clipforge_records::JobStore;

use crate::buffer::StreamWindow;
use crate::config::LiveConfig;
use crate::detector::{HypeDetector, HypeMoment};

/// Cheap cloneable handle for publishing events into the router.
#[derive(Clone)]
pub struct LiveRouterHandle {
    tx: mpsc::Sender<SignalEvent>,
}

impl LiveRouterHandle {
    /// Fire-and-forget publish. A full channel drops the event (bounded
    /// buffering, never backpressure onto the caller).
    pub fn publish(&self, event: SignalEvent) {
        if self.tx.try_send(event).is_err() {
            counter!("live_events_rejected").increment(1);
            warn!("Live event channel full, dropping event");
        }
    }
}

/// The router consumer loop.
pub struct LiveEventRouter {
    config: LiveConfig,
    detector: HypeDetector,
    windows: HashMap<StreamId, StreamWindow>,
    rx: mpsc::Receiver<SignalEvent>,
    queue: Arc<JobQueue>,
    jobs: Arc<dyn JobStore>,
    /// Owner attributed to auto-generated live jobs, per stream
    stream_owners: HashMap<StreamId, String>,
    default_owner: String,
}

impl LiveEventRouter {
    /// Build the router and its publish handle.
    pub fn new(
        config: LiveConfig,
        queue: Arc<JobQueue>,
        jobs: Arc<dyn JobStore>,
        default_owner: impl Into<String>,
    ) -> (Self, LiveRouterHandle) {
        let (tx, rx) = mpsc::channel(config.channel_cap);
        let detector = HypeDetector::new(config.clone());
        (
            Self {
                config,
                detector,
                windows: HashMap::new(),
                rx,
                queue,
                jobs,
                stream_owners: HashMap::new(),
                default_owner: default_owner.into(),
            },
            LiveRouterHandle { tx },
        )
    }

    /// Attribute a stream's auto-generated jobs to an owner.
    pub fn register_stream(&mut self, stream_id: StreamId, owner_id: impl Into<String>) {
        self.stream_owners.insert(stream_id, owner_id.into());
    }

    /// Run until the publish side closes.
    pub async fn run(mut self) {
        info!(
            threshold = self.config.threshold,
            cooldown = self.config.cooldown_secs,
            "Live event router started"
        );

        while let Some(event) = self.rx.recv().await {
            let stream_id = event.stream_id.clone();
            let window = self
                .windows
                .entry(stream_id.clone())
                .or_insert_with(|| StreamWindow::new(self.config.window_secs, self.config.buffer_cap));
            window.push(event);
            counter!("live_events_received").increment(1);

            if let Some(moment) = self.detector.evaluate(&stream_id, window) {
                self.enqueue_moment(moment).await;
            }
        }

        info!("Live event router stopped");
    }

    /// Create and enqueue the live job for a detected moment.
    async fn enqueue_moment(&self, moment: HypeMoment) {
        let owner = self
            .stream_owners
            .get(&moment.stream_id)
            .unwrap_or(&self.default_owner)
            .clone();

        info!(
            stream_id = %moment.stream_id,
            anchor = moment.anchor_secs,
            score = moment.combined_score,
            "Hype moment detected, enqueueing live job"
        );

        let params = JobParams {
            clip_count: 1,
            queue_class: QueueClass::Interactive,
            ..JobParams::default()
        };
        let record = JobRecord::new(
            owner,
            SourceDescriptor::Live {
                stream_id: moment.stream_id.clone(),
                anchor_secs: moment.anchor_secs,
            },
            params,
        );

        if let Err(e) = self.jobs.create_job(&record).await {
            error!(error = %e, "Failed to persist live job record");
            return;
        }

        let envelope = JobEnvelope::from_record(&record).with_live_trigger(LiveTrigger {
            combined_score: moment.combined_score,
            labels: moment.labels,
        });

        match self.queue.enqueue(&envelope).await {
            Ok(_) => counter!("live_jobs_enqueued").increment(1),
            Err(clipforge_queue::QueueError::Duplicate(key)) => {
                // Interactive path (or an earlier trigger) already covers
                // this window; the dedup key is the cross-path guard.
                info!(key, "Live job deduplicated at enqueue");
            }
            Err(e) => error!(error = %e, "Failed to enqueue live job"),
        }
    }
}

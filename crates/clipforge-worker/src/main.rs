//! Clip pipeline worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipforge_queue::{JobQueue, ProgressChannel, StatusCache};
use clipforge_records::MemoryStore;
use clipforge_storage::ObjectStoreClient;
use clipforge_worker::{
    seams::{
        FfmpegClipRenderer, HttpTranscriber, LlmMomentSelector, MediaSourceResolver,
        ObjectStorePublisher,
    },
    JobExecutor, PipelineContext, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting clipforge-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let queue = match JobQueue::from_env() {
        Ok(queue) => Arc::new(queue),
        Err(e) => {
            error!("Failed to create job queue: {e}");
            std::process::exit(1);
        }
    };

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let key_prefix = queue.config().key_prefix.clone();
    let progress = ProgressChannel::new(&redis_url, key_prefix.clone())
        .expect("progress channel");
    let status = StatusCache::new(&redis_url, key_prefix).expect("status cache");

    let storage = match ObjectStoreClient::from_env().await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create storage client: {e}");
            std::process::exit(1);
        }
    };

    let transcriber = match HttpTranscriber::from_env() {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to create transcriber: {e}");
            std::process::exit(1);
        }
    };
    let selector = match LlmMomentSelector::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create moment selector: {e}");
            std::process::exit(1);
        }
    };

    // Standalone record store; a CRUD-layer-backed implementation plugs in
    // through the same traits.
    let store = MemoryStore::new();

    let (ingest_retry, transcribe_retry, select_retry, render_retry, publish_retry) =
        PipelineContext::default_retries();
    let ctx = Arc::new(PipelineContext {
        config: config.clone(),
        queue: Some(Arc::clone(&queue)),
        progress: Some(Arc::new(progress)),
        status: Some(Arc::new(status)),
        jobs: Arc::new(store.clone()),
        clips: Arc::new(store),
        resolver: Arc::new(MediaSourceResolver::new(config.clone())),
        transcriber: Arc::new(transcriber),
        selector: Arc::new(selector),
        renderer: Arc::new(FfmpegClipRenderer::new(config)),
        publisher: Arc::new(ObjectStorePublisher::new(storage)),
        ingest_retry,
        transcribe_retry,
        select_retry,
        render_retry,
        publish_retry,
    });

    let executor = JobExecutor::new(ctx, queue);
    let shutdown = executor.shutdown_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown.send(true);
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {e}");
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("clipforge=info".parse().expect("static directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

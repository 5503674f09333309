//! Ingestion gateway binary.
//!
//! Hosts the HTTP surface and the live event router consumer loop; the
//! worker binary hosts the pipeline.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipforge_api::{create_router, ApiConfig, AppState};
use clipforge_live::{LiveConfig, LiveEventRouter};
use clipforge_queue::{JobQueue, ProgressChannel, StatusCache};
use clipforge_records::MemoryStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting clipforge-api");

    let config = ApiConfig::from_env();

    let queue = match JobQueue::from_env() {
        Ok(queue) => Arc::new(queue),
        Err(e) => {
            error!("Failed to create job queue: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.init().await {
        error!("Failed to initialize queue: {e}");
        std::process::exit(1);
    }

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let key_prefix = queue.config().key_prefix.clone();
    let progress =
        Arc::new(ProgressChannel::new(&redis_url, key_prefix.clone()).expect("progress channel"));
    let status = Arc::new(StatusCache::new(&redis_url, key_prefix).expect("status cache"));

    let store = MemoryStore::new();
    let jobs: Arc<dyn clipforge_records::JobStore> = Arc::new(store.clone());
    let clips: Arc<dyn clipforge_records::ClipStore> = Arc::new(store);

    // The live router consumes signal events in its own loop; the HTTP
    // handler only pushes onto its bounded channel.
    let (router_loop, live_handle) = LiveEventRouter::new(
        LiveConfig::from_env(),
        Arc::clone(&queue),
        Arc::clone(&jobs),
        config.live_default_owner.clone(),
    );
    tokio::spawn(router_loop.run());

    let state = AppState {
        config: config.clone(),
        queue,
        progress,
        status,
        jobs,
        clips,
        live: live_handle,
    };

    let app = create_router(state);
    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {e}", config.bind_addr);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await
    {
        error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("API shutdown complete");
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("clipforge=info".parse().expect("static directive"))
        .add_directive("tower_http=info".parse().expect("static directive"));

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

//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs processed in parallel by this worker
    pub max_concurrent_jobs: usize,
    /// Overall wall-clock budget per job
    pub job_timeout: Duration,
    /// Per-ffmpeg-call timeout
    pub render_timeout: Duration,
    /// Source download timeout
    pub download_timeout: Duration,
    /// Graceful shutdown budget for in-flight jobs
    pub shutdown_timeout: Duration,
    /// Work directory for per-job temp files
    pub work_dir: String,
    /// Directory live-stream archives are mounted under
    pub live_archive_dir: String,
    /// How often to scan for stale pending entries (crash recovery)
    pub claim_interval: Duration,
    /// Minimum idle time before a pending entry is claimable
    pub claim_min_idle: Duration,
    /// Status-cache heartbeat interval while processing
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(3600),
            render_timeout: Duration::from_secs(600),
            download_timeout: Duration::from_secs(900),
            shutdown_timeout: Duration::from_secs(60),
            work_dir: "/tmp/clipforge".to_string(),
            live_archive_dir: "/var/lib/clipforge/archives".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS", defaults.max_concurrent_jobs),
            job_timeout: Duration::from_secs(env_parse("WORKER_JOB_TIMEOUT_SECS", 3600)),
            render_timeout: Duration::from_secs(env_parse("WORKER_RENDER_TIMEOUT_SECS", 600)),
            download_timeout: Duration::from_secs(env_parse("WORKER_DOWNLOAD_TIMEOUT_SECS", 900)),
            shutdown_timeout: Duration::from_secs(env_parse("WORKER_SHUTDOWN_TIMEOUT_SECS", 60)),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            live_archive_dir: std::env::var("LIVE_ARCHIVE_DIR").unwrap_or(defaults.live_archive_dir),
            claim_interval: Duration::from_secs(env_parse("WORKER_CLAIM_INTERVAL_SECS", 30)),
            claim_min_idle: Duration::from_secs(env_parse("WORKER_CLAIM_MIN_IDLE_SECS", 300)),
            heartbeat_interval: Duration::from_secs(env_parse("WORKER_HEARTBEAT_SECS", 30)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

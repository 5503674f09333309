//! Application state.

use std::sync::Arc;

use clipforge_live::LiveRouterHandle;
use clipforge_queue::{JobQueue, ProgressChannel, StatusCache};
use clipforge_records::{ClipStore, JobStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<JobQueue>,
    pub progress: Arc<ProgressChannel>,
    pub status: Arc<StatusCache>,
    pub jobs: Arc<dyn JobStore>,
    pub clips: Arc<dyn ClipStore>,
    pub live: LiveRouterHandle,
}

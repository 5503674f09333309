//! Redis Streams job queue.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams, one stream per priority class
//! - Worker consumption with exclusive leases, retry counters, and a DLQ
//! - Cancellation flags checked between pipeline stages
//! - Progress events via Redis Pub/Sub plus a TTL'd status cache for pollers

pub mod envelope;
pub mod error;
pub mod lease;
pub mod progress;
pub mod queue;
pub mod status_cache;

pub use envelope::{JobEnvelope, LiveTrigger};
pub use error::{QueueError, QueueResult};
pub use lease::{JobLease, LeaseKeeper};
pub use progress::{ProgressChannel, ProgressEvent};
pub use queue::{Delivery, JobQueue, QueueConfig};
pub use status_cache::StatusCache;

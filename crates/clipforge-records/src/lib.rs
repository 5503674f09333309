//! Persistence seam for job and clip records.
//!
//! The CRUD layer owns durable storage; the pipeline consumes it through
//! the `JobStore`/`ClipStore` traits defined here. `MemoryStore` implements
//! both for standalone deployments and tests. Store writes enforce the job
//! state machine and clip immutability, whatever the backing store.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{RecordsError, RecordsResult};
pub use memory::MemoryStore;
pub use store::{ClipStore, JobStore};

//! Artifact publisher.
//!
//! Durably uploads rendered artifacts and subtitle tracks to S3-compatible
//! object storage (Cloudflare R2 in production) and returns opaque key
//! locators. The CRUD layer turns locators into download URLs; the
//! pipeline never does.

pub mod client;
pub mod error;
pub mod publish;

pub use client::{ObjectStoreClient, ObjectStoreConfig};
pub use error::{StorageError, StorageResult};
pub use publish::{ClipUpload, PublishedClip};

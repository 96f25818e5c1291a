//! Storage backend capability (C2, spec §6) — pure blob I/O.
//!
//! Deliberately the *only* thing this trait does is move bytes under keys.
//! Counts, caching, coalescing and sharding live one layer up in
//! [`crate::storage::engine::StorageEngine`] (spec §9's "mixed responsibility
//! storage adapters" redesign note: `BackendStorage` stays pure I/O).

pub mod local_fs;
pub mod memory;
pub mod object_store_backend;

pub use local_fs::LocalFsBackend;
pub use memory::MemoryBackend;
pub use object_store_backend::ObjectStoreBackend;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Backend-level error — distinguishable throttling per spec §6's
/// "MUST surface rate-limiting errors distinguishably" requirement.
#[derive(Debug, Error, Clone)]
pub enum BackendError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("throttled: {0}")]
    Throttled(String),
    #[error("transient backend error: {0}")]
    Transient(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Classifies a raw error message the way spec §4.1 requires (429, 503,
    /// "rate limit", "quota" substrings route to C5 as throttling).
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match crate::error::BrainyError::classify_backend_message(&msg) {
            crate::error::ErrorKind::Throttled => BackendError::Throttled(msg),
            _ => BackendError::Transient(msg),
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// One page of a `list` call: the returned keys plus an opaque continuation
/// token. `None` means the listing is exhausted.
#[derive(Debug, Clone)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Idempotent setup (bucket creation, connection warm-up). Called once by
    /// the storage engine before any other operation.
    async fn init(&self) -> BackendResult<()>;

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BackendResult<()>;

    async fn get(&self, key: &str) -> BackendResult<Bytes>;

    async fn delete(&self, key: &str) -> BackendResult<()>;

    async fn list(
        &self,
        prefix: &str,
        page_token: Option<&str>,
        max_keys: usize,
    ) -> BackendResult<ListPage>;

    async fn exists_bucket(&self) -> BackendResult<bool>;
}

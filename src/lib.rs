//! `brainy` — an embedded vector-and-graph database. Nouns carry an
//! embedding and attributes; verbs relate nouns to each other; `find`/
//! `similar` run hybrid vector-plus-graph queries over both.
//!
//! ```no_run
//! # async fn run() -> brainy::Result<()> {
//! use brainy::{Brainy, BrainyConfig, AddRequest};
//! use brainy::types::NounType;
//!
//! let db = Brainy::init(BrainyConfig::default()).await?;
//! let id = db.add(AddRequest {
//!     id: None,
//!     data: None,
//!     vector: Some(vec![0.0; 768]),
//!     noun_type: NounType::Document,
//!     metadata: None,
//!     label: None,
//! }).await?;
//! db.get(id).await?;
//! db.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod augmentation;
pub mod backend;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod db;
pub mod distance;
pub mod embedder;
pub mod error;
pub mod index;
pub mod planner;
pub mod search_cache;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use config::{BrainyConfig, ScaleTier, StorageKind};
pub use db::{
    AddRequest, BackupBundle, Brainy, BrainyBuilder, FindFilter, FindHit, FindRequest, FindResult, RelateRequest,
    SimilarRequest, UpdateRequest,
};
pub use distance::DistanceMetric;
pub use embedder::{Embedder, NullEmbedder};
pub use error::{BrainyError, ErrorKind, Result};

//! Storage engine (C6) and its supporting keyspace/statistics/canonical-JSON
//! helpers (spec §4.1).

pub mod canonical;
pub mod engine;
pub mod keyspace;
pub mod statistics;

pub use engine::{CacheInvalidation, EntityKind, NounFilter, Page, StorageEngine, VerbFilter};
pub use keyspace::ListCursor;

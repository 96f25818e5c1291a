//! Caching layer: admission control (C5), tiered LRU (C3), write coalescing
//! (C4 write side) and request coalescing (C4 read side). These four pieces
//! are independent and composed by the storage engine, not by each other.

pub mod backpressure;
pub mod coalescer;
pub mod tiered;
pub mod write_buffer;

pub use backpressure::{AdmissionControl, AdmissionPermit, MemoryPressureSource, Outcome};
pub use coalescer::{CoalescedError, RequestCoalescer};
pub use tiered::{prefetch_candidates, TieredCache, TieredCacheStats};
pub use write_buffer::{WriteBuffer, DEFAULT_MAX_DELAY, DEFAULT_SIZE_THRESHOLD};

//! Bounded offline cache of remote videos.
//!
//! This module provides:
//! - `CachedRecord`, the reduced projection stored locally
//! - the `CacheStore` seam and its SQLite implementation
//! - oldest-first eviction that keeps the cache inside a byte budget

pub mod eviction;
mod record;
mod storage;
mod traits;

pub use eviction::{enforce_record_limit, evict_to_target};
#[cfg(test)]
pub(crate) use record::fixtures;
pub use record::{CachedRecord, LinkedEntity, RecordPatch, RemoteVideo};
pub use storage::SqliteCacheStore;
pub use traits::CacheStore;

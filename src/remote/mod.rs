//! Remote video service as seen by the sync subsystem.
//!
//! The service itself lives elsewhere; this module only consumes it. Every
//! failure crosses this boundary as a [`RemoteError`] with an explicit kind so
//! the orchestrator never has to inspect raw responses.

mod client;
mod error;
pub mod wire;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cache::{CachedRecord, RecordPatch};
use crate::queue::PendingMutation;

pub use client::HttpRemote;
pub use error::{RemoteError, RemoteErrorKind};

/// A bounded snapshot of the newest remote records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
  /// Newest records, already projected for the cache
  pub records: Vec<CachedRecord>,
  /// Server time the snapshot was taken
  pub timestamp: Option<DateTime<Utc>>,
  /// How many records exist remotely in total
  pub total_available: usize,
}

#[async_trait]
pub trait RemoteService: Send + Sync {
  /// Apply a partial update of editable fields to `mutation.target_id`.
  ///
  /// The queued mutation travels with the call so the remote sees the same
  /// mutation id and retry count on every attempt.
  async fn update(&self, mutation: &PendingMutation, patch: &RecordPatch) -> Result<(), RemoteError>;

  /// Delete `mutation.target_id` remotely.
  async fn delete(&self, mutation: &PendingMutation) -> Result<(), RemoteError>;

  /// Fetch the newest `limit` records.
  async fn fetch_cache(&self, limit: usize) -> Result<CacheSnapshot, RemoteError>;
}

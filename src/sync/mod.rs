//! Sync orchestration between the offline cache and the remote service.
//!
//! A full sync runs four phases in order:
//!
//! 1. push queued mutations, oldest first, classifying each outcome
//! 2. pull the newest records and replace the cache wholesale
//! 3. evict oldest records down to the byte target
//! 4. record sync metadata
//!
//! Only one sync runs at a time. A trigger that arrives while a sync is in
//! flight is a no-op. If the pull fails, the previous snapshot stays in place.

mod local;
mod metadata;
mod outcome;

use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{enforce_record_limit, evict_to_target, CacheStore};
use crate::config::{CacheLimits, CACHE_PAYLOAD_VERSION};
use crate::queue::{MutationKind, MutationQueue, PendingMutation};
use crate::remote::{RemoteError, RemoteService};

pub use local::{reapply_pending, LocalWriter};
pub use metadata::{MetadataStore, SqliteMetadataStore, SyncMetadata};
pub use outcome::{classify, Disposition};

#[derive(Error, Debug)]
pub enum SyncError {
  #[error("cache pull timed out after {0:?}")]
  Timeout(Duration),

  #[error("cache pull failed: {0}")]
  Pull(#[source] RemoteError),

  #[error("mutation {mutation_id} dropped after {attempts} attempts: {last_error}")]
  RetryBudgetExceeded {
    mutation_id: String,
    attempts: u32,
    last_error: String,
  },
}

/// Whether a sync is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Idle,
  Syncing,
}

/// A mutation push that did not succeed during a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationFailure {
  pub mutation_id: String,
  pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
  /// Records written to the cache by the pull
  pub videos_updated: usize,
  /// Mutations the remote accepted
  pub mutations_synced: usize,
  pub errors: Vec<MutationFailure>,
  pub last_sync_time: DateTime<Utc>,
}

/// Resets the orchestrator to Idle on every exit path.
struct SyncGuard<'a> {
  flag: &'a AtomicBool,
}

impl Drop for SyncGuard<'_> {
  fn drop(&mut self) {
    self.flag.store(false, Ordering::Release);
  }
}

pub struct SyncOrchestrator {
  cache: Arc<dyn CacheStore>,
  queue: Arc<dyn MutationQueue>,
  metadata: Arc<dyn MetadataStore>,
  remote: Arc<dyn RemoteService>,
  limits: CacheLimits,
  syncing: AtomicBool,
}

impl SyncOrchestrator {
  pub fn new(
    cache: Arc<dyn CacheStore>,
    queue: Arc<dyn MutationQueue>,
    metadata: Arc<dyn MetadataStore>,
    remote: Arc<dyn RemoteService>,
    limits: CacheLimits,
  ) -> Self {
    Self {
      cache,
      queue,
      metadata,
      remote,
      limits,
      syncing: AtomicBool::new(false),
    }
  }

  pub fn state(&self) -> SyncState {
    if self.syncing.load(Ordering::Acquire) {
      SyncState::Syncing
    } else {
      SyncState::Idle
    }
  }

  pub fn is_syncing(&self) -> bool {
    self.state() == SyncState::Syncing
  }

  fn try_begin(&self) -> Option<SyncGuard<'_>> {
    self
      .syncing
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| SyncGuard {
        flag: &self.syncing,
      })
  }

  /// Push, pull, evict and record metadata.
  ///
  /// Returns `Ok(None)` without doing anything if a sync is already running.
  /// Per-mutation failures end up in the summary; a failed pull is returned
  /// as a [`SyncError`] and leaves the cache untouched.
  pub async fn full_sync(&self) -> Result<Option<SyncSummary>> {
    let Some(_guard) = self.try_begin() else {
      info!("Sync already in progress, ignoring trigger");
      return Ok(None);
    };

    info!("Starting full sync");
    let mut summary = SyncSummary {
      videos_updated: 0,
      mutations_synced: 0,
      errors: Vec::new(),
      last_sync_time: Utc::now(),
    };

    self.push_mutations(&mut summary).await?;
    summary.videos_updated = self.pull_and_replace().await?;
    summary.last_sync_time = self.record_metadata()?;

    info!(
      videos_updated = summary.videos_updated,
      mutations_synced = summary.mutations_synced,
      errors = summary.errors.len(),
      "Full sync complete"
    );
    Ok(Some(summary))
  }

  /// Pull-only resync when the stored cache payload version is stale.
  ///
  /// Returns whether a resync happened. Skips the push phase, so queued
  /// mutations stay queued.
  pub async fn ensure_cache_version(&self) -> Result<bool> {
    let stored = self.metadata.load()?.cache_payload_version;
    if stored == Some(CACHE_PAYLOAD_VERSION) {
      return Ok(false);
    }

    let Some(_guard) = self.try_begin() else {
      info!("Sync already in progress, skipping version resync");
      return Ok(false);
    };

    info!(
      stored = ?stored,
      expected = CACHE_PAYLOAD_VERSION,
      "Cache payload version changed, resyncing cache"
    );
    self.pull_and_replace().await?;
    self.record_metadata()?;
    Ok(true)
  }

  async fn push_mutations(&self, summary: &mut SyncSummary) -> Result<()> {
    let pending = self.queue.get_all_ordered_by_timestamp()?;
    if pending.is_empty() {
      return Ok(());
    }

    debug!(count = pending.len(), "Pushing pending mutations");
    for mutation in pending {
      let result = match (mutation.kind, &mutation.payload) {
        (MutationKind::Update, Some(patch)) => self.remote.update(&mutation, patch).await,
        (MutationKind::Update, None) => Err(RemoteError::validation("update has no payload")),
        (MutationKind::Delete, _) => self.remote.delete(&mutation).await,
      };
      self.settle(mutation, result, summary)?;
    }

    Ok(())
  }

  /// Apply the outcome of one push to the queue.
  fn settle(
    &self,
    mut mutation: PendingMutation,
    result: Result<(), RemoteError>,
    summary: &mut SyncSummary,
  ) -> Result<()> {
    let err = match result {
      Ok(()) => {
        self.queue.remove(&mutation.id)?;
        summary.mutations_synced += 1;
        debug!(mutation_id = %mutation.id, target_id = %mutation.target_id, "Mutation synced");
        return Ok(());
      }
      Err(err) => err,
    };

    match classify(&err) {
      Disposition::Discard(reason) => {
        self.queue.remove(&mutation.id)?;
        warn!(
          mutation_id = %mutation.id,
          target_id = %mutation.target_id,
          reason = ?reason,
          error = %err,
          "Discarding mutation"
        );
        summary.errors.push(MutationFailure {
          mutation_id: mutation.id,
          error: err.to_string(),
        });
      }
      Disposition::Retry => {
        mutation.retry_count += 1;
        mutation.last_error = Some(err.to_string());

        if mutation.retry_count >= self.limits.max_retries {
          self.queue.remove(&mutation.id)?;
          let dropped = SyncError::RetryBudgetExceeded {
            mutation_id: mutation.id.clone(),
            attempts: mutation.retry_count,
            last_error: err.to_string(),
          };
          warn!(target_id = %mutation.target_id, "{}", dropped);
          summary.errors.push(MutationFailure {
            mutation_id: mutation.id,
            error: dropped.to_string(),
          });
        } else {
          self.queue.update(&mutation)?;
          debug!(
            mutation_id = %mutation.id,
            retry_count = mutation.retry_count,
            error = %err,
            "Mutation will be retried"
          );
          summary.errors.push(MutationFailure {
            mutation_id: mutation.id,
            error: err.to_string(),
          });
        }
      }
    }

    Ok(())
  }

  /// Fetch a fresh snapshot and swap it into the cache, then evict.
  ///
  /// Nothing in the cache changes until the snapshot has fully arrived.
  async fn pull_and_replace(&self) -> Result<usize> {
    let limit = self.limits.max_cached_records;
    let timeout = self.limits.pull_timeout();

    let snapshot = match tokio::time::timeout(timeout, self.remote.fetch_cache(limit)).await {
      Ok(Ok(snapshot)) => snapshot,
      Ok(Err(err)) => {
        warn!(error = %err, "Cache pull failed, keeping previous snapshot");
        return Err(SyncError::Pull(err).into());
      }
      Err(_) => {
        warn!(?timeout, "Cache pull timed out, keeping previous snapshot");
        return Err(SyncError::Timeout(timeout).into());
      }
    };

    let mut records = snapshot.records;
    records.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    if records.len() > limit {
      debug!(received = records.len(), limit, "Remote sent more records than requested");
      records.truncate(limit);
    }

    self.cache.replace_all(&records)?;
    let stored = self.cache.count()?;
    info!(
      stored,
      total_available = snapshot.total_available,
      "Replaced cache with fresh snapshot"
    );

    let pending = self.queue.get_all_ordered_by_timestamp()?;
    if !pending.is_empty() {
      let applied = reapply_pending(&*self.cache, &pending)?;
      debug!(applied, "Re-applied unsynced local changes");
    }

    enforce_record_limit(&*self.cache, limit)?;
    evict_to_target(&*self.cache, self.limits.effective_target_bytes())?;

    Ok(stored)
  }

  fn record_metadata(&self) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    let metadata = SyncMetadata {
      last_sync: Some(now),
      cache_payload_version: Some(CACHE_PAYLOAD_VERSION),
      total_cache_size: self.cache.estimate_size_bytes()?,
    };
    self.metadata.save(&metadata)?;
    Ok(now)
  }
}

//! Optimistic local writes.
//!
//! A write is applied to the cache right away and queued for the next sync.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheStore, CachedRecord, RecordPatch};
use crate::queue::{MutationQueue, NewMutation, PendingMutation};

#[derive(Clone)]
pub struct LocalWriter {
  cache: Arc<dyn CacheStore>,
  queue: Arc<dyn MutationQueue>,
}

impl LocalWriter {
  pub fn new(cache: Arc<dyn CacheStore>, queue: Arc<dyn MutationQueue>) -> Self {
    Self { cache, queue }
  }

  /// Edit the user fields of a record locally and queue the update.
  pub fn update(&self, id: &str, patch: RecordPatch) -> Result<PendingMutation> {
    if patch.is_empty() {
      return Err(eyre!("Nothing to update for {}", id));
    }

    match self.cache.get(id)? {
      Some(mut record) => {
        record.apply_patch(&patch);
        self.cache.put(&record)?;
      }
      None => warn!(id, "Updating a record that is not cached"),
    }

    let mutation = self.queue.enqueue(NewMutation::update(id, patch))?;
    debug!(id, mutation_id = %mutation.id, "Queued update");
    Ok(mutation)
  }

  /// Remove a record locally and queue the delete.
  pub fn delete(&self, id: &str) -> Result<PendingMutation> {
    self.cache.delete(id)?;

    let mutation = self.queue.enqueue(NewMutation::delete(id))?;
    debug!(id, mutation_id = %mutation.id, "Queued delete");
    Ok(mutation)
  }

  /// A cached record plus whether it carries unsynced local changes.
  ///
  /// A record with pending mutations is not authoritative: the queued change
  /// overrides what the remote last said.
  pub fn get(&self, id: &str) -> Result<Option<(CachedRecord, bool)>> {
    let Some(record) = self.cache.get(id)? else {
      return Ok(None);
    };
    let pending = !self.queue.get_for_target(id)?.is_empty();
    Ok(Some((record, pending)))
  }
}

/// Re-apply queued mutations on top of the cache, oldest first.
///
/// Used after a pull so that local changes still waiting for the remote stay
/// visible in the fresh snapshot.
pub fn reapply_pending(cache: &dyn CacheStore, pending: &[PendingMutation]) -> Result<usize> {
  let mut applied = 0;

  for mutation in pending {
    match &mutation.payload {
      Some(patch) => {
        if let Some(mut record) = cache.get(&mutation.target_id)? {
          record.apply_patch(patch);
          cache.put(&record)?;
          applied += 1;
        }
      }
      None => {
        cache.delete(&mutation.target_id)?;
        applied += 1;
      }
    }
  }

  Ok(applied)
}

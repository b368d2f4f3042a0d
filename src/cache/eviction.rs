//! Oldest-first eviction keeping the cache inside its storage budget.
//!
//! Records are always removed strictly by publish time, oldest first. A newer
//! record is never dropped while an older one remains, even when dropping it
//! would free more space.

use color_eyre::Result;
use tracing::{debug, info};

use super::traits::CacheStore;

/// What an eviction pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
  /// Ids removed, oldest first
  pub removed: Vec<String>,
  pub bytes_before: u64,
  pub bytes_after: u64,
}

/// Delete oldest-published records until the estimated size is at most
/// `target_bytes` or the store is empty.
pub fn evict_to_target(store: &dyn CacheStore, target_bytes: u64) -> Result<EvictionReport> {
  let bytes_before = store.estimate_size_bytes()?;
  let mut report = EvictionReport {
    removed: Vec::new(),
    bytes_before,
    bytes_after: bytes_before,
  };

  if bytes_before <= target_bytes {
    return Ok(report);
  }

  // Newest first, so the oldest record sits at the end
  let mut records = store.get_all_sorted_by_publish_desc()?;

  while report.bytes_after > target_bytes {
    let Some(oldest) = records.pop() else {
      break;
    };

    store.delete(&oldest.id)?;
    report.bytes_after = store.estimate_size_bytes()?;
    debug!(
      id = %oldest.id,
      published_at = %oldest.published_at,
      remaining_bytes = report.bytes_after,
      "Evicted cached record"
    );
    report.removed.push(oldest.id);
  }

  if !report.removed.is_empty() {
    info!(
      removed = report.removed.len(),
      bytes_before = report.bytes_before,
      bytes_after = report.bytes_after,
      target_bytes,
      "Cache eviction complete"
    );
  }

  Ok(report)
}

/// Delete oldest-published records until at most `max_records` remain.
pub fn enforce_record_limit(store: &dyn CacheStore, max_records: usize) -> Result<Vec<String>> {
  if store.count()? <= max_records {
    return Ok(Vec::new());
  }

  let records = store.get_all_sorted_by_publish_desc()?;
  let mut removed = Vec::new();

  // Skip the newest `max_records`, then delete the rest oldest first
  for record in records.into_iter().skip(max_records).rev() {
    store.delete(&record.id)?;
    removed.push(record.id);
  }

  info!(removed = removed.len(), max_records, "Trimmed cache to record limit");
  Ok(removed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::record::fixtures::record;
  use crate::cache::record::CachedRecord;
  use crate::cache::SqliteCacheStore;
  use crate::db::Database;

  fn store_with(records: &[CachedRecord]) -> SqliteCacheStore {
    let store = SqliteCacheStore::new(Database::open_in_memory().unwrap());
    store.put_many(records).unwrap();
    store
  }

  #[test]
  fn test_under_budget_is_noop() {
    let store = store_with(&[record("a", 2024, 1, 1)]);
    let size = store.estimate_size_bytes().unwrap();

    let report = evict_to_target(&store, size).unwrap();
    assert!(report.removed.is_empty());
    assert_eq!(store.count().unwrap(), 1);
  }

  #[test]
  fn test_removes_oldest_first_until_under_target() {
    let records = vec![
      record("d", 2024, 4, 1),
      record("a", 2024, 1, 1),
      record("c", 2024, 3, 1),
      record("b", 2024, 2, 1),
    ];
    let store = store_with(&records);
    let one = records[0].estimated_size();

    // Room for roughly two records
    let target = one * 2 + one / 2;
    let report = evict_to_target(&store, target).unwrap();

    assert_eq!(report.removed, vec!["a", "b"]);
    assert!(report.bytes_after <= target);
    assert_eq!(report.bytes_after, store.estimate_size_bytes().unwrap());
    assert!(store.get("c").unwrap().is_some());
    assert!(store.get("d").unwrap().is_some());
  }

  #[test]
  fn test_never_skips_older_record_for_a_larger_newer_one() {
    let mut big_new = record("big", 2024, 5, 1);
    big_new.description = "x".repeat(4000);
    let small_old = record("small", 2024, 1, 1);
    let store = store_with(&[big_new.clone(), small_old.clone()]);

    // Removing only the big record would be enough, but the small old one goes first
    let target = small_old.estimated_size() + 10;
    let report = evict_to_target(&store, target).unwrap();

    assert_eq!(report.removed, vec!["small", "big"]);
    assert_eq!(store.count().unwrap(), 0);
  }

  #[test]
  fn test_retained_records_are_never_older_than_removed() {
    let records: Vec<CachedRecord> = (1..=9).map(|d| record(&format!("r{}", d), 2024, 1, d)).collect();
    let store = store_with(&records);

    let target = store.estimate_size_bytes().unwrap() / 3;
    let report = evict_to_target(&store, target).unwrap();

    let retained = store.get_all_sorted_by_publish_desc().unwrap();
    let newest_removed = report
      .removed
      .iter()
      .filter_map(|id| records.iter().find(|r| &r.id == id))
      .map(|r| r.published_at)
      .max()
      .unwrap();
    assert!(retained.iter().all(|r| r.published_at > newest_removed));
    assert!(store.estimate_size_bytes().unwrap() <= target);
  }

  #[test]
  fn test_zero_target_empties_store() {
    let store = store_with(&[record("a", 2024, 1, 1), record("b", 2024, 1, 2)]);
    let report = evict_to_target(&store, 0).unwrap();
    assert_eq!(report.removed.len(), 2);
    assert_eq!(store.count().unwrap(), 0);
    assert_eq!(report.bytes_after, 0);
  }

  #[test]
  fn test_record_limit_keeps_newest() {
    let store = store_with(&[
      record("a", 2024, 1, 1),
      record("b", 2024, 1, 2),
      record("c", 2024, 1, 3),
    ]);

    let removed = enforce_record_limit(&store, 2).unwrap();
    assert_eq!(removed, vec!["a"]);
    assert_eq!(store.count().unwrap(), 2);

    assert!(enforce_record_limit(&store, 2).unwrap().is_empty());
  }
}

//! Storage seam for the offline cache.

use color_eyre::Result;

use super::record::CachedRecord;

/// Durable keyed collection of cached records.
///
/// Writes are upserts keyed by `id`; the last write for an id wins. There is no
/// record-level locking, callers sequence their own operations.
pub trait CacheStore: Send + Sync {
  /// Insert or replace a single record.
  fn put(&self, record: &CachedRecord) -> Result<()>;

  /// Insert or replace many records.
  fn put_many(&self, records: &[CachedRecord]) -> Result<()> {
    for record in records {
      self.put(record)?;
    }
    Ok(())
  }

  fn get(&self, id: &str) -> Result<Option<CachedRecord>>;

  /// Lookup by the platform video id.
  fn get_by_video_id(&self, video_id: &str) -> Result<Option<CachedRecord>>;

  /// All records, newest publish time first. Order among equal timestamps is unspecified.
  fn get_all_sorted_by_publish_desc(&self) -> Result<Vec<CachedRecord>>;

  fn delete(&self, id: &str) -> Result<()>;

  fn clear(&self) -> Result<()>;

  fn count(&self) -> Result<usize>;

  /// Approximate size of all cached records in bytes (sum of serialized lengths).
  fn estimate_size_bytes(&self) -> Result<u64>;

  /// Swap the whole cache for `records`.
  ///
  /// Backends that support transactions make this all-or-nothing.
  fn replace_all(&self, records: &[CachedRecord]) -> Result<()> {
    self.clear()?;
    self.put_many(records)
  }
}

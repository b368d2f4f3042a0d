//! Sync bookkeeping persisted in the `metadata` key/value table.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};

use crate::db::Database;

const LAST_SYNC_KEY: &str = "lastSync";
const PAYLOAD_VERSION_KEY: &str = "cachePayloadVersion";
const TOTAL_SIZE_KEY: &str = "totalCacheSize";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncMetadata {
  pub last_sync: Option<DateTime<Utc>>,
  /// None until the first successful pull
  pub cache_payload_version: Option<i64>,
  pub total_cache_size: u64,
}

/// Storage seam for sync metadata. Only the orchestrator writes through it.
pub trait MetadataStore: Send + Sync {
  fn load(&self) -> Result<SyncMetadata>;
  fn save(&self, metadata: &SyncMetadata) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteMetadataStore {
  db: Database,
}

impl SqliteMetadataStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

impl MetadataStore for SqliteMetadataStore {
  fn load(&self) -> Result<SyncMetadata> {
    let conn = self.db.lock()?;
    let get = |key: &str| -> Result<Option<String>> {
      conn
        .query_row("SELECT value FROM metadata WHERE key = ?", params![key], |row| {
          row.get(0)
        })
        .optional()
        .map_err(|e| eyre!("Failed to read metadata '{}': {}", key, e))
    };

    let last_sync = get(LAST_SYNC_KEY)?
      .map(|s| {
        DateTime::parse_from_rfc3339(&s)
          .map(|t| t.with_timezone(&Utc))
          .map_err(|e| eyre!("Failed to parse lastSync '{}': {}", s, e))
      })
      .transpose()?;

    let cache_payload_version = get(PAYLOAD_VERSION_KEY)?
      .map(|s| {
        s.parse::<i64>()
          .map_err(|e| eyre!("Failed to parse cachePayloadVersion '{}': {}", s, e))
      })
      .transpose()?;

    let total_cache_size = get(TOTAL_SIZE_KEY)?
      .map(|s| {
        s.parse::<u64>()
          .map_err(|e| eyre!("Failed to parse totalCacheSize '{}': {}", s, e))
      })
      .transpose()?
      .unwrap_or(0);

    Ok(SyncMetadata {
      last_sync,
      cache_payload_version,
      total_cache_size,
    })
  }

  fn save(&self, metadata: &SyncMetadata) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let mut entries = vec![(TOTAL_SIZE_KEY, metadata.total_cache_size.to_string())];
    if let Some(last_sync) = metadata.last_sync {
      entries.push((LAST_SYNC_KEY, last_sync.to_rfc3339()));
    }
    if let Some(version) = metadata.cache_payload_version {
      entries.push((PAYLOAD_VERSION_KEY, version.to_string()));
    }

    for (key, value) in entries {
      tx.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write metadata '{}': {}", key, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit metadata: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_fresh_database_has_empty_metadata() {
    let store = SqliteMetadataStore::new(Database::open_in_memory().unwrap());
    assert_eq!(store.load().unwrap(), SyncMetadata::default());
  }

  #[test]
  fn test_save_and_load() {
    let store = SqliteMetadataStore::new(Database::open_in_memory().unwrap());
    let metadata = SyncMetadata {
      last_sync: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()),
      cache_payload_version: Some(3),
      total_cache_size: 123_456,
    };
    store.save(&metadata).unwrap();
    assert_eq!(store.load().unwrap(), metadata);

    let updated = SyncMetadata {
      total_cache_size: 7,
      ..metadata.clone()
    };
    store.save(&updated).unwrap();
    assert_eq!(store.load().unwrap().total_cache_size, 7);
  }
}

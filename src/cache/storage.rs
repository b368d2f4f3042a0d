//! SQLite implementation of the cache store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::record::CachedRecord;
use super::traits::CacheStore;
use crate::db::Database;

/// SQLite-backed cache store over the `videos` table.
#[derive(Clone)]
pub struct SqliteCacheStore {
  db: Database,
}

impl SqliteCacheStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

fn insert_record(conn: &Connection, record: &CachedRecord) -> Result<()> {
  let data =
    serde_json::to_vec(record).map_err(|e| eyre!("Failed to serialize record: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO videos (id, video_id, published_at, data)
       VALUES (?, ?, ?, ?)",
      params![record.id, record.video_id, record.published_key(), data],
    )
    .map_err(|e| eyre!("Failed to store record {}: {}", record.id, e))?;

  Ok(())
}

fn decode_record(data: &[u8]) -> Result<CachedRecord> {
  serde_json::from_slice(data).map_err(|e| eyre!("Failed to deserialize record: {}", e))
}

impl CacheStore for SqliteCacheStore {
  fn put(&self, record: &CachedRecord) -> Result<()> {
    let conn = self.db.lock()?;
    insert_record(&conn, record)
  }

  fn put_many(&self, records: &[CachedRecord]) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for record in records {
      insert_record(&tx, record)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }

  fn get(&self, id: &str) -> Result<Option<CachedRecord>> {
    let conn = self.db.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row("SELECT data FROM videos WHERE id = ?", params![id], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to load record {}: {}", id, e))?;

    data.as_deref().map(decode_record).transpose()
  }

  fn get_by_video_id(&self, video_id: &str) -> Result<Option<CachedRecord>> {
    let conn = self.db.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM videos WHERE video_id = ? LIMIT 1",
        params![video_id],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up video {}: {}", video_id, e))?;

    data.as_deref().map(decode_record).transpose()
  }

  fn get_all_sorted_by_publish_desc(&self) -> Result<Vec<CachedRecord>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare("SELECT data FROM videos ORDER BY published_at DESC")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query records: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read record row: {}", e))?;

    rows.iter().map(|data| decode_record(data)).collect()
  }

  fn delete(&self, id: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute("DELETE FROM videos WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to delete record {}: {}", id, e))?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute("DELETE FROM videos", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(())
  }

  fn count(&self) -> Result<usize> {
    let conn = self.db.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count records: {}", e))?;
    Ok(count as usize)
  }

  fn estimate_size_bytes(&self) -> Result<u64> {
    let conn = self.db.lock()?;
    let size: i64 = conn
      .query_row("SELECT COALESCE(SUM(LENGTH(data)), 0) FROM videos", [], |row| {
        row.get(0)
      })
      .map_err(|e| eyre!("Failed to estimate cache size: {}", e))?;
    Ok(size as u64)
  }

  fn replace_all(&self, records: &[CachedRecord]) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM videos", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;

    for record in records {
      insert_record(&tx, record)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit cache replacement: {}", e))
  }
}

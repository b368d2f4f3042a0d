pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared SQLite connection backing the cache, queue and metadata stores.
#[derive(Clone)]
pub struct Database {
  conn: Arc<Mutex<Connection>>,
}

impl Database {
  /// Open or create the database at `path`, or the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let db = Self {
      conn: Arc::new(Mutex::new(conn)),
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Get the default database path
  pub fn default_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("cache.db"))
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  /// Lock the connection for a single operation or transaction.
  pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Application data directory ($XDG_DATA_HOME/vidsync).
pub fn data_dir() -> Result<PathBuf> {
  let base = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(base.join("vidsync"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_migrations_create_tables() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.lock().unwrap();
    let tables: Vec<String> = conn
      .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
      .unwrap()
      .query_map([], |row| row.get(0))
      .unwrap()
      .filter_map(|r| r.ok())
      .collect();
    assert_eq!(tables, vec!["metadata", "pending_mutations", "videos"]);
  }

  #[test]
  fn test_migrations_are_idempotent() {
    let db = Database::open_in_memory().unwrap();
    assert!(db.run_migrations().is_ok());
  }
}

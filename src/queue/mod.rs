//! Durable queue of local writes waiting for remote confirmation.
//!
//! Mutations are pushed oldest first (by timestamp, then insertion order) so
//! that reconciliation behaves like a FIFO.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::RecordPatch;
use crate::db::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
  Update,
  Delete,
}

impl MutationKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      MutationKind::Update => "UPDATE",
      MutationKind::Delete => "DELETE",
    }
  }

  fn parse(s: &str) -> Option<Self> {
    match s {
      "UPDATE" => Some(MutationKind::Update),
      "DELETE" => Some(MutationKind::Delete),
      _ => None,
    }
  }
}

/// A queued local write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: MutationKind,
  pub target_id: String,
  /// Present for updates
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payload: Option<RecordPatch>,
  pub timestamp: DateTime<Utc>,
  pub retry_count: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_error: Option<String>,
}

/// A mutation before it has been assigned an id.
///
/// Built only through [`NewMutation::update`] and [`NewMutation::delete`], so an
/// update always carries its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMutation {
  kind: MutationKind,
  target_id: String,
  payload: Option<RecordPatch>,
  /// Defaults to now when unset
  timestamp: Option<DateTime<Utc>>,
}

impl NewMutation {
  pub fn update(target_id: impl Into<String>, patch: RecordPatch) -> Self {
    Self {
      kind: MutationKind::Update,
      target_id: target_id.into(),
      payload: Some(patch),
      timestamp: None,
    }
  }

  pub fn delete(target_id: impl Into<String>) -> Self {
    Self {
      kind: MutationKind::Delete,
      target_id: target_id.into(),
      payload: None,
      timestamp: None,
    }
  }

  #[allow(dead_code)]
  pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
    self.timestamp = Some(timestamp);
    self
  }
}

/// Storage seam for pending mutations.
pub trait MutationQueue: Send + Sync {
  /// Assign a fresh id and zero retry count, then persist. Never rejects a
  /// well-formed mutation.
  fn enqueue(&self, mutation: NewMutation) -> Result<PendingMutation>;

  /// All pending mutations, oldest first.
  fn get_all_ordered_by_timestamp(&self) -> Result<Vec<PendingMutation>>;

  /// Pending mutations for one target, oldest first.
  fn get_for_target(&self, target_id: &str) -> Result<Vec<PendingMutation>>;

  fn remove(&self, id: &str) -> Result<()>;

  /// Persist retry bookkeeping (retry count and last error).
  fn update(&self, mutation: &PendingMutation) -> Result<()>;

  fn count(&self) -> Result<usize>;
}

/// SQLite-backed mutation queue over the `pending_mutations` table.
#[derive(Clone)]
pub struct SqliteMutationQueue {
  db: Database,
}

impl SqliteMutationQueue {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  fn query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<PendingMutation>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare(sql)
      .map_err(|e| eyre!("Failed to prepare mutation query: {}", e))?;

    let rows: Vec<RawMutation> = stmt
      .query_map(args, RawMutation::from_row)
      .map_err(|e| eyre!("Failed to query mutations: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read mutation row: {}", e))?;

    rows.into_iter().map(RawMutation::decode).collect()
  }
}

const SELECT_COLUMNS: &str =
  "SELECT id, kind, target_id, payload, timestamp, retry_count, last_error FROM pending_mutations";

/// Row as stored, before decoding the enum, payload and timestamp.
struct RawMutation {
  id: String,
  kind: String,
  target_id: String,
  payload: Option<String>,
  timestamp: String,
  retry_count: u32,
  last_error: Option<String>,
}

impl RawMutation {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id: row.get(0)?,
      kind: row.get(1)?,
      target_id: row.get(2)?,
      payload: row.get(3)?,
      timestamp: row.get(4)?,
      retry_count: row.get(5)?,
      last_error: row.get(6)?,
    })
  }

  fn decode(self) -> Result<PendingMutation> {
    let kind = MutationKind::parse(&self.kind)
      .ok_or_else(|| eyre!("Unknown mutation kind '{}' for {}", self.kind, self.id))?;

    let payload = self
      .payload
      .map(|p| serde_json::from_str::<RecordPatch>(&p))
      .transpose()
      .map_err(|e| eyre!("Failed to parse payload of mutation {}: {}", self.id, e))?;

    let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
      .map(|t| t.with_timezone(&Utc))
      .map_err(|e| eyre!("Failed to parse timestamp '{}': {}", self.timestamp, e))?;

    Ok(PendingMutation {
      id: self.id,
      kind,
      target_id: self.target_id,
      payload,
      timestamp,
      retry_count: self.retry_count,
      last_error: self.last_error,
    })
  }
}

fn timestamp_key(timestamp: &DateTime<Utc>) -> String {
  timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl MutationQueue for SqliteMutationQueue {
  fn enqueue(&self, mutation: NewMutation) -> Result<PendingMutation> {
    let pending = PendingMutation {
      id: Uuid::new_v4().to_string(),
      kind: mutation.kind,
      target_id: mutation.target_id,
      payload: mutation.payload,
      // Stored with microsecond precision, so hand back exactly what reads return
      timestamp: mutation.timestamp.unwrap_or_else(Utc::now).trunc_subsecs(6),
      retry_count: 0,
      last_error: None,
    };

    let payload = pending
      .payload
      .as_ref()
      .map(serde_json::to_string)
      .transpose()
      .map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT INTO pending_mutations
           (id, kind, target_id, payload, timestamp, seq, retry_count, last_error)
         VALUES (?, ?, ?, ?, ?,
           (SELECT COALESCE(MAX(seq), 0) + 1 FROM pending_mutations), 0, NULL)",
        params![
          pending.id,
          pending.kind.as_str(),
          pending.target_id,
          payload,
          timestamp_key(&pending.timestamp),
        ],
      )
      .map_err(|e| eyre!("Failed to enqueue mutation: {}", e))?;

    Ok(pending)
  }

  fn get_all_ordered_by_timestamp(&self) -> Result<Vec<PendingMutation>> {
    self.query(&format!("{} ORDER BY timestamp, seq", SELECT_COLUMNS), &[])
  }

  fn get_for_target(&self, target_id: &str) -> Result<Vec<PendingMutation>> {
    self.query(
      &format!("{} WHERE target_id = ? ORDER BY timestamp, seq", SELECT_COLUMNS),
      &[&target_id],
    )
  }

  fn remove(&self, id: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute("DELETE FROM pending_mutations WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove mutation {}: {}", id, e))?;
    Ok(())
  }

  fn update(&self, mutation: &PendingMutation) -> Result<()> {
    let conn = self.db.lock()?;
    let changed = conn
      .execute(
        "UPDATE pending_mutations SET retry_count = ?, last_error = ? WHERE id = ?",
        params![mutation.retry_count, mutation.last_error, mutation.id],
      )
      .map_err(|e| eyre!("Failed to update mutation {}: {}", mutation.id, e))?;

    if changed == 0 {
      return Err(eyre!("Mutation {} is no longer queued", mutation.id));
    }
    Ok(())
  }

  fn count(&self) -> Result<usize> {
    let conn = self.db.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM pending_mutations", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count mutations: {}", e))?;
    Ok(count as usize)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};
  use std::collections::HashSet;

  fn queue() -> SqliteMutationQueue {
    SqliteMutationQueue::new(Database::open_in_memory().unwrap())
  }

  fn patch() -> RecordPatch {
    RecordPatch {
      watched: Some(true),
      ..Default::default()
    }
  }

  #[test]
  fn test_enqueue_assigns_unique_ids() {
    let queue = queue();
    let ids: HashSet<String> = (0..20)
      .map(|i| queue.enqueue(NewMutation::delete(format!("v{}", i))).unwrap().id)
      .collect();
    assert_eq!(ids.len(), 20);
    assert_eq!(queue.count().unwrap(), 20);
  }

  #[test]
  fn test_enqueue_starts_with_zero_retries() {
    let queue = queue();
    let m = queue.enqueue(NewMutation::update("v1", patch())).unwrap();
    assert_eq!(m.retry_count, 0);
    assert!(m.last_error.is_none());

    let stored = queue.get_all_ordered_by_timestamp().unwrap();
    assert_eq!(stored, vec![m]);
  }

  #[test]
  fn test_enqueue_returns_timestamp_as_stored() {
    let queue = queue();
    let precise = Utc.timestamp_opt(1_709_294_400, 123_456_789).unwrap();

    let m = queue.enqueue(NewMutation::delete("v1").at(precise)).unwrap();
    assert_eq!(m.timestamp.timestamp_subsec_nanos(), 123_456_000);
    assert_eq!(queue.get_for_target("v1").unwrap(), vec![m.clone()]);

    let now = queue.enqueue(NewMutation::update("v2", patch())).unwrap();
    assert_eq!(now.timestamp.timestamp_subsec_nanos() % 1_000, 0);
    assert_eq!(queue.get_for_target("v2").unwrap(), vec![now]);
  }

  #[test]
  fn test_ordered_oldest_first() {
    let queue = queue();
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    queue
      .enqueue(NewMutation::delete("late").at(base + Duration::minutes(5)))
      .unwrap();
    queue.enqueue(NewMutation::delete("early").at(base)).unwrap();
    // Same timestamp as "early": insertion order breaks the tie
    queue.enqueue(NewMutation::delete("early-2").at(base)).unwrap();

    let targets: Vec<String> = queue
      .get_all_ordered_by_timestamp()
      .unwrap()
      .into_iter()
      .map(|m| m.target_id)
      .collect();
    assert_eq!(targets, vec!["early", "early-2", "late"]);
  }

  #[test]
  fn test_update_persists_retry_state() {
    let queue = queue();
    let mut m = queue.enqueue(NewMutation::update("v1", patch())).unwrap();

    m.retry_count = 2;
    m.last_error = Some("connection reset".into());
    queue.update(&m).unwrap();

    let stored = &queue.get_all_ordered_by_timestamp().unwrap()[0];
    assert_eq!(stored.retry_count, 2);
    assert_eq!(stored.last_error.as_deref(), Some("connection reset"));
    assert_eq!(stored.payload, Some(patch()));
  }

  #[test]
  fn test_update_of_removed_mutation_fails() {
    let queue = queue();
    let m = queue.enqueue(NewMutation::delete("v1")).unwrap();
    queue.remove(&m.id).unwrap();
    assert_eq!(queue.count().unwrap(), 0);
    assert!(queue.update(&m).is_err());
  }

  #[test]
  fn test_get_for_target() {
    let queue = queue();
    queue.enqueue(NewMutation::update("v1", patch())).unwrap();
    queue.enqueue(NewMutation::delete("v2")).unwrap();
    queue.enqueue(NewMutation::delete("v1")).unwrap();

    let for_v1 = queue.get_for_target("v1").unwrap();
    assert_eq!(for_v1.len(), 2);
    assert_eq!(for_v1[0].kind, MutationKind::Update);
    assert_eq!(for_v1[1].kind, MutationKind::Delete);
  }

  #[test]
  fn test_wire_shape() {
    let m = PendingMutation {
      id: "m1".into(),
      kind: MutationKind::Delete,
      target_id: "v1".into(),
      payload: None,
      timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
      retry_count: 1,
      last_error: None,
    };
    let json = serde_json::to_value(&m).unwrap();
    assert_eq!(json["type"], "DELETE");
    assert_eq!(json["targetId"], "v1");
    assert_eq!(json["retryCount"], 1);
    assert!(json.get("payload").is_none());
  }
}

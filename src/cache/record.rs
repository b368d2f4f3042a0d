//! Cached projection of remote video entities.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A linked entity embedded in a record (a person or a topic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedEntity {
  pub id: String,
  pub name: String,
}

/// Reduced projection of a remote video kept in the offline cache.
///
/// Bulky fields such as transcripts never make it in here; see [`RemoteVideo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRecord {
  pub id: String,
  /// Alternate identifier (the platform's video id)
  pub video_id: String,
  pub published_at: DateTime<Utc>,
  pub title: String,
  #[serde(default)]
  pub channel: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub people: Vec<LinkedEntity>,
  #[serde(default)]
  pub topics: Vec<LinkedEntity>,

  // User-editable fields
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rating: Option<u8>,
  #[serde(default)]
  pub favorite: bool,
  #[serde(default)]
  pub watched: bool,
}

impl CachedRecord {
  /// Approximate storage footprint: the length of the serialized record.
  ///
  /// This is not the real on-disk size, only a stable estimate that is good
  /// enough for eviction decisions.
  pub fn estimated_size(&self) -> u64 {
    serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
  }

  /// Publish time in a fixed-width format whose lexical order matches time order.
  pub fn published_key(&self) -> String {
    self.published_at.to_rfc3339_opts(SecondsFormat::Millis, true)
  }

  /// Apply a local edit to the user-editable fields.
  pub fn apply_patch(&mut self, patch: &RecordPatch) {
    if let Some(notes) = &patch.notes {
      // An empty string clears the notes
      self.notes = if notes.is_empty() {
        None
      } else {
        Some(notes.clone())
      };
    }
    if let Some(rating) = patch.rating {
      self.rating = Some(rating);
    }
    if let Some(favorite) = patch.favorite {
      self.favorite = favorite;
    }
    if let Some(watched) = patch.watched {
      self.watched = watched;
    }
  }
}

/// Partial update of the user-editable fields of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rating: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub favorite: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub watched: Option<bool>,
}

impl RecordPatch {
  pub fn is_empty(&self) -> bool {
    self.notes.is_none() && self.rating.is_none() && self.favorite.is_none() && self.watched.is_none()
  }
}

/// A video as the remote service may send it, including fields the cache drops.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVideo {
  #[serde(flatten)]
  pub record: CachedRecord,
  #[serde(default)]
  pub transcript: Option<String>,
}

impl From<RemoteVideo> for CachedRecord {
  fn from(video: RemoteVideo) -> Self {
    video.record
  }
}

#[cfg(test)]
pub(crate) mod fixtures {
  use super::*;
  use chrono::TimeZone;

  /// A record published at midnight UTC on the given date.
  pub fn record(id: &str, year: i32, month: u32, day: u32) -> CachedRecord {
    CachedRecord {
      id: id.to_string(),
      video_id: format!("yt-{}", id),
      published_at: Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap(),
      title: format!("Video {}", id),
      channel: String::new(),
      description: String::new(),
      tags: Vec::new(),
      people: Vec::new(),
      topics: Vec::new(),
      notes: None,
      rating: None,
      favorite: false,
      watched: false,
    }
  }
}

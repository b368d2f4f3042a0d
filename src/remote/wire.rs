//! Request/response bodies of the sync endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::RemoteVideo;
use crate::queue::PendingMutation;

/// Body posted to the sync endpoint, tagged by `action`.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum SyncRequest<'a> {
  Cache {
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
  },
  Mutations {
    mutations: &'a [PendingMutation],
  },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheResponse {
  #[serde(default)]
  pub videos: Vec<RemoteVideo>,
  #[serde(default)]
  pub timestamp: Option<DateTime<Utc>>,
  #[serde(default)]
  pub total_available: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationsResponse {
  #[serde(default)]
  pub synced: usize,
  #[serde(default)]
  pub errors: Vec<MutationErrorEntry>,
}

/// Per-mutation failure reported by the endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationErrorEntry {
  pub mutation_id: String,
  pub error: String,
  /// Status-like code used for classification, when the server sends one
  #[serde(default)]
  pub status: Option<u16>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue::MutationKind;
  use chrono::TimeZone;

  #[test]
  fn test_cache_request_shape() {
    let body = serde_json::to_value(SyncRequest::Cache { limit: Some(200) }).unwrap();
    assert_eq!(body, serde_json::json!({"action": "cache", "limit": 200}));
  }

  #[test]
  fn test_mutations_request_shape() {
    let mutations = vec![PendingMutation {
      id: "m1".into(),
      kind: MutationKind::Delete,
      target_id: "v9".into(),
      payload: None,
      timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
      retry_count: 0,
      last_error: None,
    }];
    let body = serde_json::to_value(SyncRequest::Mutations {
      mutations: &mutations,
    })
    .unwrap();
    assert_eq!(body["action"], "mutations");
    assert_eq!(body["mutations"][0]["targetId"], "v9");
  }

  #[test]
  fn test_cache_response_parses() {
    let json = r#"{
      "videos": [{
        "id": "v1", "videoId": "abc", "publishedAt": "2024-02-01T00:00:00Z",
        "title": "t", "transcript": "long"
      }],
      "timestamp": "2024-02-02T10:00:00Z",
      "totalAvailable": 1234
    }"#;
    let resp: CacheResponse = serde_json::from_str(json).unwrap();
    assert_eq!(resp.videos.len(), 1);
    assert_eq!(resp.total_available, 1234);
  }

  #[test]
  fn test_mutations_response_parses() {
    let json = r#"{"synced": 0, "errors": [{"mutationId": "m1", "error": "gone", "status": 404}]}"#;
    let resp: MutationsResponse = serde_json::from_str(json).unwrap();
    assert_eq!(resp.errors[0].status, Some(404));
  }
}

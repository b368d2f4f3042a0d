use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::wire::{CacheResponse, MutationsResponse, SyncRequest};
use super::{CacheSnapshot, RemoteError, RemoteService};
use crate::cache::RecordPatch;
use crate::queue::PendingMutation;

/// HTTP client for the remote sync endpoint (`POST {base}/sync`).
///
/// Only mutation pushes carry a request timeout. The cache pull is bounded by
/// the caller, which owns the pull budget.
#[derive(Clone)]
pub struct HttpRemote {
  client: reqwest::Client,
  endpoint: Url,
  token: Option<String>,
  push_timeout: Duration,
}

impl HttpRemote {
  pub fn new(base_url: &str, push_timeout: Duration, token: Option<String>) -> Result<Self> {
    let endpoint = sync_endpoint(base_url)?;

    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      endpoint,
      token,
      push_timeout,
    })
  }

  async fn post<T: DeserializeOwned>(
    &self,
    body: &SyncRequest<'_>,
    timeout: Option<Duration>,
  ) -> Result<T, RemoteError> {
    let mut request = self.client.post(self.endpoint.clone()).json(body);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }
    if let Some(timeout) = timeout {
      request = request.timeout(timeout);
    }

    let response = request.send().await.map_err(RemoteError::from_reqwest)?;
    let status = response.status();

    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(RemoteError::from_status(status.as_u16(), &body));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| RemoteError::other(format!("Invalid response: {}", e)))
  }

  /// Push one queued mutation, as stored, through the batch `mutations` action.
  async fn push_one(&self, mutation: &PendingMutation) -> Result<(), RemoteError> {
    let response: MutationsResponse = self
      .post(
        &SyncRequest::Mutations {
          mutations: std::slice::from_ref(mutation),
        },
        Some(self.push_timeout),
      )
      .await?;

    check_mutation_response(&mutation.id, response)
  }
}

/// Interpret the endpoint's answer for one pushed mutation.
fn check_mutation_response(mutation_id: &str, response: MutationsResponse) -> Result<(), RemoteError> {
  if let Some(entry) = response
    .errors
    .into_iter()
    .find(|e| e.mutation_id == mutation_id)
  {
    return Err(match entry.status {
      Some(status) => RemoteError::from_status(status, &entry.error),
      None => RemoteError::other(entry.error),
    });
  }

  if response.synced == 0 {
    return Err(RemoteError::other("Mutation was not acknowledged"));
  }

  Ok(())
}

/// Build `{base}/sync`, keeping any path prefix on the base URL.
fn sync_endpoint(base_url: &str) -> Result<Url> {
  let mut base = base_url.trim().to_string();
  if !base.ends_with('/') {
    base.push('/');
  }

  Url::parse(&base)
    .and_then(|u| u.join("sync"))
    .map_err(|e| eyre!("Invalid remote URL '{}': {}", base_url, e))
}

#[async_trait]
impl RemoteService for HttpRemote {
  async fn update(&self, mutation: &PendingMutation, _patch: &RecordPatch) -> Result<(), RemoteError> {
    debug!(id = %mutation.target_id, mutation_id = %mutation.id, "Pushing update");
    self.push_one(mutation).await
  }

  async fn delete(&self, mutation: &PendingMutation) -> Result<(), RemoteError> {
    debug!(id = %mutation.target_id, mutation_id = %mutation.id, "Pushing delete");
    self.push_one(mutation).await
  }

  async fn fetch_cache(&self, limit: usize) -> Result<CacheSnapshot, RemoteError> {
    let response: CacheResponse = self
      .post(&SyncRequest::Cache { limit: Some(limit) }, None)
      .await?;

    Ok(CacheSnapshot {
      records: response.videos.into_iter().map(Into::into).collect(),
      timestamp: response.timestamp,
      total_available: response.total_available,
    })
  }
}

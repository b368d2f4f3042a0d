use std::fmt;
use thiserror::Error;

/// How the remote service classified a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
  /// The target no longer exists remotely
  NotFound,
  /// The remote state changed underneath the local write
  Conflict,
  /// The payload was rejected as invalid
  Validation,
  /// Connection failures and 5xx responses
  Network,
  /// The request did not finish in time
  Timeout,
  Other,
}

impl fmt::Display for RemoteErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RemoteErrorKind::NotFound => "not found",
      RemoteErrorKind::Conflict => "conflict",
      RemoteErrorKind::Validation => "validation failed",
      RemoteErrorKind::Network => "network error",
      RemoteErrorKind::Timeout => "timed out",
      RemoteErrorKind::Other => "remote error",
    };
    f.write_str(name)
  }
}

/// Error returned by the remote service, tagged with an explicit kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteError {
  pub kind: RemoteErrorKind,
  pub message: String,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
  pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  #[allow(dead_code)]
  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(RemoteErrorKind::NotFound, message)
  }

  #[allow(dead_code)]
  pub fn conflict(message: impl Into<String>) -> Self {
    Self::new(RemoteErrorKind::Conflict, message)
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::new(RemoteErrorKind::Validation, message)
  }

  pub fn network(message: impl Into<String>) -> Self {
    Self::new(RemoteErrorKind::Network, message)
  }

  pub fn timeout(message: impl Into<String>) -> Self {
    Self::new(RemoteErrorKind::Timeout, message)
  }

  pub fn other(message: impl Into<String>) -> Self {
    Self::new(RemoteErrorKind::Other, message)
  }

  /// Truncate a response body to avoid logging excessive data
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      body.to_string()
    } else {
      let mut end = MAX_ERROR_BODY_LENGTH;
      while !body.is_char_boundary(end) {
        end -= 1;
      }
      format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
  }

  /// Classify an HTTP-style status code.
  pub fn from_status(status: u16, body: &str) -> Self {
    let truncated = Self::truncate_body(body);
    let kind = match status {
      404 | 410 => RemoteErrorKind::NotFound,
      409 | 412 => RemoteErrorKind::Conflict,
      400 | 422 => RemoteErrorKind::Validation,
      408 | 504 => RemoteErrorKind::Timeout,
      429 | 500..=599 => RemoteErrorKind::Network,
      _ => RemoteErrorKind::Other,
    };
    Self::new(kind, format!("status {}: {}", status, truncated))
  }

  pub fn from_reqwest(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      Self::timeout(err.to_string())
    } else if let Some(status) = err.status() {
      Self::from_status(status.as_u16(), &err.to_string())
    } else if err.is_connect() || err.is_request() || err.is_body() {
      Self::network(err.to_string())
    } else {
      Self::other(err.to_string())
    }
  }
}

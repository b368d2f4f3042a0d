//! Classification of failed mutation pushes.

use crate::remote::{RemoteError, RemoteErrorKind};

/// Why a mutation left the queue without being applied remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
  /// Target no longer exists, the local change is moot
  NotFound,
  /// Remote state wins (last-write-wins)
  Conflict,
  /// Payload can never be accepted as sent
  Rejected,
}

/// What to do with a mutation whose push failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  /// Terminal: drop from the queue now, regardless of retry count
  Discard(DiscardReason),
  /// Transient: count the attempt and keep it queued
  Retry,
}

pub fn classify(err: &RemoteError) -> Disposition {
  match err.kind {
    RemoteErrorKind::NotFound => Disposition::Discard(DiscardReason::NotFound),
    RemoteErrorKind::Conflict => Disposition::Discard(DiscardReason::Conflict),
    RemoteErrorKind::Validation => Disposition::Discard(DiscardReason::Rejected),
    RemoteErrorKind::Network | RemoteErrorKind::Timeout | RemoteErrorKind::Other => {
      Disposition::Retry
    }
  }
}

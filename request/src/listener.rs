use crate::error::LoadError;

use std::fmt;
use std::sync::Arc;

/// The stage a request has reached, as reported to its listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
  /// Admitted and waiting for a worker.
  Pending,
  ReadingFromCache,
  LoadingFromNetwork,
  WritingToCache,
  /// The outcome has been delivered.
  Complete,
}

impl fmt::Display for RequestStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RequestStatus::Pending => write!(f, "pending"),
      RequestStatus::ReadingFromCache => write!(f, "reading from cache"),
      RequestStatus::LoadingFromNetwork => write!(f, "loading from network"),
      RequestStatus::WritingToCache => write!(f, "writing to cache"),
      RequestStatus::Complete => write!(f, "complete"),
    }
  }
}

/// Receives the outcome of a request.
///
/// Every method is called on the manager's UI executor, never on a worker
/// thread. A listener gets at most one of `on_success` / `on_failure`, and none
/// at all if its request was cancelled or its notifications were suppressed.
pub trait RequestListener<T>: Send + Sync {
  fn on_success(&self, value: Arc<T>);

  fn on_failure(&self, error: LoadError);

  /// Called as the request moves through its stages. Optional.
  fn on_progress(&self, _status: RequestStatus) {}
}

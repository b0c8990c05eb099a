use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use fibre_host::ResolveError;
use thiserror::Error;

/// Raised when an operation is not allowed in the manager's current lifecycle
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
  /// The manager has not been started yet.
  #[error("request manager is not started")]
  NotStarted,
  /// The manager has been stopped. A stopped manager cannot be restarted.
  #[error("request manager is stopped")]
  Stopped,
  /// `start` was called on a manager that is already running.
  #[error("request manager is already started")]
  AlreadyStarted,
}

/// Raised when a manager or service cannot be set up from what it was given.
#[derive(Debug, Error)]
pub enum ConfigurationError {
  /// The host context has no `RequestService` bound under the configured name.
  #[error("service '{service}' is not bound in context '{context}'")]
  ServiceUnresolved {
    service: String,
    context: String,
    #[source]
    source: ResolveError,
  },

  #[error("failed to spawn the UI thread: {0}")]
  UiThread(#[source] io::Error),

  #[error("failed to spawn a worker thread: {0}")]
  WorkerSpawn(#[source] io::Error),

  #[error("invalid configuration value for '{field}': {message}")]
  InvalidValue { field: &'static str, message: String },

  #[error("failed to build the cache store: {0}")]
  CacheBuild(String),
}

/// Everything `RequestManager::start` can fail with.
#[derive(Debug, Error)]
pub enum StartError {
  #[error(transparent)]
  Lifecycle(#[from] LifecycleError),
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),
}

/// The failure outcome of a request, delivered to its listener.
///
/// Cloneable so that a single outcome can be handed across threads and
/// retained by listeners.
#[derive(Clone, Error)]
pub enum LoadError {
  /// The remote side could not be reached or answered with an error.
  #[error("network error: {0}")]
  Network(String),
  /// The request failed with an error of its own.
  #[error("request failed: {0}")]
  Failed(Arc<dyn StdError + Send + Sync>),
  /// The request panicked while loading.
  #[error("request panicked: {0}")]
  Panicked(String),
}

impl LoadError {
  /// Wraps any error as a [`LoadError::Failed`].
  pub fn failed<E>(error: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    LoadError::Failed(Arc::new(error))
  }

  pub fn network(message: impl Into<String>) -> Self {
    LoadError::Network(message.into())
  }
}

impl fmt::Debug for LoadError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LoadError::Network(message) => f.debug_tuple("Network").field(message).finish(),
      LoadError::Failed(error) => f.debug_tuple("Failed").field(&error.to_string()).finish(),
      LoadError::Panicked(message) => f.debug_tuple("Panicked").field(message).finish(),
    }
  }
}

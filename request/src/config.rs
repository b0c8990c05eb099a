//! Plain configuration for services and managers.
//!
//! Both structs can be built in code or, with the `serde` feature, read from
//! any serde format. Durations are written as humantime strings such as
//! `"2500ms"` or `"1m 30s"`.

use crate::error::ConfigurationError;
use crate::request::RetryPolicy;

pub(crate) const DEFAULT_SERVICE_NAME: &str = "default";
pub(crate) const DEFAULT_WORKER_PREFIX: &str = "fibre-request-worker";
pub(crate) const DEFAULT_UI_THREAD_NAME: &str = "fibre-request-ui";

fn default_worker_threads() -> usize {
  // Never fewer than two, so one slow request cannot hold up the rest.
  num_cpus::get().max(2)
}

/// Configuration of a `RequestService`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields, default))]
pub struct ServiceConfig {
  /// Name the service is bound under in a host context.
  pub name: String,
  pub worker_threads: usize,
  pub thread_name_prefix: String,
  /// Maximum number of cached results. `None` is unbounded.
  pub cache_capacity: Option<u64>,
  /// Retry policy for requests that do not define their own.
  pub default_retry: Option<RetryPolicy>,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: DEFAULT_SERVICE_NAME.to_string(),
      worker_threads: default_worker_threads(),
      thread_name_prefix: DEFAULT_WORKER_PREFIX.to_string(),
      cache_capacity: None,
      default_retry: None,
    }
  }
}

impl ServiceConfig {
  pub fn validate(&self) -> Result<(), ConfigurationError> {
    if self.name.is_empty() {
      return Err(ConfigurationError::InvalidValue {
        field: "name",
        message: "service name cannot be empty".to_string(),
      });
    }
    if self.worker_threads == 0 {
      return Err(ConfigurationError::InvalidValue {
        field: "worker_threads",
        message: "at least one worker thread is required".to_string(),
      });
    }
    if self.cache_capacity == Some(0) {
      return Err(ConfigurationError::InvalidValue {
        field: "cache_capacity",
        message: "use no capacity for an unbounded cache, not zero".to_string(),
      });
    }
    Ok(())
  }
}

/// Configuration of a `RequestManager`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields, default))]
pub struct ManagerConfig {
  /// Name of the `RequestService` binding to resolve on start.
  pub service: String,
  /// Name of the UI thread the manager spawns when no executor is supplied.
  pub ui_thread_name: String,
}

impl Default for ManagerConfig {
  fn default() -> Self {
    Self {
      service: DEFAULT_SERVICE_NAME.to_string(),
      ui_thread_name: DEFAULT_UI_THREAD_NAME.to_string(),
    }
  }
}

#[cfg(feature = "serde")]
pub(crate) mod de {
  use serde::{Deserialize, Deserializer};
  use std::time::Duration;

  /// Reads a duration from a humantime string.
  pub(crate) fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
  }
}

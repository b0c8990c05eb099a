//! The service a request manager binds to: a background runner and a cache
//! store, registered in a host context under a name.

use crate::cache::{CacheStore, MemoryCacheStore};
use crate::config::ServiceConfig;
use crate::error::ConfigurationError;
use crate::request::RetryPolicy;
use crate::runner::{BackgroundRunner, WorkerPool};

use std::fmt;
use std::sync::Arc;

use fibre_host::HostContext;

/// The shared execution resources behind one or more request managers.
///
/// Managers never own a service; they resolve it from the [`HostContext`]
/// they are started with, so several managers started from the same context
/// share workers and cached results.
pub struct RequestService {
  name: String,
  runner: Arc<dyn BackgroundRunner>,
  cache: Arc<dyn CacheStore>,
  default_retry: Option<RetryPolicy>,
}

impl RequestService {
  pub fn builder(name: impl Into<String>) -> ServiceBuilder {
    ServiceBuilder::new(name)
  }

  /// Builds a service with a worker pool and an in-memory store as described
  /// by `config`.
  pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigurationError> {
    ServiceBuilder {
      config: config.clone(),
      runner: None,
      cache: None,
    }
    .build()
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn runner(&self) -> &Arc<dyn BackgroundRunner> {
    &self.runner
  }

  pub fn cache(&self) -> &Arc<dyn CacheStore> {
    &self.cache
  }

  pub fn default_retry(&self) -> Option<RetryPolicy> {
    self.default_retry
  }

  /// Registers the service in `context` under its name and returns the
  /// shared handle.
  pub fn bind(self, context: &HostContext) -> Arc<RequestService> {
    let service = Arc::new(self);
    context.bind_arc(Some(service.name()), service.clone());
    tracing::debug!(service = %service.name, context = %context.name(), "request service bound");
    service
  }

  /// Stops the service's runner. Requests still queued run as cancelled.
  pub fn shutdown(&self) {
    self.runner.shutdown();
  }
}

impl fmt::Debug for RequestService {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RequestService")
      .field("name", &self.name)
      .field("default_retry", &self.default_retry)
      .finish_non_exhaustive()
  }
}

/// Builder for [`RequestService`].
pub struct ServiceBuilder {
  config: ServiceConfig,
  runner: Option<Arc<dyn BackgroundRunner>>,
  cache: Option<Arc<dyn CacheStore>>,
}

impl ServiceBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      config: ServiceConfig {
        name: name.into(),
        ..ServiceConfig::default()
      },
      runner: None,
      cache: None,
    }
  }

  /// Number of worker threads in the default worker pool.
  pub fn worker_threads(mut self, threads: usize) -> Self {
    self.config.worker_threads = threads;
    self
  }

  pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.config.thread_name_prefix = prefix.into();
    self
  }

  /// Bounds the default in-memory store to `capacity` entries.
  pub fn cache_capacity(mut self, capacity: u64) -> Self {
    self.config.cache_capacity = Some(capacity);
    self
  }

  pub fn default_retry(mut self, policy: RetryPolicy) -> Self {
    self.config.default_retry = Some(policy);
    self
  }

  /// Uses a custom runner instead of the default worker pool.
  pub fn runner(mut self, runner: Arc<dyn BackgroundRunner>) -> Self {
    self.runner = Some(runner);
    self
  }

  /// Uses a custom cache store instead of the default in-memory one.
  pub fn cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
    self.cache = Some(cache);
    self
  }

  pub fn build(self) -> Result<RequestService, ConfigurationError> {
    self.config.validate()?;

    let runner = match self.runner {
      Some(runner) => runner,
      None => Arc::new(WorkerPool::new(
        self.config.worker_threads,
        &self.config.thread_name_prefix,
      )?),
    };
    let cache = match self.cache {
      Some(cache) => cache,
      None => match self.config.cache_capacity {
        Some(capacity) => Arc::new(MemoryCacheStore::with_capacity(capacity)?),
        None => Arc::new(MemoryCacheStore::new()?),
      },
    };

    Ok(RequestService {
      name: self.config.name,
      runner,
      cache,
      default_retry: self.config.default_retry,
    })
  }
}

impl fmt::Debug for ServiceBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ServiceBuilder")
      .field("config", &self.config)
      .field("custom_runner", &self.runner.is_some())
      .field("custom_cache", &self.cache.is_some())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bind_registers_under_service_name() {
    let context = HostContext::new("target");
    let service = RequestService::builder("json-rest")
      .worker_threads(2)
      .build()
      .unwrap()
      .bind(&context);

    let resolved = context.resolve::<RequestService>(Some("json-rest")).unwrap();
    assert!(Arc::ptr_eq(&service, &resolved));
    assert!(context.lookup::<RequestService>(None).is_none());
    service.shutdown();
  }

  #[test]
  fn invalid_config_fails_to_build() {
    let err = RequestService::builder("bad").worker_threads(0).build().unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { field: "worker_threads", .. }));
  }

  #[test]
  fn from_config_carries_default_retry() {
    let config = ServiceConfig {
      name: "retrying".to_string(),
      worker_threads: 1,
      default_retry: Some(RetryPolicy::default()),
      ..ServiceConfig::default()
    };
    let service = RequestService::from_config(&config).unwrap();
    assert_eq!(service.name(), "retrying");
    assert_eq!(service.default_retry(), Some(RetryPolicy::default()));
    service.shutdown();
  }
}

//! # Fibre Request
//!
//! Background request execution with result caching and listener delivery on
//! a dedicated UI thread.
//!
//! A [`RequestManager`] admits [`Request`]s, runs them on the worker pool of a
//! [`RequestService`], caches their results and hands each outcome to a
//! [`RequestListener`] on a single, serialized UI executor. The manager does
//! not own the service: it resolves it by name from the
//! [`HostContext`](fibre_host::HostContext) it is started with.
//!
//! ## Features
//! - **Lifecycle**: `New → Started → Stopped`, with a bounded join on stop.
//! - **Cache aware**: results are cached under `(output type, key)` and served
//!   again while they satisfy a [`Freshness`] window.
//! - **Cancellation & suppression**: cancel a request, or keep it running and
//!   silence its listener.
//! - **Retries**: per-request or per-service [`RetryPolicy`].
//! - **Configuration**: plain structs, readable through `serde` (default
//!   feature) with humantime durations.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_host::HostContext;
//! use fibre_request::{
//!   CancellationFlag, Freshness, LoadError, Request, RequestListener, RequestManager,
//!   RequestService,
//! };
//! use std::sync::{mpsc, Arc, Mutex};
//! use std::time::Duration;
//!
//! struct Greeting(CancellationFlag);
//!
//! impl Request for Greeting {
//!   type Output = String;
//!
//!   fn load_from_network(&self) -> Result<String, LoadError> {
//!     Ok("hello".to_string())
//!   }
//!
//!   fn cancellation(&self) -> &CancellationFlag {
//!     &self.0
//!   }
//! }
//!
//! struct Print(Mutex<mpsc::Sender<String>>);
//!
//! impl RequestListener<String> for Print {
//!   fn on_success(&self, value: Arc<String>) {
//!     let _ = self.0.lock().unwrap().send(value.to_string());
//!   }
//!
//!   fn on_failure(&self, _error: LoadError) {}
//! }
//!
//! let context = HostContext::new("app");
//! RequestService::builder("default").worker_threads(2).build().unwrap().bind(&context);
//!
//! let manager = RequestManager::new("default");
//! manager.start(&context).unwrap();
//!
//! let (tx, rx) = mpsc::channel();
//! let listener: Arc<dyn RequestListener<String>> = Arc::new(Print(Mutex::new(tx)));
//! manager
//!   .execute(Arc::new(Greeting(CancellationFlag::new())), "greeting", Freshness::ONE_MINUTE, Some(listener))
//!   .unwrap();
//!
//! assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "hello");
//! assert!(manager.stop_and_join(Duration::from_millis(500)));
//! ```

// Public modules that form the API
pub mod cache;
pub mod config;
pub mod error;
pub mod listener;
pub mod manager;
pub mod request;
pub mod runner;
pub mod service;
pub mod ui;

// Internal, crate-only modules
mod dispatcher;
mod registry;

// Re-export the primary user-facing types for convenience
pub use cache::{CacheKey, CacheStore, CachedValue, Freshness, MemoryCacheStore};
pub use config::{ManagerConfig, ServiceConfig};
pub use error::{ConfigurationError, LifecycleError, LoadError, StartError};
pub use listener::{RequestListener, RequestStatus};
pub use manager::{Lifecycle, ManagerBuilder, RequestManager};
pub use request::{CancellationFlag, Request, RetryPolicy};
#[cfg(feature = "tokio")]
pub use runner::TokioRunner;
pub use runner::{BackgroundRunner, Job, TaskHandle, WorkerPool};
pub use service::{RequestService, ServiceBuilder};
pub use ui::{UiExecutor, UiTask, UiThread};

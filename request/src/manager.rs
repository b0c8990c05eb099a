//! The request manager: lifecycle, admission, cancellation and listener
//! suppression.

use crate::cache::{CacheKey, CacheStore, Freshness};
use crate::config::ManagerConfig;
use crate::dispatcher::Dispatch;
use crate::error::{ConfigurationError, LifecycleError, StartError};
use crate::listener::{RequestListener, RequestStatus};
use crate::registry::{Registry, RegistryEntry, RequestId, Ticket};
use crate::request::{CancellationFlag, Request};
use crate::service::RequestService;
use crate::ui::{UiExecutor, UiThread};

use std::any::Any;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fibre_host::HostContext;
use parking_lot::Mutex;

/// The lifecycle state of a [`RequestManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  /// Created, not yet started. Requests are rejected.
  New,
  /// Accepting and running requests.
  Started,
  /// Stopped for good. Requests are rejected.
  Stopped,
}

impl fmt::Display for Lifecycle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Lifecycle::New => write!(f, "new"),
      Lifecycle::Started => write!(f, "started"),
      Lifecycle::Stopped => write!(f, "stopped"),
    }
  }
}

/// What a started manager holds on to.
#[derive(Clone)]
struct Running {
  service: Arc<RequestService>,
  ui: Arc<dyn UiExecutor>,
  // Set when the manager spawned the UI thread itself and must stop it.
  own_ui: Option<Arc<UiThread>>,
}

enum State {
  New,
  Started(Running),
  Stopped,
}

impl State {
  fn lifecycle(&self) -> Lifecycle {
    match self {
      State::New => Lifecycle::New,
      State::Started(_) => Lifecycle::Started,
      State::Stopped => Lifecycle::Stopped,
    }
  }

  fn running(&self) -> Result<Running, LifecycleError> {
    match self {
      State::Started(running) => Ok(running.clone()),
      State::New => Err(LifecycleError::NotStarted),
      State::Stopped => Err(LifecycleError::Stopped),
    }
  }
}

/// Runs requests in the background, caches their results and reports
/// outcomes to listeners on a UI executor.
///
/// A manager goes through `New → Started → Stopped` exactly once. It does not
/// own its workers or cache: on [`start`](Self::start) it resolves the
/// [`RequestService`] bound under its configured service name in the given
/// [`HostContext`].
///
/// Cancelling a request and suppressing its listener are different things:
/// both keep the listener from hearing about the outcome, but only
/// cancellation tries to stop the request from running. A suppressed request
/// still runs to completion and still writes its result to the cache.
pub struct RequestManager {
  config: ManagerConfig,
  ui_override: Option<Arc<dyn UiExecutor>>,
  state: Mutex<State>,
  registry: Arc<Registry>,
  next_ticket: AtomicU64,
}

impl RequestManager {
  /// Creates a manager that will bind to the service named `service`.
  pub fn new(service: impl Into<String>) -> Self {
    Self::builder(service).build()
  }

  pub fn builder(service: impl Into<String>) -> ManagerBuilder {
    ManagerBuilder::new(service)
  }

  pub fn from_config(config: ManagerConfig) -> Self {
    ManagerBuilder {
      config,
      ui_executor: None,
    }
    .build()
  }

  pub fn service_name(&self) -> &str {
    &self.config.service
  }

  // --- Lifecycle ---

  /// Starts the manager from `context`.
  ///
  /// Fails with a [`ConfigurationError`] if the context has no
  /// [`RequestService`] bound under this manager's service name, and with a
  /// [`LifecycleError`] if the manager was already started or stopped.
  pub fn start(&self, context: &HostContext) -> Result<(), StartError> {
    let mut state = self.state.lock();
    match *state {
      State::New => {}
      State::Started(_) => return Err(LifecycleError::AlreadyStarted.into()),
      State::Stopped => return Err(LifecycleError::Stopped.into()),
    }

    let service = context
      .resolve::<RequestService>(Some(self.config.service.as_str()))
      .map_err(|source| ConfigurationError::ServiceUnresolved {
        service: self.config.service.clone(),
        context: context.name().to_string(),
        source,
      })?;

    let (ui, own_ui) = match &self.ui_override {
      Some(ui) => (ui.clone(), None),
      None => {
        let thread = Arc::new(
          UiThread::spawn(self.config.ui_thread_name.clone()).map_err(ConfigurationError::UiThread)?,
        );
        (thread.clone() as Arc<dyn UiExecutor>, Some(thread))
      }
    };

    tracing::info!(service = %self.config.service, context = %context.name(), "request manager started");
    *state = State::Started(Running { service, ui, own_ui });
    Ok(())
  }

  pub fn state(&self) -> Lifecycle {
    self.state.lock().lifecycle()
  }

  pub fn is_started(&self) -> bool {
    self.state() == Lifecycle::Started
  }

  /// Stops the manager and waits up to `timeout` for requests in flight to
  /// settle. Returns `true` if they all did.
  ///
  /// From this point on no listener is notified and no request is admitted.
  /// Requests already running finish in the background and still write to
  /// the cache.
  pub fn stop_and_join(&self, timeout: Duration) -> bool {
    let previous = std::mem::replace(&mut *self.state.lock(), State::Stopped);
    self.registry.mark_all_suppressed();

    let drained = self.registry.wait_until_empty(timeout);
    if let State::Started(running) = previous {
      if let Some(ui) = running.own_ui {
        ui.shutdown();
      }
      tracing::info!(
        service = %self.config.service,
        drained,
        pending = self.registry.len(),
        "request manager stopped"
      );
    }
    drained
  }

  /// Stops the manager without waiting for requests in flight.
  pub fn should_stop(&self) -> bool {
    self.stop_and_join(Duration::ZERO)
  }

  fn running(&self) -> Result<Running, LifecycleError> {
    self.state.lock().running()
  }

  /// Registers `entry` under a fresh ticket. The state lock is held across
  /// the check and the registration, so nothing is admitted once
  /// `stop_and_join` has marked the manager stopped.
  fn admit(&self, entry: RegistryEntry) -> Result<(Running, Ticket), LifecycleError> {
    let state = self.state.lock();
    let running = state.running()?;
    let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
    self.registry.add(ticket, entry);
    Ok((running, ticket))
  }

  // --- Dispatch ---

  /// Admits `request` for background execution.
  ///
  /// The request's output is cached under `cache_key`. A cached value that
  /// satisfies `freshness` is delivered without running the request. The
  /// outcome goes to `listener` on the UI executor.
  ///
  /// Returns immediately. Fails if the manager is not started.
  pub fn execute<R: Request>(
    &self,
    request: Arc<R>,
    cache_key: impl Into<String>,
    freshness: impl Into<Freshness>,
    listener: Option<Arc<dyn RequestListener<R::Output>>>,
  ) -> Result<(), LifecycleError> {
    let cache_key = CacheKey::of::<R::Output>(cache_key);
    let freshness = freshness.into();

    let entry = RegistryEntry::new(
      RequestId::of(&request),
      cache_key.clone(),
      request.cancellation().clone(),
    );
    let (running, ticket) = self.admit(entry)?;
    tracing::debug!(%ticket, cache_key = %cache_key, ?freshness, "request admitted");

    if let Some(listener) = &listener {
      if self.registry.should_deliver(ticket) {
        let listener = listener.clone();
        let registry = self.registry.clone();
        running.ui.post(Box::new(move || {
          if registry.should_deliver(ticket) {
            listener.on_progress(RequestStatus::Pending);
          }
        }));
      }
    }

    let dispatch = Dispatch {
      ticket,
      retry: request.retry_policy().or(running.service.default_retry()),
      request,
      cache_key,
      freshness,
      listener,
      registry: self.registry.clone(),
      cache: running.service.cache().clone(),
      ui: running.ui.clone(),
    };
    let task = running
      .service
      .runner()
      .submit(Box::new(move |cancel: &CancellationFlag| dispatch.run(cancel)));
    self.registry.attach_task(ticket, task);
    Ok(())
  }

  // --- Cancellation ---

  /// Cancels `request`. Idempotent, and effective even if the request was
  /// never executed.
  ///
  /// Its listener will not hear about any outcome not yet delivered. A load
  /// already in progress is not interrupted.
  pub fn cancel<R: Request>(&self, request: &Arc<R>) {
    request.cancel();
    let registered = self.registry.mark_cancelled(RequestId::of(request));
    tracing::debug!(registered, "request cancelled");
  }

  /// Cancels every request currently admitted. Returns how many there were.
  pub fn cancel_all_requests(&self) -> usize {
    let cancelled = self.registry.mark_all_cancelled();
    tracing::debug!(cancelled, "all requests cancelled");
    cancelled
  }

  /// Keeps `request` running but stops notifying its listener. Returns
  /// `false` if the request is not pending in this manager.
  pub fn dont_notify_listeners_for_request<R: Request>(&self, request: &Arc<R>) -> bool {
    let found = self.registry.mark_suppressed(RequestId::of(request));
    tracing::debug!(found, "listener notifications suppressed for request");
    found
  }

  /// Stops notifying every listener, including those of requests admitted
  /// later. This cannot be undone.
  pub fn dont_notify_any_listeners(&self) {
    self.registry.mark_all_suppressed();
    tracing::debug!("listener notifications suppressed for all requests");
  }

  // --- Cache access ---

  fn cache(&self) -> Result<Arc<dyn CacheStore>, LifecycleError> {
    Ok(self.running()?.service.cache().clone())
  }

  /// Reads the cached value of type `T` under `cache_key`, whatever its age.
  pub fn get_from_cache<T>(&self, cache_key: &str) -> Result<Option<Arc<T>>, LifecycleError>
  where
    T: Any + Send + Sync,
  {
    self.get_from_cache_if_fresh(cache_key, Freshness::AlwaysReturned)
  }

  pub fn get_from_cache_if_fresh<T>(
    &self,
    cache_key: &str,
    freshness: impl Into<Freshness>,
  ) -> Result<Option<Arc<T>>, LifecycleError>
  where
    T: Any + Send + Sync,
  {
    let cached = self
      .cache()?
      .load_if_fresh(&CacheKey::of::<T>(cache_key), freshness.into());
    Ok(cached.and_then(|value| value.downcast::<T>().ok()))
  }

  /// Stores `value` under `cache_key`, as if a request had just loaded it.
  pub fn put_in_cache<T>(&self, cache_key: &str, value: T) -> Result<Arc<T>, LifecycleError>
  where
    T: Any + Send + Sync,
  {
    let cache = self.cache()?;
    let value = Arc::new(value);
    cache.save(CacheKey::of::<T>(cache_key), value.clone());
    Ok(value)
  }

  pub fn is_data_in_cache<T>(
    &self,
    cache_key: &str,
    freshness: impl Into<Freshness>,
  ) -> Result<bool, LifecycleError>
  where
    T: Any + Send + Sync,
  {
    Ok(self.get_from_cache_if_fresh::<T>(cache_key, freshness)?.is_some())
  }

  /// When the value of type `T` under `cache_key` was saved.
  pub fn get_date_of_data_in_cache<T>(&self, cache_key: &str) -> Result<Option<SystemTime>, LifecycleError>
  where
    T: Any + Send + Sync,
  {
    Ok(self.cache()?.saved_at(&CacheKey::of::<T>(cache_key)))
  }

  pub fn remove_data_from_cache<T>(&self, cache_key: &str) -> Result<bool, LifecycleError>
  where
    T: Any + Send + Sync,
  {
    Ok(self.cache()?.remove(&CacheKey::of::<T>(cache_key)))
  }

  pub fn remove_all_data_from_cache(&self) -> Result<(), LifecycleError> {
    self.cache()?.clear();
    Ok(())
  }

  // --- Diagnostics ---

  /// Number of admitted requests whose outcome is not settled yet.
  pub fn pending_requests(&self) -> usize {
    self.registry.len()
  }

  /// Describes the manager and every pending request, one per line. The
  /// same text is logged at `debug`.
  pub fn dump_state(&self) -> String {
    let mut dump = String::new();
    let _ = writeln!(
      dump,
      "RequestManager[service={}, state={}, suppress_all={}, pending={}]",
      self.config.service,
      self.state(),
      self.registry.is_suppressing_all(),
      self.registry.len()
    );
    for entry in self.registry.snapshot() {
      let _ = writeln!(
        dump,
        "  {} {} cancelled={} suppressed={} age={:?}",
        entry.ticket, entry.cache_key, entry.cancelled, entry.suppressed, entry.age
      );
    }
    tracing::debug!("{}", dump.trim_end());
    dump
  }
}

impl Drop for RequestManager {
  fn drop(&mut self) {
    if let State::Started(running) = &*self.state.lock() {
      if let Some(ui) = &running.own_ui {
        ui.shutdown();
      }
    }
  }
}

impl fmt::Debug for RequestManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RequestManager")
      .field("service", &self.config.service)
      .field("state", &self.state())
      .field("pending", &self.registry.len())
      .finish()
  }
}

/// Builder for [`RequestManager`].
pub struct ManagerBuilder {
  config: ManagerConfig,
  ui_executor: Option<Arc<dyn UiExecutor>>,
}

impl ManagerBuilder {
  pub fn new(service: impl Into<String>) -> Self {
    Self {
      config: ManagerConfig {
        service: service.into(),
        ..ManagerConfig::default()
      },
      ui_executor: None,
    }
  }

  /// Delivers listener callbacks on `executor` instead of a UI thread owned
  /// by the manager.
  pub fn ui_executor(mut self, executor: Arc<dyn UiExecutor>) -> Self {
    self.ui_executor = Some(executor);
    self
  }

  /// Names the UI thread the manager spawns when no executor is supplied.
  pub fn ui_thread_name(mut self, name: impl Into<String>) -> Self {
    self.config.ui_thread_name = name.into();
    self
  }

  pub fn build(self) -> RequestManager {
    RequestManager {
      config: self.config,
      ui_override: self.ui_executor,
      state: Mutex::new(State::New),
      registry: Arc::new(Registry::new()),
      next_ticket: AtomicU64::new(1),
    }
  }
}

impl fmt::Debug for ManagerBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManagerBuilder")
      .field("config", &self.config)
      .field("custom_ui_executor", &self.ui_executor.is_some())
      .finish()
  }
}

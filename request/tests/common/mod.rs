#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use fibre_host::HostContext;
use fibre_request::{
  CancellationFlag, LoadError, Request, RequestListener, RequestManager, RequestService, RequestStatus, RetryPolicy,
};
use parking_lot::{Condvar, Mutex};

pub const SERVICE: &str = "test-service";
pub const CACHE_KEY: &str = "12345";
pub const CACHE_KEY2: &str = "123456";
pub const DURATION: Duration = Duration::from_secs(1);
pub const TIMEOUT: Duration = Duration::from_secs(1);
pub const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

// --- Latch ---

/// A one-shot flag other threads can wait on.
#[derive(Default)]
pub struct Latch {
  set: Mutex<bool>,
  changed: Condvar,
}

impl Latch {
  pub fn release(&self) {
    *self.set.lock() = true;
    self.changed.notify_all();
  }

  pub fn is_released(&self) -> bool {
    *self.set.lock()
  }

  pub fn wait(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut set = self.set.lock();
    while !*set {
      if self.changed.wait_until(&mut set, deadline).timed_out() {
        return *set;
      }
    }
    true
  }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(5));
  }
  condition()
}

// --- Request stub ---

/// A request returning a canned result after an optional delay.
pub struct ContentRequestStub {
  result: Result<String, LoadError>,
  delay: Option<Duration>,
  retry: Option<RetryPolicy>,
  cancellation: CancellationFlag,
  load_started: Latch,
  load_finished: Latch,
  loads: AtomicUsize,
}

impl ContentRequestStub {
  fn with_result(result: Result<String, LoadError>) -> Self {
    Self {
      result,
      delay: None,
      retry: None,
      cancellation: CancellationFlag::new(),
      load_started: Latch::default(),
      load_finished: Latch::default(),
      loads: AtomicUsize::new(0),
    }
  }

  pub fn succeeding(value: &str) -> Self {
    Self::with_result(Ok(value.to_string()))
  }

  pub fn failing() -> Self {
    Self::with_result(Err(LoadError::network("stub failure")))
  }

  pub fn delayed(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn retrying(mut self, policy: RetryPolicy) -> Self {
    self.retry = Some(policy);
    self
  }

  pub fn shared(self) -> Arc<Self> {
    Arc::new(self)
  }

  pub fn is_load_data_from_network_called(&self) -> bool {
    self.load_started.is_released()
  }

  /// Waits until the network load has begun.
  pub fn await_load(&self, timeout: Duration) -> bool {
    self.load_started.wait(timeout)
  }

  /// Waits until the network load has returned.
  pub fn await_load_finished(&self, timeout: Duration) -> bool {
    self.load_finished.wait(timeout)
  }

  pub fn load_count(&self) -> usize {
    self.loads.load(Ordering::SeqCst)
  }
}

impl Request for ContentRequestStub {
  type Output = String;

  fn load_from_network(&self) -> Result<String, LoadError> {
    self.loads.fetch_add(1, Ordering::SeqCst);
    self.load_started.release();
    if let Some(delay) = self.delay {
      thread::sleep(delay);
    }
    self.load_finished.release();
    self.result.clone()
  }

  fn cancellation(&self) -> &CancellationFlag {
    &self.cancellation
  }

  fn retry_policy(&self) -> Option<RetryPolicy> {
    self.retry
  }
}

// --- Listener stub ---

/// Records the outcome it receives and the thread it was called on.
#[derive(Default)]
pub struct RequestListenerStub {
  outcome: Mutex<Option<Result<Arc<String>, LoadError>>>,
  thread: Mutex<Option<(ThreadId, Option<String>)>>,
  statuses: Mutex<Vec<RequestStatus>>,
  delivered: Latch,
  callbacks: AtomicUsize,
}

impl RequestListenerStub {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// `Some(true)` after a success, `Some(false)` after a failure, `None`
  /// while no outcome has been delivered.
  pub fn is_successful(&self) -> Option<bool> {
    self.outcome.lock().as_ref().map(|outcome| outcome.is_ok())
  }

  pub fn value(&self) -> Option<String> {
    match self.outcome.lock().as_ref() {
      Some(Ok(value)) => Some(value.to_string()),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<LoadError> {
    match self.outcome.lock().as_ref() {
      Some(Err(error)) => Some(error.clone()),
      _ => None,
    }
  }

  /// Waits for an outcome. Returns `false` if none arrived in time.
  pub fn await_outcome(&self, timeout: Duration) -> bool {
    self.delivered.wait(timeout)
  }

  pub fn thread_id(&self) -> Option<ThreadId> {
    self.thread.lock().as_ref().map(|(id, _)| *id)
  }

  pub fn thread_name(&self) -> Option<String> {
    self.thread.lock().as_ref().and_then(|(_, name)| name.clone())
  }

  pub fn statuses(&self) -> Vec<RequestStatus> {
    self.statuses.lock().clone()
  }

  pub fn callbacks(&self) -> usize {
    self.callbacks.load(Ordering::SeqCst)
  }

  pub fn as_listener(self: &Arc<Self>) -> Option<Arc<dyn RequestListener<String>>> {
    Some(self.clone() as Arc<dyn RequestListener<String>>)
  }

  fn record(&self, outcome: Result<Arc<String>, LoadError>) {
    let current = thread::current();
    *self.thread.lock() = Some((current.id(), current.name().map(str::to_owned)));
    *self.outcome.lock() = Some(outcome);
    self.callbacks.fetch_add(1, Ordering::SeqCst);
    self.delivered.release();
  }
}

impl RequestListener<String> for RequestListenerStub {
  fn on_success(&self, value: Arc<String>) {
    self.record(Ok(value));
  }

  fn on_failure(&self, error: LoadError) {
    self.record(Err(error));
  }

  fn on_progress(&self, status: RequestStatus) {
    self.statuses.lock().push(status);
  }
}

// --- Fixtures ---

/// A context with a four-worker service bound under [`SERVICE`].
pub fn context_with_service() -> (HostContext, Arc<RequestService>) {
  let context = HostContext::new("test-context");
  let service = RequestService::builder(SERVICE)
    .worker_threads(4)
    .thread_name_prefix("test-worker")
    .build()
    .unwrap()
    .bind(&context);
  (context, service)
}

/// A started manager over a fresh context.
pub fn started_manager() -> (RequestManager, HostContext, Arc<RequestService>) {
  init_tracing();
  let (context, service) = context_with_service();
  let manager = RequestManager::new(SERVICE);
  manager.start(&context).unwrap();
  (manager, context, service)
}

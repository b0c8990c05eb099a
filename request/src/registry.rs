//! Book-keeping for admitted requests: identity, cancellation and listener
//! suppression.

use crate::cache::CacheKey;
use crate::request::CancellationFlag;
use crate::runner::TaskHandle;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Object identity of a request: the address of its `Arc` allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RequestId(usize);

impl RequestId {
  pub(crate) fn of<R>(request: &Arc<R>) -> Self {
    RequestId(Arc::as_ptr(request) as *const () as usize)
  }
}

/// One admission of a request. The same request executed twice gets two
/// tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Ticket(pub(crate) u64);

impl fmt::Display for Ticket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

pub(crate) struct RegistryEntry {
  pub(crate) request: RequestId,
  pub(crate) cache_key: CacheKey,
  pub(crate) cancellation: CancellationFlag,
  pub(crate) task: Option<TaskHandle>,
  pub(crate) suppressed: bool,
  pub(crate) admitted_at: Instant,
}

impl RegistryEntry {
  pub(crate) fn new(request: RequestId, cache_key: CacheKey, cancellation: CancellationFlag) -> Self {
    Self {
      request,
      cache_key,
      cancellation,
      task: None,
      suppressed: false,
      admitted_at: Instant::now(),
    }
  }

  fn cancel(&self) {
    self.cancellation.cancel();
    if let Some(task) = &self.task {
      task.cancel();
    }
  }
}

/// A point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntrySnapshot {
  pub(crate) ticket: Ticket,
  pub(crate) cache_key: CacheKey,
  pub(crate) cancelled: bool,
  pub(crate) suppressed: bool,
  pub(crate) age: Duration,
}

#[derive(Default)]
struct RegistryInner {
  entries: HashMap<Ticket, RegistryEntry>,
  suppress_all: bool,
}

/// The set of admitted, undelivered requests.
///
/// All access is serialized by one mutex; `drained` is signalled whenever the
/// last entry is removed.
#[derive(Default)]
pub(crate) struct Registry {
  inner: Mutex<RegistryInner>,
  drained: Condvar,
}

impl Registry {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Registers an admission. Global suppression, if active, applies to it.
  pub(crate) fn add(&self, ticket: Ticket, mut entry: RegistryEntry) {
    let mut inner = self.inner.lock();
    entry.suppressed |= inner.suppress_all;
    inner.entries.insert(ticket, entry);
  }

  /// Attaches the worker task running `ticket`. If the entry was cancelled
  /// in the meantime the task is cancelled straight away.
  pub(crate) fn attach_task(&self, ticket: Ticket, task: TaskHandle) {
    let mut inner = self.inner.lock();
    if let Some(entry) = inner.entries.get_mut(&ticket) {
      if entry.cancellation.is_cancelled() {
        task.cancel();
      }
      entry.task = Some(task);
    }
  }

  /// Cancels every admission of `request`. Returns `true` if any was found.
  pub(crate) fn mark_cancelled(&self, request: RequestId) -> bool {
    let inner = self.inner.lock();
    let mut found = false;
    for entry in inner.entries.values().filter(|e| e.request == request) {
      entry.cancel();
      found = true;
    }
    found
  }

  /// Cancels every entry. Returns how many there were.
  pub(crate) fn mark_all_cancelled(&self) -> usize {
    let inner = self.inner.lock();
    for entry in inner.entries.values() {
      entry.cancel();
    }
    inner.entries.len()
  }

  /// Suppresses listener notifications for every admission of `request`.
  pub(crate) fn mark_suppressed(&self, request: RequestId) -> bool {
    let mut inner = self.inner.lock();
    let mut found = false;
    for entry in inner.entries.values_mut().filter(|e| e.request == request) {
      entry.suppressed = true;
      found = true;
    }
    found
  }

  /// Suppresses notifications for all current and future entries.
  pub(crate) fn mark_all_suppressed(&self) {
    let mut inner = self.inner.lock();
    inner.suppress_all = true;
    for entry in inner.entries.values_mut() {
      entry.suppressed = true;
    }
  }

  pub(crate) fn is_suppressing_all(&self) -> bool {
    self.inner.lock().suppress_all
  }

  /// Whether the listener of `ticket` may still be notified.
  pub(crate) fn should_deliver(&self, ticket: Ticket) -> bool {
    let inner = self.inner.lock();
    match inner.entries.get(&ticket) {
      Some(entry) => !inner.suppress_all && !entry.suppressed && !entry.cancellation.is_cancelled(),
      None => false,
    }
  }

  pub(crate) fn is_cancelled(&self, ticket: Ticket) -> bool {
    let inner = self.inner.lock();
    inner
      .entries
      .get(&ticket)
      .map_or(true, |entry| entry.cancellation.is_cancelled())
  }

  pub(crate) fn remove(&self, ticket: Ticket) -> Option<RegistryEntry> {
    let mut inner = self.inner.lock();
    let removed = inner.entries.remove(&ticket);
    if inner.entries.is_empty() {
      self.drained.notify_all();
    }
    removed
  }

  pub(crate) fn len(&self) -> usize {
    self.inner.lock().entries.len()
  }

  /// Entries ordered by admission.
  pub(crate) fn snapshot(&self) -> Vec<EntrySnapshot> {
    let inner = self.inner.lock();
    let mut entries: Vec<EntrySnapshot> = inner
      .entries
      .iter()
      .map(|(ticket, entry)| EntrySnapshot {
        ticket: *ticket,
        cache_key: entry.cache_key.clone(),
        cancelled: entry.cancellation.is_cancelled(),
        suppressed: entry.suppressed || inner.suppress_all,
        age: entry.admitted_at.elapsed(),
      })
      .collect();
    entries.sort_by_key(|e| e.ticket);
    entries
  }

  /// Blocks until the registry is empty or `timeout` has passed. Returns
  /// `true` if it emptied.
  pub(crate) fn wait_until_empty(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut inner = self.inner.lock();
    while !inner.entries.is_empty() {
      if self.drained.wait_until(&mut inner, deadline).timed_out() {
        return inner.entries.is_empty();
      }
    }
    true
  }
}

impl fmt::Debug for Registry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    f.debug_struct("Registry")
      .field("entries", &inner.entries.len())
      .field("suppress_all", &inner.suppress_all)
      .finish()
  }
}

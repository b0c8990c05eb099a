//! Delivery of listener callbacks on a single, serialized "UI" thread.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};

use fibre::mpsc;
use parking_lot::Mutex;

/// A callback to run on the UI thread.
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs callbacks on the thread designated for listener delivery.
///
/// Implementations must run posted tasks one at a time, in the order they were
/// posted from any single thread.
pub trait UiExecutor: Send + Sync {
  fn post(&self, task: UiTask);

  /// Returns `true` when called from the UI thread itself.
  fn is_ui_thread(&self) -> bool;
}

/// The default [`UiExecutor`]: one dedicated, named thread draining a bounded
/// channel.
///
/// The thread exits after [`shutdown`](UiThread::shutdown) (or drop) once the
/// tasks already posted have run.
pub struct UiThread {
  sender: Mutex<Option<mpsc::BoundedSender<UiTask>>>,
  thread_id: ThreadId,
  name: String,
}

impl UiThread {
  /// Capacity of the task channel. Posting blocks while it is full.
  const CHANNEL_CAPACITY: usize = 1024;

  pub fn spawn(name: impl Into<String>) -> io::Result<Self> {
    let name = name.into();
    let (tx, rx): (mpsc::BoundedSender<UiTask>, mpsc::BoundedReceiver<UiTask>) =
      mpsc::bounded(Self::CHANNEL_CAPACITY);

    let handle = thread::Builder::new().name(name.clone()).spawn(move || {
      // Ends when every sender is gone.
      while let Ok(task) = rx.recv() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
          tracing::warn!("a listener callback panicked on the UI thread");
        }
      }
    })?;

    Ok(Self {
      sender: Mutex::new(Some(tx)),
      thread_id: handle.thread().id(),
      name,
    })
  }

  pub fn thread_id(&self) -> ThreadId {
    self.thread_id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_running(&self) -> bool {
    self.sender.lock().is_some()
  }

  /// Stops accepting tasks. Does not wait for queued tasks to run.
  pub fn shutdown(&self) {
    if self.sender.lock().take().is_some() {
      tracing::debug!(thread = %self.name, "UI thread shutting down");
    }
  }
}

impl UiExecutor for UiThread {
  fn post(&self, task: UiTask) {
    // Clone out of the lock so a full channel never blocks `shutdown`.
    let sender = self.sender.lock().clone();
    match sender {
      Some(sender) => {
        if sender.send(task).is_err() {
          tracing::warn!(thread = %self.name, "UI thread is gone; dropping callback");
        }
      }
      None => tracing::trace!(thread = %self.name, "UI thread stopped; dropping callback"),
    }
  }

  fn is_ui_thread(&self) -> bool {
    thread::current().id() == self.thread_id
  }
}

impl Drop for UiThread {
  fn drop(&mut self) {
    self.shutdown();
  }
}

impl fmt::Debug for UiThread {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("UiThread")
      .field("name", &self.name)
      .field("running", &self.is_running())
      .finish()
  }
}

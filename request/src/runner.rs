//! Background execution of request jobs.

use crate::error::ConfigurationError;
use crate::request::CancellationFlag;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use fibre::mpmc;
use parking_lot::Mutex;

/// A unit of background work. It receives the cancellation flag of its own
/// task handle and is expected to check it cooperatively.
pub type Job = Box<dyn FnOnce(&CancellationFlag) + Send + 'static>;

/// A handle to a submitted job.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
  cancel: CancellationFlag,
  finished: Arc<AtomicBool>,
}

impl TaskHandle {
  pub fn new() -> Self {
    Self::default()
  }

  /// Asks the job to stop. A job that has not started yet still runs, but
  /// sees the flag set.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  pub fn is_finished(&self) -> bool {
    self.finished.load(Ordering::Acquire)
  }

  /// Runs `job` against this handle and marks it finished, even if the job
  /// panics.
  pub fn run(&self, job: Job) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| job(&self.cancel)));
    self.finished.store(true, Ordering::Release);
    if result.is_err() {
      tracing::warn!("background job panicked");
    }
  }
}

/// Executes jobs off the caller's thread.
pub trait BackgroundRunner: Send + Sync {
  /// Queues a job. Never blocks on the job itself.
  fn submit(&self, job: Job) -> TaskHandle;

  /// Stops accepting work and releases the runner's threads once queued jobs
  /// are done.
  fn shutdown(&self) {}
}

// --- Worker pool ---

struct QueuedJob {
  job: Job,
  handle: TaskHandle,
}

/// A fixed set of named worker threads sharing one FIFO job queue.
///
/// The queue is an unbounded `fibre::mpmc` channel. Every worker holds a clone
/// of the receiver; shutting down drops the sender, so workers drain what is
/// already queued and then exit.
pub struct WorkerPool {
  sender: Mutex<Option<mpmc::Sender<QueuedJob>>>,
  queued: Arc<AtomicUsize>,
  workers: Mutex<Vec<JoinHandle<()>>>,
  size: usize,
}

impl WorkerPool {
  /// Spawns `threads` workers named `{name_prefix}-{index}`.
  pub fn new(threads: usize, name_prefix: &str) -> Result<Self, ConfigurationError> {
    if threads == 0 {
      return Err(ConfigurationError::InvalidValue {
        field: "worker_threads",
        message: "a worker pool needs at least one thread".to_string(),
      });
    }

    let (tx, rx) = mpmc::unbounded::<QueuedJob>();
    let queued = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::with_capacity(threads);
    for index in 0..threads {
      let jobs = rx.clone();
      let waiting = queued.clone();
      let spawned = thread::Builder::new()
        .name(format!("{}-{}", name_prefix, index))
        .spawn(move || Self::work(jobs, &waiting));
      match spawned {
        Ok(handle) => workers.push(handle),
        // Returning drops `tx`, which releases the workers that did start.
        Err(e) => return Err(ConfigurationError::WorkerSpawn(e)),
      }
    }

    tracing::debug!(threads, name_prefix, "worker pool started");
    Ok(Self {
      sender: Mutex::new(Some(tx)),
      queued,
      workers: Mutex::new(workers),
      size: threads,
    })
  }

  /// Number of worker threads.
  pub fn size(&self) -> usize {
    self.size
  }

  /// Number of jobs waiting for a worker.
  pub fn queued(&self) -> usize {
    self.queued.load(Ordering::Acquire)
  }

  pub fn is_running(&self) -> bool {
    self.sender.lock().is_some()
  }

  /// The worker loop. Ends once the sender is gone and the queue is empty.
  fn work(jobs: mpmc::Receiver<QueuedJob>, queued: &AtomicUsize) {
    while let Ok(QueuedJob { job, handle }) = jobs.recv() {
      queued.fetch_sub(1, Ordering::AcqRel);
      handle.run(job);
    }
  }
}

impl BackgroundRunner for WorkerPool {
  fn submit(&self, job: Job) -> TaskHandle {
    let handle = TaskHandle::new();
    let rejected = match self.sender.lock().as_ref() {
      Some(sender) => {
        let queued = QueuedJob {
          job,
          handle: handle.clone(),
        };
        self.queued.fetch_add(1, Ordering::AcqRel);
        // Unbounded, so this only fails once every worker is gone.
        if sender.send(queued).is_err() {
          self.queued.fetch_sub(1, Ordering::AcqRel);
          tracing::error!("worker pool has no live workers; job dropped");
          handle.cancel();
        }
        None
      }
      None => Some(job),
    };

    if let Some(job) = rejected {
      tracing::warn!("job submitted to a stopped worker pool; running it as cancelled");
      handle.cancel();
      handle.run(job);
    }
    handle
  }

  fn shutdown(&self) {
    if self.sender.lock().take().is_some() {
      tracing::debug!(threads = self.size, "worker pool shutting down");
    }

    let current = thread::current().id();
    for worker in self.workers.lock().drain(..) {
      // A job that shuts its own pool down cannot join itself.
      if worker.thread().id() != current {
        let _ = worker.join();
      }
    }
  }
}

impl fmt::Debug for WorkerPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkerPool")
      .field("size", &self.size)
      .field("queued", &self.queued())
      .field("running", &self.is_running())
      .finish()
  }
}

// --- Tokio ---

/// Runs jobs on a Tokio runtime's blocking thread pool.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioRunner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioRunner {
  /// Creates a runner that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }
}

#[cfg(feature = "tokio")]
impl BackgroundRunner for TokioRunner {
  fn submit(&self, job: Job) -> TaskHandle {
    let handle = TaskHandle::new();
    let task = handle.clone();
    self.0.spawn_blocking(move || task.run(job));
    handle
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::mpsc;
  use std::time::Duration;

  #[test]
  fn pool_runs_jobs_on_named_workers() {
    let pool = WorkerPool::new(2, "pool-test").unwrap();
    let (tx, rx) = mpsc::channel();

    let handle = pool.submit(Box::new(move |_: &CancellationFlag| {
      tx.send(thread::current().name().map(str::to_owned)).unwrap();
    }));

    let name = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
    assert!(name.starts_with("pool-test-"));
    pool.shutdown();
    assert!(handle.is_finished());
  }

  #[test]
  fn pool_runs_jobs_concurrently() {
    let pool = WorkerPool::new(2, "pool-concurrent").unwrap();
    let (tx, rx) = mpsc::channel();

    let slow_tx = tx.clone();
    pool.submit(Box::new(move |_: &CancellationFlag| {
      thread::sleep(Duration::from_millis(500));
      slow_tx.send("slow").unwrap();
    }));
    pool.submit(Box::new(move |_: &CancellationFlag| tx.send("fast").unwrap()));

    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "fast");
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "slow");
  }

  #[test]
  fn cancelled_handle_is_visible_to_job() {
    let pool = WorkerPool::new(1, "pool-cancel").unwrap();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (tx, rx) = mpsc::channel();

    // Occupy the only worker so the second job is still queued when cancelled.
    pool.submit(Box::new(move |_: &CancellationFlag| {
      let _ = gate_rx.recv_timeout(Duration::from_secs(1));
    }));
    let handle = pool.submit(Box::new(move |cancel: &CancellationFlag| tx.send(cancel.is_cancelled()).unwrap()));
    handle.cancel();
    gate_tx.send(()).unwrap();

    assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
  }

  #[test]
  fn panicking_job_does_not_kill_worker() {
    let pool = WorkerPool::new(1, "pool-panic").unwrap();
    let (tx, rx) = mpsc::channel();

    let failed = pool.submit(Box::new(|_: &CancellationFlag| panic!("boom")));
    pool.submit(Box::new(move |_: &CancellationFlag| tx.send(()).unwrap()));

    rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(failed.is_finished());
  }

  #[test]
  fn shutdown_runs_queued_jobs_before_workers_exit() {
    let pool = WorkerPool::new(1, "pool-drain").unwrap();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let done = Arc::new(AtomicUsize::new(0));

    pool.submit(Box::new(move |_: &CancellationFlag| {
      started_tx.send(()).unwrap();
      let _ = gate_rx.recv_timeout(Duration::from_secs(1));
    }));
    started_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let handles: Vec<_> = (0..3)
      .map(|_| {
        let done = done.clone();
        pool.submit(Box::new(move |_: &CancellationFlag| {
          done.fetch_add(1, Ordering::SeqCst);
        }))
      })
      .collect();
    assert_eq!(pool.queued(), 3);

    gate_tx.send(()).unwrap();
    pool.shutdown();

    assert!(!pool.is_running());
    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert!(handles.iter().all(|handle| handle.is_finished() && !handle.is_cancelled()));
  }

  #[test]
  fn zero_threads_is_rejected() {
    assert!(matches!(
      WorkerPool::new(0, "none"),
      Err(ConfigurationError::InvalidValue { field: "worker_threads", .. })
    ));
  }

  #[test]
  fn submit_after_shutdown_runs_cancelled() {
    let pool = WorkerPool::new(1, "pool-stopped").unwrap();
    pool.shutdown();

    let (tx, rx) = mpsc::channel();
    let handle = pool.submit(Box::new(move |cancel: &CancellationFlag| tx.send(cancel.is_cancelled()).unwrap()));
    assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
    assert!(handle.is_finished());
  }
}

//! The path an admitted request takes on a worker: cache lookup, network
//! load, cache write, and delivery to its listener on the UI thread.

use crate::cache::{CacheKey, CacheStore};
use crate::error::LoadError;
use crate::listener::{RequestListener, RequestStatus};
use crate::registry::{Registry, Ticket};
use crate::request::{CancellationFlag, Request, RetryPolicy};
use crate::ui::UiExecutor;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// Everything a worker needs to carry one admission to its end.
pub(crate) struct Dispatch<R: Request> {
  pub(crate) ticket: Ticket,
  pub(crate) request: Arc<R>,
  pub(crate) cache_key: CacheKey,
  pub(crate) freshness: crate::cache::Freshness,
  pub(crate) listener: Option<Arc<dyn RequestListener<R::Output>>>,
  pub(crate) retry: Option<RetryPolicy>,
  pub(crate) registry: Arc<Registry>,
  pub(crate) cache: Arc<dyn CacheStore>,
  pub(crate) ui: Arc<dyn UiExecutor>,
}

impl<R: Request> Dispatch<R> {
  /// Runs the request to completion on the current (worker) thread.
  pub(crate) fn run(self, task: &CancellationFlag) {
    if self.cancelled(task) {
      tracing::debug!(ticket = %self.ticket, cache_key = %self.cache_key, "request cancelled before it started");
      self.registry.remove(self.ticket);
      return;
    }

    let outcome = match self.read_cache() {
      Some(value) => Ok(value),
      None => {
        self.progress(RequestStatus::LoadingFromNetwork);
        self.load(task).map(|value| {
          let value = Arc::new(value);
          self.progress(RequestStatus::WritingToCache);
          self.cache.save(self.cache_key.clone(), value.clone());
          value
        })
      }
    };

    self.deliver(outcome);
  }

  fn cancelled(&self, task: &CancellationFlag) -> bool {
    task.is_cancelled() || self.request.is_cancelled() || self.registry.is_cancelled(self.ticket)
  }

  fn read_cache(&self) -> Option<Arc<R::Output>> {
    if !self.freshness.reads_cache() {
      return None;
    }
    self.progress(RequestStatus::ReadingFromCache);
    let cached = self.cache.load_if_fresh(&self.cache_key, self.freshness)?;
    match cached.downcast::<R::Output>() {
      Ok(value) => {
        tracing::trace!(ticket = %self.ticket, cache_key = %self.cache_key, "served from cache");
        Some(value)
      }
      Err(_) => {
        tracing::warn!(cache_key = %self.cache_key, "cached value has an unexpected type; ignoring it");
        None
      }
    }
  }

  /// Calls `load_from_network`, retrying per the policy while not cancelled.
  fn load(&self, task: &CancellationFlag) -> Result<R::Output, LoadError> {
    let policy = self.retry.unwrap_or(RetryPolicy::NONE);
    let mut retry = 0;
    loop {
      tracing::trace!(ticket = %self.ticket, attempt = retry + 1, "loading from network");
      let result = panic::catch_unwind(AssertUnwindSafe(|| self.request.load_from_network()))
        .unwrap_or_else(|payload| Err(LoadError::Panicked(panic_message(payload))));

      match result {
        Ok(value) => return Ok(value),
        Err(error) if retry < policy.retry_count && !self.cancelled(task) => {
          let delay = policy.delay_before(retry);
          tracing::warn!(
            ticket = %self.ticket,
            cache_key = %self.cache_key,
            %error,
            retry = retry + 1,
            ?delay,
            "load failed; retrying"
          );
          thread::sleep(delay);
          retry += 1;
        }
        Err(error) => return Err(error),
      }
    }
  }

  fn progress(&self, status: RequestStatus) {
    let Some(listener) = self.listener.clone() else {
      return;
    };
    if !self.registry.should_deliver(self.ticket) {
      return;
    }
    let registry = self.registry.clone();
    let ticket = self.ticket;
    self.ui.post(Box::new(move || {
      if registry.should_deliver(ticket) {
        listener.on_progress(status);
      }
    }));
  }

  /// Hands the outcome to the listener on the UI thread, unless the request
  /// was cancelled or its listener suppressed. The entry leaves the registry
  /// once this is settled.
  fn deliver(self, outcome: Result<Arc<R::Output>, LoadError>) {
    let ticket = self.ticket;
    let listener = match self.listener {
      Some(listener) if self.registry.should_deliver(ticket) => listener,
      _ => {
        tracing::debug!(%ticket, cache_key = %self.cache_key, "outcome not delivered");
        self.registry.remove(ticket);
        return;
      }
    };

    let registry = self.registry;
    self.ui.post(Box::new(move || {
      let settled = Settled {
        registry: &registry,
        ticket,
      };
      // Cancellation or suppression may have landed while this was queued.
      if registry.should_deliver(ticket) {
        match outcome {
          Ok(value) => listener.on_success(value),
          Err(error) => listener.on_failure(error),
        }
        listener.on_progress(RequestStatus::Complete);
      } else {
        tracing::debug!(%ticket, "outcome dropped on the UI thread");
      }
      drop(settled);
    }));
  }
}

/// Removes a ticket from the registry when dropped, so an entry leaves even
/// if a listener callback unwinds.
struct Settled<'a> {
  registry: &'a Registry,
  ticket: Ticket,
}

impl Drop for Settled<'_> {
  fn drop(&mut self) {
    if thread::panicking() {
      tracing::warn!(ticket = %self.ticket, "listener panicked while receiving its outcome");
    }
    self.registry.remove(self.ticket);
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

//! The user-facing request contract and its cancellation and retry state.

use crate::error::LoadError;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A shared, idempotent cancellation signal.
///
/// Clones observe the same flag. Cancellation is cooperative: setting the
/// flag never interrupts code that is already running.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the flag. Returns `true` if this call is the one that set it.
  pub fn cancel(&self) -> bool {
    !self.0.swap(true, Ordering::AcqRel)
  }

  #[inline]
  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Acquire)
  }
}

/// How a failing network load is retried.
///
/// Attempt `n` (counting from one) waits `delay * backoff_multiplier^(n-1)`
/// before running again.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields, default))]
pub struct RetryPolicy {
  /// Number of retries after the first attempt.
  pub retry_count: u32,
  /// Delay before the first retry.
  #[cfg_attr(feature = "serde", serde(deserialize_with = "crate::config::de::duration"))]
  pub delay: Duration,
  pub backoff_multiplier: f32,
}

impl RetryPolicy {
  /// A policy that never retries.
  pub const NONE: RetryPolicy = RetryPolicy {
    retry_count: 0,
    delay: Duration::ZERO,
    backoff_multiplier: 1.0,
  };

  pub fn new(retry_count: u32, delay: Duration, backoff_multiplier: f32) -> Self {
    Self {
      retry_count,
      delay,
      backoff_multiplier,
    }
  }

  /// The delay to wait before retry number `retry` (starting at zero).
  pub fn delay_before(&self, retry: u32) -> Duration {
    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let factor = f64::from(self.backoff_multiplier.max(0.0)).powi(exponent);
    Duration::from_nanos((self.delay.as_nanos() as f64 * factor) as u64)
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      retry_count: 3,
      delay: Duration::from_millis(2500),
      backoff_multiplier: 1.0,
    }
  }
}

/// A unit of work the request manager runs off the caller's thread.
///
/// The request's result type is its `Output`; results are cached under the
/// pair `(Output, cache key)`. Implementors embed a [`CancellationFlag`] and
/// expose it through [`cancellation`](Request::cancellation), which lets the
/// manager cancel a request it only holds by `Arc`.
///
/// ```
/// use fibre_request::{CancellationFlag, LoadError, Request};
///
/// struct Weather {
///   city: String,
///   cancellation: CancellationFlag,
/// }
///
/// impl Request for Weather {
///   type Output = String;
///
///   fn load_from_network(&self) -> Result<String, LoadError> {
///     Ok(format!("sunny in {}", self.city))
///   }
///
///   fn cancellation(&self) -> &CancellationFlag {
///     &self.cancellation
///   }
/// }
/// ```
pub trait Request: Send + Sync + 'static {
  type Output: Send + Sync + 'static;

  /// Performs the load. Runs on a worker thread and may block it.
  fn load_from_network(&self) -> Result<Self::Output, LoadError>;

  fn cancellation(&self) -> &CancellationFlag;

  fn is_cancelled(&self) -> bool {
    self.cancellation().is_cancelled()
  }

  fn cancel(&self) {
    self.cancellation().cancel();
  }

  /// The retry policy for this request. `None` defers to the service default.
  fn retry_policy(&self) -> Option<RetryPolicy> {
    None
  }
}

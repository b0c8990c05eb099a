//! Typed cache keys, freshness windows and the cache store used to persist
//! request results.

use crate::error::ConfigurationError;

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use fibre_cache::{Cache, CacheBuilder};

/// A type-erased cached value. It is downcast back to the request's output
/// type when read.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Identifies a cached result by the type it holds and a caller-chosen key.
///
/// The same key string under two different output types names two different
/// entries.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  type_id: TypeId,
  type_name: &'static str,
  key: String,
}

impl CacheKey {
  /// Creates the key for values of type `T` stored under `key`.
  pub fn of<T: Any>(key: impl Into<String>) -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      key: key.into(),
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  pub fn type_name(&self) -> &'static str {
    self.type_name
  }
}

impl fmt::Debug for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "CacheKey({}, {:?})", self.type_name, self.key)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.type_name, self.key)
  }
}

/// How old a cached value may be and still satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
  /// Cached values are never used; the request always goes to the network.
  AlwaysExpired,
  /// Any cached value is used, whatever its age.
  AlwaysReturned,
  /// Cached values younger than the duration are used.
  Within(Duration),
}

impl Freshness {
  pub const ONE_SECOND: Freshness = Freshness::Within(Duration::from_secs(1));
  pub const ONE_MINUTE: Freshness = Freshness::Within(Duration::from_secs(60));
  pub const ONE_HOUR: Freshness = Freshness::Within(Duration::from_secs(60 * 60));
  pub const ONE_DAY: Freshness = Freshness::Within(Duration::from_secs(24 * 60 * 60));
  pub const ONE_WEEK: Freshness = Freshness::Within(Duration::from_secs(7 * 24 * 60 * 60));

  /// Returns `true` if a value of the given age satisfies this window.
  #[inline]
  pub fn accepts(&self, age: Duration) -> bool {
    match self {
      Freshness::AlwaysExpired => false,
      Freshness::AlwaysReturned => true,
      Freshness::Within(max_age) => age < *max_age,
    }
  }

  /// Returns `true` if the cache should be consulted at all.
  #[inline]
  pub fn reads_cache(&self) -> bool {
    !matches!(self, Freshness::AlwaysExpired)
  }
}

impl From<Duration> for Freshness {
  fn from(max_age: Duration) -> Self {
    Freshness::Within(max_age)
  }
}

/// Storage for request results, keyed by [`CacheKey`].
///
/// Implementations must be safe for concurrent reads and writes from the
/// worker threads and the caller's thread.
pub trait CacheStore: Send + Sync {
  /// Returns the value stored under `key` if its age satisfies `freshness`.
  fn load_if_fresh(&self, key: &CacheKey, freshness: Freshness) -> Option<CachedValue>;

  /// Stores `value` under `key`, replacing any previous value and resetting
  /// its age.
  fn save(&self, key: CacheKey, value: CachedValue);

  /// The wall-clock time the value under `key` was saved, if present.
  fn saved_at(&self, key: &CacheKey) -> Option<SystemTime>;

  /// Removes the value under `key`. Returns `true` if one was present.
  fn remove(&self, key: &CacheKey) -> bool;

  /// Removes every stored value.
  fn clear(&self);
}

/// A stored value with the instants needed to compute its age.
struct StoredEntry {
  value: CachedValue,
  // Monotonic; used for freshness checks.
  stored: Instant,
  // Wall clock; reported to callers.
  saved_at: SystemTime,
}

/// An in-memory [`CacheStore`] backed by a concurrent `fibre_cache::Cache`.
///
/// Freshness is decided per read, so entries are not expired by the store
/// itself; a bounded store evicts by its own policy once over capacity.
pub struct MemoryCacheStore {
  entries: Cache<CacheKey, StoredEntry>,
}

impl MemoryCacheStore {
  /// Creates an unbounded store.
  pub fn new() -> Result<Self, ConfigurationError> {
    Self::build(CacheBuilder::default().unbounded())
  }

  /// Creates a store holding at most `capacity` entries.
  pub fn with_capacity(capacity: u64) -> Result<Self, ConfigurationError> {
    if capacity == 0 {
      return Err(ConfigurationError::InvalidValue {
        field: "cache_capacity",
        message: "a bounded cache store needs a capacity above zero".to_string(),
      });
    }
    Self::build(CacheBuilder::default().capacity(capacity))
  }

  fn build(builder: CacheBuilder<CacheKey, StoredEntry>) -> Result<Self, ConfigurationError> {
    let entries = builder
      .build()
      .map_err(|e| ConfigurationError::CacheBuild(e.to_string()))?;
    Ok(Self { entries })
  }
}

impl CacheStore for MemoryCacheStore {
  fn load_if_fresh(&self, key: &CacheKey, freshness: Freshness) -> Option<CachedValue> {
    if !freshness.reads_cache() {
      return None;
    }
    let entry = self.entries.fetch(key)?;
    if freshness.accepts(entry.stored.elapsed()) {
      Some(entry.value.clone())
    } else {
      None
    }
  }

  fn save(&self, key: CacheKey, value: CachedValue) {
    let entry = StoredEntry {
      value,
      stored: Instant::now(),
      saved_at: SystemTime::now(),
    };
    self.entries.insert(key, entry, 1);
  }

  fn saved_at(&self, key: &CacheKey) -> Option<SystemTime> {
    self.entries.fetch(key).map(|entry| entry.saved_at)
  }

  fn remove(&self, key: &CacheKey) -> bool {
    self.entries.invalidate(key)
  }

  fn clear(&self) {
    self.entries.clear();
  }
}

impl fmt::Debug for MemoryCacheStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryCacheStore").finish_non_exhaustive()
  }
}

//! The `HostContext` and its binding and resolution methods.

use crate::binding::{BindingKey, ErasedValue, Provider};
use crate::error::ResolveError;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

/// A named set of service bindings that components are started from.
///
/// The context is thread-safe. Bindings can be added or removed at any time;
/// a component only sees what was bound when it resolves.
pub struct HostContext {
  name: String,
  bindings: DashMap<BindingKey, Provider>,
}

impl HostContext {
  /// Creates an empty context. The name only appears in diagnostics.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      bindings: DashMap::new(),
    }
  }

  /// The context's diagnostic name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Number of bindings currently registered.
  pub fn len(&self) -> usize {
    self.bindings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bindings.is_empty()
  }

  // --- Binding ---

  /// Binds an already-built value. Replaces any previous binding under the
  /// same type and name.
  pub fn bind_instance<T: Any + Send + Sync>(&self, name: Option<&str>, instance: T) {
    self.bind_arc(name, Arc::new(instance));
  }

  /// Binds a shared value, so the caller can keep its own handle to it.
  pub fn bind_arc<T: ?Sized + Any + Send + Sync>(&self, name: Option<&str>, instance: Arc<T>) {
    let key = BindingKey::of::<T>(name);
    tracing::trace!(context = %self.name, binding = ?key, "binding instance");
    let value: ErasedValue = Box::new(instance);
    self.bindings.insert(key, Provider::Instance(value));
  }

  /// Binds a factory that is run on first resolution; later resolutions
  /// share the same value.
  pub fn bind_singleton<T: Any + Send + Sync>(
    &self,
    name: Option<&str>,
    factory: impl Fn() -> T + Send + Sync + 'static,
  ) {
    let key = BindingKey::of::<T>(name);
    tracing::trace!(context = %self.name, binding = ?key, "binding singleton");
    self.bindings.insert(
      key,
      Provider::Lazy {
        cell: OnceCell::new(),
        factory: Box::new(move || Box::new(Arc::new(factory()))),
      },
    );
  }

  /// Binds a lazily-built trait object, resolved as `Arc<I>`.
  pub fn bind_trait<I: ?Sized + Any + Send + Sync>(
    &self,
    name: Option<&str>,
    factory: impl Fn() -> Arc<I> + Send + Sync + 'static,
  ) {
    let key = BindingKey::of::<I>(name);
    tracing::trace!(context = %self.name, binding = ?key, "binding trait");
    self.bindings.insert(
      key,
      Provider::Lazy {
        cell: OnceCell::new(),
        factory: Box::new(move || Box::new(factory())),
      },
    );
  }

  /// Removes a binding. Returns `true` if one was present. Values already
  /// handed out stay alive through their `Arc`s.
  pub fn unbind<T: ?Sized + Any + Send + Sync>(&self, name: Option<&str>) -> bool {
    self.bindings.remove(&BindingKey::of::<T>(name)).is_some()
  }

  pub fn is_bound<T: ?Sized + Any + Send + Sync>(&self, name: Option<&str>) -> bool {
    self.bindings.contains_key(&BindingKey::of::<T>(name))
  }

  // --- Resolution ---

  /// Resolves a binding by type and name.
  pub fn resolve<T: ?Sized + Any + Send + Sync>(
    &self,
    name: Option<&str>,
  ) -> Result<Arc<T>, ResolveError> {
    let key = BindingKey::of::<T>(name);
    let provider = self.bindings.get(&key).ok_or_else(|| key.not_bound())?;

    provider
      .get_or_build(&key)?
      .downcast_ref::<Arc<T>>()
      .cloned()
      .ok_or_else(|| key.not_bound())
  }

  /// Like [`resolve`](Self::resolve), but discards the reason for a failure.
  pub fn lookup<T: ?Sized + Any + Send + Sync>(&self, name: Option<&str>) -> Option<Arc<T>> {
    self.resolve(name).ok()
  }
}

impl fmt::Debug for HostContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HostContext")
      .field("name", &self.name)
      .field("bindings", &self.bindings.len())
      .finish()
  }
}

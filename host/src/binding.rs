//! Internal binding keys, providers and the per-thread resolution guard.

use crate::error::ResolveError;

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;

use once_cell::sync::OnceCell;

thread_local! {
  // Keys whose factories are running on this thread. Re-entering one of them
  // means a factory depends on itself.
  static RESOLVING: RefCell<HashSet<BindingKey>> = RefCell::new(HashSet::new());
}

pub(crate) type ErasedValue = Box<dyn Any + Send + Sync>;
pub(crate) type ErasedFactory = Box<dyn Fn() -> ErasedValue + Send + Sync>;

/// Identifies a binding by the bound type and an optional name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct BindingKey {
  pub(crate) type_id: TypeId,
  pub(crate) type_name: &'static str,
  pub(crate) name: Option<String>,
}

impl BindingKey {
  pub(crate) fn of<T: ?Sized + Any>(name: Option<&str>) -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      name: name.map(str::to_owned),
    }
  }

  pub(crate) fn not_bound(&self) -> ResolveError {
    ResolveError::NotBound {
      type_name: self.type_name,
      name: self.name.clone(),
    }
  }
}

impl fmt::Debug for BindingKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "Binding({}, '{}')", self.type_name, name),
      None => write!(f, "Binding({})", self.type_name),
    }
  }
}

/// RAII marker for a key whose factory is running on the current thread.
pub(crate) struct ResolutionGuard {
  key: BindingKey,
}

impl ResolutionGuard {
  /// Marks `key` as resolving, or reports a cycle if it already is.
  pub(crate) fn enter(key: &BindingKey) -> Result<Self, ResolveError> {
    let inserted = RESOLVING.with(|resolving| resolving.borrow_mut().insert(key.clone()));
    if !inserted {
      return Err(ResolveError::Circular {
        type_name: key.type_name,
        name: key.name.clone(),
      });
    }
    Ok(Self { key: key.clone() })
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING.with(|resolving| {
      resolving.borrow_mut().remove(&self.key);
    });
  }
}

/// How a binding produces its value. The stored value is always an
/// `Arc<T>` boxed as `Any`, so resolution is a downcast plus an `Arc` clone.
pub(crate) enum Provider {
  Instance(ErasedValue),
  Lazy {
    cell: OnceCell<ErasedValue>,
    factory: ErasedFactory,
  },
}

impl Provider {
  /// Returns the stored value, building it first for a lazy binding.
  pub(crate) fn get_or_build(&self, key: &BindingKey) -> Result<&ErasedValue, ResolveError> {
    match self {
      Provider::Instance(value) => Ok(value),
      Provider::Lazy { cell, factory } => {
        if let Some(value) = cell.get() {
          return Ok(value);
        }
        let _guard = ResolutionGuard::enter(key)?;
        Ok(cell.get_or_init(factory))
      }
    }
  }
}

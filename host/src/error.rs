use thiserror::Error;

/// Errors returned when a binding cannot be resolved from a [`HostContext`].
///
/// [`HostContext`]: crate::HostContext
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  /// Nothing is bound under the requested type and name.
  #[error("no binding for {type_name}{} in context", display_name(.name))]
  NotBound {
    type_name: &'static str,
    name: Option<String>,
  },

  /// A singleton factory tried to resolve a binding that was already being
  /// resolved on the same thread.
  #[error("circular resolution of {type_name}{}", display_name(.name))]
  Circular {
    type_name: &'static str,
    name: Option<String>,
  },
}

fn display_name(name: &Option<String>) -> String {
  match name {
    Some(name) => format!(" named '{}'", name),
    None => String::new(),
  }
}

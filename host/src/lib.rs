//! # Fibre Host
//!
//! A thread-safe host context holding named service bindings.
//!
//! A [`HostContext`] plays the part of the environment a component is started
//! in: it is handed to a component's `start` method, and the component
//! resolves the services it needs from it. A context that lacks a required
//! binding is reported as a [`ResolveError`], never a panic, so that callers
//! can surface it as a configuration failure.
//!
//! ## Core Concepts
//!
//! - **Binding**: a value registered under its type and an optional name.
//! - **Singleton**: a binding built lazily by a factory, at most once.
//! - **Trait binding**: a binding registered and resolved as `Arc<dyn Trait>`.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_host::HostContext;
//! use std::sync::Arc;
//!
//! trait Clock: Send + Sync {
//!   fn now(&self) -> u64;
//! }
//!
//! struct FixedClock(u64);
//!
//! impl Clock for FixedClock {
//!   fn now(&self) -> u64 {
//!     self.0
//!   }
//! }
//!
//! let context = HostContext::new("app");
//! context.bind_instance(Some("greeting"), String::from("hello"));
//! context.bind_trait::<dyn Clock>(None, || Arc::new(FixedClock(42)));
//!
//! let greeting = context.resolve::<String>(Some("greeting")).unwrap();
//! assert_eq!(*greeting, "hello");
//! assert_eq!(context.resolve::<dyn Clock>(None).unwrap().now(), 42);
//! assert!(context.resolve::<u32>(None).is_err());
//! ```

mod binding;
mod context;
mod error;

pub use context::HostContext;
pub use error::ResolveError;

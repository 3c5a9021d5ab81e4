//! Reactive Core
//!
//! This module implements dependency tracking between observable data and
//! the computations that read it.
//!
//! # Concepts
//!
//! ## Observable stores
//!
//! An [`Observable`] wraps a plain [`Object`]. Reading one of its properties
//! while a watcher is evaluating registers the watcher as a dependent of that
//! property; writing the property marks every dependent dirty.
//!
//! ## Deps
//!
//! Each observable property owns a `Dep`, the set of watchers that read it
//! during their latest evaluation.
//!
//! ## Watchers
//!
//! A watcher is a unit of reactive computation (a directive update, a
//! computed property, a user watch). Eager watchers are queued on the
//! scheduler when dirty; lazy ones recompute when next read.
//!
//! # Implementation Notes
//!
//! Tracking uses a stack of evaluation frames owned by the runtime rather
//! than thread-local state, so separate runtimes never observe each other.

pub(crate) mod context;
mod dep;
mod store;
mod value;
pub(crate) mod watcher;

pub use store::Observable;
pub use value::{Object, Value};
pub use watcher::WatcherId;

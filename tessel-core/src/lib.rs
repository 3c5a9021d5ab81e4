//! Tessel Core
//!
//! This crate provides the reactive update core of the Tessel component
//! framework. It implements:
//!
//! - Observable data with dependency tracking
//! - Watchers and a batched, ordered update scheduler
//! - Directive binding on host UI nodes
//! - Component instances and their lifecycle
//! - Conditional and list blocks
//!
//! The UI tree itself is a capability the embedder provides through the
//! [`Host`] trait; [`MemoryHost`] is a headless implementation.
//!
//! # Architecture
//!
//! - `reactive`: observable store, deps, watchers and the tracking context
//! - `scheduler`: the dirty-watcher queue and the tick driver
//! - `render`: compiled templates and the build/link renderer
//! - `directive`: directive binding engine and built-in directives
//! - `control`: conditional and repeat blocks
//! - `component`: component options, instances and lifecycle
//! - `dom`: the UI-tree capability
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use tessel_core::{ComponentOptions, Expr, MemoryHost, Object, Runtime, Template};
//!
//! let host = Rc::new(MemoryHost::new());
//! let rt = Runtime::new(host.clone());
//! let el = host.attach_element("div");
//!
//! let app = rt.mount(
//!     ComponentOptions::new("greeting")
//!         .data(Object::new().with("name", "world"))
//!         .template(vec![
//!             Template::text("hello "),
//!             Template::interpolate(Expr::path("name")),
//!         ]),
//!     el,
//! );
//! assert_eq!(host.text_content(el), "hello world");
//!
//! // Writes are batched until the next tick.
//! rt.set(app, "name", "tessel").unwrap();
//! assert_eq!(host.text_content(el), "hello world");
//! rt.tick();
//! assert_eq!(host.text_content(el), "hello tessel");
//! ```

pub mod component;
pub mod config;
mod control;
pub mod directive;
pub mod dom;
pub mod error;
pub mod reactive;
pub mod render;
mod runtime;
pub mod scheduler;

pub use component::{ComponentId, ComponentOptions, LifecycleHook, LifecycleState};
pub use config::RuntimeConfig;
pub use directive::{Directive, DirectiveContext, DirectiveId};
pub use dom::{Host, MemoryHost, Namespace, NodeId};
pub use error::{Error, EvalError, Result};
pub use reactive::{Observable, Object, Value, WatcherId};
pub use render::{DirectiveSpec, Expr, Scope, Template};
pub use runtime::{Runtime, RuntimeBuilder, WeakRuntime};
pub use scheduler::{CountingTick, Defer, ManualTick};

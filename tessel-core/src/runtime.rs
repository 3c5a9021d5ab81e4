//! Runtime
//!
//! The runtime is the top-level context that owns every piece of mutable
//! state the reactive core needs:
//!
//! - the tracking stack (which watcher is evaluating),
//! - the watcher arena,
//! - the update scheduler queue,
//! - the component instance and directive arenas,
//! - the diagnostic channel.
//!
//! Nothing here is global. Each [`Runtime`] is fully isolated, so tests and
//! embedders can run several side by side. Execution is single-threaded and
//! cooperative, which is why the state lives in `RefCell`s rather than locks.
//!
//! Observable stores hold a [`WeakRuntime`] back to their runtime, so
//! components and their data never keep the runtime alive on their own.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::error;

use crate::component::{ComponentId, ComponentOptions, Instance};
use crate::config::RuntimeConfig;
use crate::directive::{DirectiveBinding, DirectiveFactory, DirectiveId};
use crate::dom::Host;
use crate::error::Error;
use crate::reactive::watcher::Watcher;
use crate::reactive::WatcherId;
use crate::reactive::context::Tracker;
use crate::scheduler::{Defer, ManualTick, UpdateScheduler};

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) host: Rc<dyn Host>,
    pub(crate) defer: Rc<dyn Defer>,
    pub(crate) tracker: RefCell<Tracker>,
    pub(crate) watchers: RefCell<HashMap<WatcherId, Rc<Watcher>>>,
    pub(crate) scheduler: RefCell<UpdateScheduler>,
    pub(crate) components: RefCell<HashMap<ComponentId, Rc<Instance>>>,
    pub(crate) directives: RefCell<HashMap<DirectiveId, Rc<DirectiveBinding>>>,
    pub(crate) registry: RefCell<IndexMap<String, Rc<ComponentOptions>>>,
    pub(crate) directive_registry: RefCell<IndexMap<String, DirectiveFactory>>,
    /// Nesting depth of destroy calls; the arena is swept when it returns
    /// to zero.
    pub(crate) destroy_depth: Cell<usize>,
    pub(crate) diagnostics: RefCell<Vec<Error>>,
    pub(crate) next_watcher: Cell<u64>,
    pub(crate) next_component: Cell<u64>,
    pub(crate) next_directive: Cell<u64>,
}

/// Handle to a reactive runtime. Cloning is cheap and shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

/// Non-owning handle to a runtime.
#[derive(Clone, Default)]
pub struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    host: Rc<dyn Host>,
    config: RuntimeConfig,
    defer: Rc<dyn Defer>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the driver that schedules deferred ticks.
    pub fn defer(mut self, defer: Rc<dyn Defer>) -> Self {
        self.defer = defer;
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            inner: Rc::new(RuntimeInner {
                config: self.config,
                host: self.host,
                defer: self.defer,
                tracker: RefCell::new(Tracker::default()),
                watchers: RefCell::new(HashMap::new()),
                scheduler: RefCell::new(UpdateScheduler::new()),
                components: RefCell::new(HashMap::new()),
                directives: RefCell::new(HashMap::new()),
                registry: RefCell::new(IndexMap::new()),
                directive_registry: RefCell::new(IndexMap::new()),
                destroy_depth: Cell::new(0),
                diagnostics: RefCell::new(Vec::new()),
                next_watcher: Cell::new(0),
                next_component: Cell::new(0),
                next_directive: Cell::new(0),
            }),
        }
    }
}

impl Runtime {
    /// Create a runtime with the default configuration and a manual tick
    /// driver.
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self::builder(host).build()
    }

    pub fn builder(host: Rc<dyn Host>) -> RuntimeBuilder {
        RuntimeBuilder {
            host,
            config: RuntimeConfig::default(),
            defer: Rc::new(ManualTick),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The UI-tree capability this runtime drives.
    pub fn host(&self) -> Rc<dyn Host> {
        Rc::clone(&self.inner.host)
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    /// Report an error on the diagnostic channel.
    pub(crate) fn report(&self, err: Error) {
        error!(error = %err, "runtime diagnostic");
        self.inner.diagnostics.borrow_mut().push(err);
    }

    /// Drain the diagnostics reported since the last call.
    pub fn take_diagnostics(&self) -> Vec<Error> {
        std::mem::take(&mut *self.inner.diagnostics.borrow_mut())
    }

    /// Number of live watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("watchers", &self.inner.watchers.borrow().len())
            .field("components", &self.inner.components.borrow().len())
            .field("queued", &self.inner.scheduler.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryHost;
    use crate::reactive::{Object, Observable};

    #[test]
    fn runtimes_are_isolated() {
        let a = Runtime::new(Rc::new(MemoryHost::new()));
        let b = Runtime::new(Rc::new(MemoryHost::new()));
        let store = Observable::wrap(&a, Object::new().with("n", 1));
        store.set("n", 2);
        assert_eq!(a.watcher_count(), 0);
        assert!(!b.is_tick_pending());
    }

    #[test]
    fn weak_handle_does_not_keep_runtime_alive() {
        let rt = Runtime::new(Rc::new(MemoryHost::new()));
        let weak = rt.downgrade();
        assert!(weak.upgrade().is_some());
        drop(rt);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn diagnostics_drain() {
        let rt = Runtime::new(Rc::new(MemoryHost::new()));
        rt.report(Error::UnknownComponent("ghost".into()));
        assert_eq!(rt.take_diagnostics().len(), 1);
        assert!(rt.take_diagnostics().is_empty());
    }
}

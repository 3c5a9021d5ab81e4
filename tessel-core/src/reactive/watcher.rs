//! Watchers
//!
//! A watcher is a unit of reactive computation: a directive update, a
//! computed property, or a user watch. It owns a getter that is evaluated
//! inside a tracking frame, the value that getter produced last time, and
//! the set of deps it read while producing it.
//!
//! # Lifecycle
//!
//! 1. Created when a directive, computed property or watch is bound. Eager
//!    watchers evaluate immediately; lazy (computed) ones wait for a read.
//! 2. When a dep it read is written, it is marked dirty. Eager watchers are
//!    queued on the scheduler, lazy ones just flip their dirty flag.
//! 3. On re-evaluation the old edges are dropped first, so the dep set is
//!    exactly what the latest evaluation read.
//! 4. Teardown removes it from every dep. Teardown is idempotent.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::trace;

use super::context::{DepList, TrackingGuard};
use super::dep::Dep;
use super::value::Value;
use crate::component::ComponentId;
use crate::error::{Error, EvalError};
use crate::render::{Expr, Scope};
use crate::runtime::Runtime;

/// Identity of a watcher.
///
/// IDs are handed out in creation order per runtime. The scheduler flushes
/// in ascending ID order, which is what makes a parent's watchers run before
/// its children's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

pub(crate) type Getter = Box<dyn Fn(&Runtime) -> Result<Value, EvalError>>;
pub(crate) type Callback = Box<dyn Fn(&Runtime, &Value, &Value)>;

pub(crate) struct Watcher {
    pub(crate) id: WatcherId,
    pub(crate) owner: Option<ComponentId>,
    pub(crate) label: String,
    getter: Getter,
    callback: Option<Callback>,
    /// Computed watchers evaluate on read instead of through the scheduler.
    pub(crate) lazy: bool,
    pub(crate) dirty: Cell<bool>,
    pub(crate) value: RefCell<Value>,
    pub(crate) deps: RefCell<DepList>,
    pub(crate) active: Cell<bool>,
    pub(crate) runs: Cell<u64>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("owner", &self.owner)
            .field("lazy", &self.lazy)
            .field("dirty", &self.dirty.get())
            .field("active", &self.active.get())
            .field("dependency_count", &self.deps.borrow().len())
            .finish()
    }
}

/// Everything needed to create a watcher.
pub(crate) struct WatcherSpec {
    pub owner: Option<ComponentId>,
    pub label: String,
    pub getter: Getter,
    pub callback: Option<Callback>,
    pub lazy: bool,
}

impl WatcherSpec {
    pub(crate) fn new(
        owner: Option<ComponentId>,
        label: impl Into<String>,
        getter: impl Fn(&Runtime) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Self {
            owner,
            label: label.into(),
            getter: Box::new(getter),
            callback: None,
            lazy: false,
        }
    }

    pub(crate) fn callback(mut self, callback: impl Fn(&Runtime, &Value, &Value) + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub(crate) fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

impl Runtime {
    pub(crate) fn next_watcher_id(&self) -> WatcherId {
        let raw = self.inner.next_watcher.get();
        self.inner.next_watcher.set(raw + 1);
        WatcherId(raw)
    }

    pub(crate) fn watcher(&self, id: WatcherId) -> Option<Rc<Watcher>> {
        self.inner.watchers.borrow().get(&id).cloned()
    }

    /// Create a watcher with a fresh ID.
    pub(crate) fn create_watcher(&self, spec: WatcherSpec) -> WatcherId {
        let id = self.next_watcher_id();
        self.create_watcher_with_id(id, spec);
        id
    }

    /// Create a watcher under a previously reserved ID. Eager watchers are
    /// evaluated right away to collect their initial deps.
    pub(crate) fn create_watcher_with_id(&self, id: WatcherId, spec: WatcherSpec) {
        let watcher = Rc::new(Watcher {
            id,
            owner: spec.owner,
            label: spec.label,
            getter: spec.getter,
            callback: spec.callback,
            lazy: spec.lazy,
            dirty: Cell::new(spec.lazy),
            value: RefCell::new(Value::Null),
            deps: RefCell::new(SmallVec::new()),
            active: Cell::new(true),
            runs: Cell::new(0),
        });
        self.inner
            .watchers
            .borrow_mut()
            .insert(id, Rc::clone(&watcher));
        trace!(watcher = %id, label = %watcher.label, lazy = watcher.lazy, "watcher created");

        if !watcher.lazy {
            if let Err(err) = self.evaluate(&watcher) {
                self.report(err);
            }
        }
    }

    /// Evaluate a watcher inside a fresh tracking frame.
    ///
    /// Previous edges are removed before the getter runs. Returns whether
    /// the value changed. A failing getter leaves the old value in place,
    /// keeps the deps it managed to read, and marks the watcher clean.
    pub(crate) fn evaluate(&self, watcher: &Watcher) -> Result<bool, Error> {
        let stale = std::mem::take(&mut *watcher.deps.borrow_mut());
        for dep in &stale {
            dep.remove_subscriber(watcher.id);
        }

        let guard = TrackingGuard::enter(self, Some(watcher.id));
        let result = (watcher.getter)(self);
        let deps = guard.finish();

        *watcher.deps.borrow_mut() = deps;
        watcher.dirty.set(false);
        watcher.runs.set(watcher.runs.get() + 1);

        match result {
            Ok(value) => {
                let changed = *watcher.value.borrow() != value;
                if changed {
                    *watcher.value.borrow_mut() = value;
                }
                Ok(changed)
            }
            Err(source) => Err(Error::Evaluation {
                watcher: watcher.label.clone(),
                component: self.component_name(watcher.owner),
                source,
            }),
        }
    }

    /// Re-evaluate a queued watcher and fire its callback when the value
    /// changed. Returns whether the watcher actually ran.
    pub(crate) fn run_watcher(&self, id: WatcherId) -> bool {
        let Some(watcher) = self.watcher(id) else {
            return false;
        };
        if !watcher.active.get() {
            return false;
        }

        let old = watcher.value.borrow().clone();
        match self.evaluate(&watcher) {
            Ok(true) => {
                if let Some(callback) = &watcher.callback {
                    let new = watcher.value.borrow().clone();
                    self.untracked(|| callback(self, &new, &old));
                }
            }
            Ok(false) => {}
            Err(err) => self.report(err),
        }
        true
    }

    /// Tear down a watcher: drop it from every dep and from the arena.
    /// Safe to call any number of times.
    pub(crate) fn teardown_watcher(&self, id: WatcherId) {
        let Some(watcher) = self.inner.watchers.borrow_mut().remove(&id) else {
            return;
        };
        watcher.active.set(false);
        let deps = std::mem::take(&mut *watcher.deps.borrow_mut());
        for dep in &deps {
            dep.remove_subscriber(id);
        }
        trace!(watcher = %id, label = %watcher.label, "watcher torn down");
    }

    /// Subscribe a watcher again to the deps of its latest evaluation.
    ///
    /// Watchers dropped from an aborted flush never re-evaluated, so nothing
    /// else would put them back on the deps their triggering write drained.
    pub(crate) fn resubscribe(&self, id: WatcherId) {
        let Some(watcher) = self.watcher(id) else {
            return;
        };
        if !watcher.active.get() {
            return;
        }
        for dep in watcher.deps.borrow().iter() {
            dep.add_subscriber(id);
        }
        trace!(watcher = %id, label = %watcher.label, "watcher resubscribed");
    }

    /// Mark every subscriber of `dep` dirty and clear the subscriber set.
    pub(crate) fn notify(&self, dep: &Dep) {
        for id in dep.take_subscribers() {
            self.mark_dirty(id);
        }
    }

    /// Read a computed watcher: re-evaluate it if dirty, then forward its
    /// deps to whichever watcher is reading it.
    pub(crate) fn computed_value(&self, id: WatcherId) -> Value {
        let Some(watcher) = self.watcher(id) else {
            return Value::Null;
        };
        if watcher.dirty.get() {
            if let Err(err) = self.evaluate(&watcher) {
                self.report(err);
            }
        }
        let deps: DepList = watcher.deps.borrow().clone();
        for dep in &deps {
            self.depend(dep);
        }
        let value = watcher.value.borrow().clone();
        value
    }

    /// Current value of a watcher, without tracking or re-evaluation.
    pub fn watcher_value(&self, id: WatcherId) -> Option<Value> {
        self.watcher(id).map(|w| w.value.borrow().clone())
    }

    /// How many times a watcher has evaluated.
    pub fn watcher_runs(&self, id: WatcherId) -> Option<u64> {
        self.watcher(id).map(|w| w.runs.get())
    }

    /// Number of deps a watcher read during its latest evaluation.
    pub fn watcher_dependency_count(&self, id: WatcherId) -> Option<usize> {
        self.watcher(id).map(|w| w.deps.borrow().len())
    }

    /// Watch an expression in a component's scope.
    ///
    /// The callback receives `(new, old)` after each flush in which the
    /// value changed. The watcher is torn down with the component.
    pub fn watch(
        &self,
        component: ComponentId,
        expr: Expr,
        callback: impl Fn(&Runtime, &Value, &Value) + 'static,
    ) -> crate::Result<WatcherId> {
        let instance = self
            .instance(component)
            .ok_or(Error::NoSuchInstance(component))?;
        let scope: Scope = instance.scope.clone();
        let label = format!("watch:{}", expr.label());
        let spec = WatcherSpec::new(Some(component), label, move |_| expr.evaluate(&scope))
            .callback(callback);
        let id = self.create_watcher(spec);
        instance.output.borrow_mut().watchers.push(id);
        Ok(id)
    }

    /// Tear down a watcher created with [`Runtime::watch`].
    pub fn unwatch(&self, id: WatcherId) {
        self.teardown_watcher(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryHost;
    use crate::reactive::{Object, Observable};
    use std::cell::Cell;

    fn runtime() -> Runtime {
        Runtime::new(Rc::new(MemoryHost::new()))
    }

    #[test]
    fn watcher_ids_follow_creation_order() {
        let rt = runtime();
        let a = rt.next_watcher_id();
        let b = rt.next_watcher_id();
        assert!(a < b);
    }

    #[test]
    fn evaluation_collects_exactly_the_deps_read() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("flag", true).with("a", 1).with("b", 2));

        let s = Rc::clone(&store);
        let id = rt.create_watcher(WatcherSpec::new(None, "branch", move |_| {
            Ok(if s.get("flag").is_truthy() { s.get("a") } else { s.get("b") })
        }));
        assert_eq!(rt.watcher_dependency_count(id), Some(2));

        store.set("flag", false);
        rt.tick();
        assert_eq!(rt.watcher_value(id), Some(Value::from(2)));
        assert_eq!(rt.watcher_dependency_count(id), Some(2));

        // `a` is no longer read, so writing it must not re-run the watcher.
        let runs = rt.watcher_runs(id);
        store.set("a", 10);
        rt.tick();
        assert_eq!(rt.watcher_runs(id), runs);
    }

    #[test]
    fn failing_getter_is_isolated() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("n", 1));

        let s = Rc::clone(&store);
        let bad = rt.create_watcher(WatcherSpec::new(None, "bad", move |_| {
            s.get("n");
            Err(EvalError::msg("boom"))
        }));
        let s = Rc::clone(&store);
        let good = rt.create_watcher(WatcherSpec::new(None, "good", move |_| Ok(s.get("n"))));

        assert_eq!(rt.take_diagnostics().len(), 1);

        store.set("n", 2);
        rt.tick();
        assert_eq!(rt.watcher_value(good), Some(Value::from(2)));
        assert_eq!(rt.watcher_value(bad), Some(Value::Null));
        assert_eq!(rt.take_diagnostics().len(), 1);
    }

    #[test]
    fn teardown_is_idempotent_and_unsubscribes() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("n", 1));
        let s = Rc::clone(&store);
        let id = rt.create_watcher(WatcherSpec::new(None, "n", move |_| Ok(s.get("n"))));
        assert_eq!(store.dependent_count("n"), 1);

        rt.teardown_watcher(id);
        rt.teardown_watcher(id);
        assert_eq!(store.dependent_count("n"), 0);
        assert!(rt.watcher(id).is_none());
    }

    #[test]
    fn callback_receives_new_and_old() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("n", 1));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&store);
        let log = Rc::clone(&seen);
        rt.create_watcher(
            WatcherSpec::new(None, "n", move |_| Ok(s.get("n")))
                .callback(move |_, new, old| log.borrow_mut().push((new.clone(), old.clone()))),
        );

        store.set("n", 5);
        rt.tick();
        assert_eq!(*seen.borrow(), vec![(Value::from(5), Value::from(1))]);
    }

    #[test]
    fn lazy_watcher_evaluates_on_read_and_forwards_deps() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("n", 2));
        let computed_runs = Rc::new(Cell::new(0));

        let s = Rc::clone(&store);
        let counter = Rc::clone(&computed_runs);
        let computed = rt.create_watcher(
            WatcherSpec::new(None, "double", move |_| {
                counter.set(counter.get() + 1);
                Ok(Value::from(s.get("n").as_i64().unwrap_or(0) * 2))
            })
            .lazy(),
        );
        assert_eq!(computed_runs.get(), 0);

        let reader = rt.create_watcher(WatcherSpec::new(None, "reader", move |rt| {
            Ok(rt.computed_value(computed))
        }));
        assert_eq!(rt.watcher_value(reader), Some(Value::from(4)));
        assert_eq!(computed_runs.get(), 1);

        store.set("n", 5);
        rt.tick();
        assert_eq!(rt.watcher_value(reader), Some(Value::from(10)));
        assert_eq!(computed_runs.get(), 2);
    }
}

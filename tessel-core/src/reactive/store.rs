//! Observable Store
//!
//! [`Observable`] wraps a plain [`Object`] so that reads and writes go
//! through an explicit `get`/`set` interface:
//!
//! - A read while a watcher is evaluating subscribes that watcher to the
//!   property's dep.
//! - A write that changes the value stores it, then drains the property's
//!   subscribers and marks them dirty.
//!
//! Nested objects are wrapped lazily the first time they are read through
//! [`Observable::child`].
//!
//! # Frozen data
//!
//! Immutability is checked once, at wrap time. A frozen object (or any
//! object nested under one) gets no deps at all, so nothing it holds is ever
//! observed. Writes into it are dropped: frozen data means "do not react",
//! and the write is inert even for later readers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use super::dep::Dep;
use super::value::{Object, Value};
use crate::runtime::{Runtime, WeakRuntime};

struct Property {
    value: Value,
    /// `None` for properties of frozen objects.
    dep: Option<Rc<Dep>>,
    /// Lazily wrapped nested object. When present it holds the live data.
    child: Option<Rc<Observable>>,
}

impl Property {
    fn current(&self) -> Value {
        match &self.child {
            Some(child) => Value::Object(child.snapshot()),
            None => self.value.clone(),
        }
    }
}

/// An observable object.
pub struct Observable {
    runtime: WeakRuntime,
    frozen: bool,
    props: RefCell<IndexMap<String, Property>>,
    /// Deps for keys that were read before they existed, so that adding the
    /// key later notifies those readers.
    absent: RefCell<HashMap<String, Rc<Dep>>>,
}

impl Observable {
    /// Wrap a plain object.
    pub fn wrap(runtime: &Runtime, object: Object) -> Rc<Self> {
        Self::wrap_nested(runtime.downgrade(), object, false)
    }

    fn wrap_nested(runtime: WeakRuntime, object: Object, inherited_frozen: bool) -> Rc<Self> {
        let frozen = inherited_frozen || object.is_frozen();
        let props = object
            .into_entries()
            .into_iter()
            .map(|(key, value)| {
                let prop = Property {
                    value,
                    dep: (!frozen).then(Dep::new),
                    child: None,
                };
                (key, prop)
            })
            .collect();
        Rc::new(Self {
            runtime,
            frozen,
            props: RefCell::new(props),
            absent: RefCell::new(HashMap::new()),
        })
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn track(&self, dep: Option<Rc<Dep>>) {
        if let (Some(dep), Some(runtime)) = (dep, self.runtime.upgrade()) {
            runtime.depend(&dep);
        }
    }

    fn track_absent(&self, key: &str) {
        if self.frozen {
            return;
        }
        let dep = Rc::clone(
            self.absent
                .borrow_mut()
                .entry(key.to_owned())
                .or_insert_with(Dep::new),
        );
        self.track(Some(dep));
    }

    /// Read a property, subscribing the evaluating watcher.
    pub fn get(&self, key: &str) -> Value {
        let found = {
            let props = self.props.borrow();
            props.get(key).map(|p| (p.current(), p.dep.clone()))
        };
        match found {
            Some((value, dep)) => {
                self.track(dep);
                if matches!(value, Value::Object(_)) {
                    self.track_nested(key);
                }
                value
            }
            None => {
                self.track_absent(key);
                Value::Null
            }
        }
    }

    /// A watcher that reads a whole nested object depends on every key in
    /// it, not only on the property holding it.
    fn track_nested(&self, key: &str) {
        if self.frozen {
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        if runtime.current_watcher().is_none() {
            return;
        }
        if let Some(child) = self.child(key) {
            child.track_all();
        }
    }

    fn track_all(&self) {
        let (deps, objects): (Vec<Rc<Dep>>, Vec<String>) = {
            let props = self.props.borrow();
            let deps = props.values().filter_map(|p| p.dep.clone()).collect();
            let objects = props
                .iter()
                .filter(|(_, p)| p.child.is_some() || matches!(p.value, Value::Object(_)))
                .map(|(k, _)| k.clone())
                .collect();
            (deps, objects)
        };
        for dep in deps {
            self.track(Some(dep));
        }
        for key in objects {
            if let Some(child) = self.child(&key) {
                child.track_all();
            }
        }
    }

    /// Read a property without subscribing anything.
    pub fn peek(&self, key: &str) -> Value {
        self.props
            .borrow()
            .get(key)
            .map(Property::current)
            .unwrap_or_default()
    }

    /// Read a nested object as an observable, wrapping it on first access.
    pub fn child(&self, key: &str) -> Option<Rc<Observable>> {
        let (dep, child) = {
            let mut props = self.props.borrow_mut();
            let Some(prop) = props.get_mut(key) else {
                drop(props);
                self.track_absent(key);
                return None;
            };
            if prop.child.is_none() {
                if let Value::Object(object) = &prop.value {
                    prop.child = Some(Self::wrap_nested(
                        self.runtime.clone(),
                        object.clone(),
                        self.frozen,
                    ));
                }
            }
            (prop.dep.clone(), prop.child.clone())
        };
        self.track(dep);
        child
    }

    /// Read a dotted path (`"user.name"`), subscribing to every hop.
    pub fn get_path(&self, path: &str) -> Value {
        match path.split_once('.') {
            None => self.get(path),
            Some((head, rest)) => match self.child(head) {
                Some(child) => child.get_path(rest),
                None => self.get(head).lookup(rest),
            },
        }
    }

    /// Write a property. Returns whether the write changed anything.
    ///
    /// Unchanged values are a no-op. Writes into frozen objects are dropped.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.frozen {
            debug!(key, "ignoring write to frozen object");
            return false;
        }

        let dep = {
            let mut props = self.props.borrow_mut();
            match props.get_mut(key) {
                Some(prop) => {
                    if prop.current() == value {
                        return false;
                    }
                    prop.value = value;
                    prop.child = None;
                    prop.dep.clone()
                }
                None => {
                    let dep = self
                        .absent
                        .borrow_mut()
                        .remove(key)
                        .unwrap_or_else(Dep::new);
                    props.insert(
                        key.to_owned(),
                        Property {
                            value,
                            dep: Some(Rc::clone(&dep)),
                            child: None,
                        },
                    );
                    Some(dep)
                }
            }
        };

        if let (Some(dep), Some(runtime)) = (dep, self.runtime.upgrade()) {
            runtime.notify(&dep);
        }
        true
    }

    /// Write through a dotted path. Intermediate objects must exist.
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> bool {
        match path.rsplit_once('.') {
            None => self.set(path, value),
            Some((parent, key)) => {
                let target = parent
                    .split('.')
                    .try_fold(None::<Rc<Observable>>, |current, segment| {
                        let next = match &current {
                            None => self.child_untracked(segment),
                            Some(obs) => obs.child_untracked(segment),
                        };
                        next.map(Some)
                    })
                    .flatten();
                match target {
                    Some(target) => target.set(key, value),
                    None => {
                        debug!(path, "ignoring write through missing object");
                        false
                    }
                }
            }
        }
    }

    fn child_untracked(&self, key: &str) -> Option<Rc<Observable>> {
        match self.runtime.upgrade() {
            Some(runtime) => runtime.untracked(|| self.child(key)),
            None => self.child(key),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.props.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.props.borrow().keys().cloned().collect()
    }

    /// Plain copy of the current data, without tracking.
    pub fn snapshot(&self) -> Object {
        let object: Object = self
            .props
            .borrow()
            .iter()
            .map(|(k, p)| (k.clone(), p.current()))
            .collect();
        if self.frozen {
            object.freeze()
        } else {
            object
        }
    }

    /// Number of watchers subscribed to a property.
    pub fn dependent_count(&self, key: &str) -> usize {
        self.props
            .borrow()
            .get(key)
            .and_then(|p| p.dep.as_ref())
            .map_or(0, |dep| dep.subscriber_count())
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("frozen", &self.frozen)
            .field("data", &self.snapshot())
            .finish()
    }
}

//! Property Dependencies
//!
//! A [`Dep`] is the subscriber set attached to one observable property.
//! When a watcher reads the property, the runtime adds the watcher to the
//! property's `Dep`; when the property is written, the set is drained and
//! every subscriber is marked dirty.
//!
//! Edges are bidirectional: the watcher keeps the `Dep`s it read so that it
//! can remove itself from each of them before re-evaluating or on teardown.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

use super::watcher::WatcherId;

/// Counter for generating unique dep IDs.
static DEP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_dep_id() -> u64 {
    DEP_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Subscriber set of a single observable property.
#[derive(Debug)]
pub(crate) struct Dep {
    id: u64,
    subscribers: RefCell<IndexSet<WatcherId>>,
}

impl Dep {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            id: next_dep_id(),
            subscribers: RefCell::new(IndexSet::new()),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn add_subscriber(&self, watcher: WatcherId) {
        self.subscribers.borrow_mut().insert(watcher);
    }

    pub(crate) fn remove_subscriber(&self, watcher: WatcherId) {
        self.subscribers.borrow_mut().shift_remove(&watcher);
    }

    /// Drain the subscriber set. Subscribers re-register on their next read.
    pub(crate) fn take_subscribers(&self) -> IndexSet<WatcherId> {
        std::mem::take(&mut *self.subscribers.borrow_mut())
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

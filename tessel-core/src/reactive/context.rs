//! Tracking Context
//!
//! The tracking context records which watcher is currently evaluating so
//! that property reads can register it as a dependent.
//!
//! # Implementation
//!
//! Each runtime owns a stack of frames. Evaluating a watcher pushes a frame,
//! reads performed by the evaluation record their `Dep` into the top
//! frame, and finishing the evaluation pops it. A frame with no watcher
//! suspends tracking, which is how lifecycle hooks and watcher callbacks run.
//!
//! Nested evaluation (a render watcher reading a computed property that has
//! to re-evaluate first) works because only the top frame records.

use std::rc::Rc;

use smallvec::SmallVec;

use super::dep::Dep;
use super::watcher::WatcherId;
use crate::runtime::Runtime;

pub(crate) type DepList = SmallVec<[Rc<Dep>; 4]>;

/// An entry in the tracking stack.
#[derive(Debug, Default)]
struct Frame {
    /// The evaluating watcher, or `None` when tracking is suspended.
    watcher: Option<WatcherId>,
    /// Deps read during this evaluation, without duplicates.
    deps: DepList,
}

/// Per-runtime stack of evaluation frames.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    stack: Vec<Frame>,
}

impl Tracker {
    fn push(&mut self, watcher: Option<WatcherId>) {
        self.stack.push(Frame {
            watcher,
            deps: SmallVec::new(),
        });
    }

    fn pop(&mut self) -> DepList {
        self.stack.pop().map(|frame| frame.deps).unwrap_or_default()
    }

    /// The watcher that is currently evaluating, if any.
    pub(crate) fn current(&self) -> Option<WatcherId> {
        self.stack.last().and_then(|frame| frame.watcher)
    }

    /// Record a read of `dep`. Returns the watcher that should be subscribed
    /// when this is the first read of `dep` in the current frame.
    pub(crate) fn record(&mut self, dep: &Rc<Dep>) -> Option<WatcherId> {
        let frame = self.stack.last_mut()?;
        let watcher = frame.watcher?;
        if frame.deps.iter().any(|d| d.id() == dep.id()) {
            return None;
        }
        frame.deps.push(Rc::clone(dep));
        Some(watcher)
    }

}

/// Guard that pops its frame when dropped.
///
/// This keeps the stack balanced even if an evaluation unwinds.
pub(crate) struct TrackingGuard<'a> {
    runtime: &'a Runtime,
    open: bool,
}

impl<'a> TrackingGuard<'a> {
    pub(crate) fn enter(runtime: &'a Runtime, watcher: Option<WatcherId>) -> Self {
        runtime.inner.tracker.borrow_mut().push(watcher);
        Self {
            runtime,
            open: true,
        }
    }

    /// Pop the frame and return the deps it collected.
    pub(crate) fn finish(mut self) -> DepList {
        self.open = false;
        self.runtime.inner.tracker.borrow_mut().pop()
    }
}

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            self.runtime.inner.tracker.borrow_mut().pop();
        }
    }
}

impl Runtime {
    /// Register `dep` with the currently evaluating watcher, if any.
    pub(crate) fn depend(&self, dep: &Rc<Dep>) {
        let watcher = self.inner.tracker.borrow_mut().record(dep);
        if let Some(watcher) = watcher {
            dep.add_subscriber(watcher);
        }
    }

    /// Run `f` with dependency tracking suspended.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = TrackingGuard::enter(self, None);
        f()
    }

    /// The watcher currently evaluating, if any.
    pub(crate) fn current_watcher(&self) -> Option<WatcherId> {
        self.inner.tracker.borrow().current()
    }
}

//! Update Scheduler
//!
//! Dirty watchers are not re-evaluated when their data changes. They are
//! collected here and flushed together on the next tick, so a synchronous
//! burst of writes produces one re-evaluation per watcher.
//!
//! # Algorithm
//!
//! 1. `mark_dirty` inserts the watcher into an ordered set keyed by watcher
//!    ID. Inserting a watcher that is already pending is a no-op. The first
//!    insertion of a cycle asks the host's [`Defer`] driver for a tick.
//! 2. A flush proceeds in rounds. Each round takes the whole queue at once
//!    and runs it in ascending ID order, so watchers created earlier (parents)
//!    run before watchers created later (children).
//! 3. Watchers dirtied while a round runs land in the fresh queue and run in
//!    the next round of the same flush. A watcher that is still waiting in
//!    the current round is not queued twice.
//! 4. A watcher that runs more than `max_update_count` times in one flush
//!    aborts the flush. The remaining queue is dropped and a
//!    [`Error::RunawayUpdate`] diagnostic is reported. Dropped watchers are
//!    resubscribed to their deps, so later writes still reach them.
//! 5. Once the queue is drained, `updated` hooks fire for the components
//!    whose watchers re-ran, then the after-flush callbacks registered with
//!    [`Runtime::next_tick`] run in registration order.

mod tick;

pub use tick::{CountingTick, Defer, ManualTick};

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexSet;
use tracing::{debug, trace, warn};

use crate::component::ComponentId;
use crate::error::Error;
use crate::reactive::WatcherId;
use crate::runtime::Runtime;

pub(crate) type Task = Box<dyn FnOnce(&Runtime)>;

/// Queue state owned by a runtime.
#[derive(Default)]
pub struct UpdateScheduler {
    /// Watchers waiting for the next round, in creation order.
    queue: BTreeSet<WatcherId>,
    /// Watchers queued or waiting in the current round.
    pending: HashSet<WatcherId>,
    /// Callbacks to run once the current cycle's flush completes.
    after_flush: Vec<Task>,
    tick_requested: bool,
    flushing: bool,
    flush_count: u64,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a watcher. Returns false if it was already pending.
    pub fn enqueue(&mut self, id: WatcherId) -> bool {
        if !self.pending.insert(id) {
            return false;
        }
        self.queue.insert(id);
        true
    }

    /// Take the whole queue for one round.
    fn take_round(&mut self) -> BTreeSet<WatcherId> {
        std::mem::take(&mut self.queue)
    }

    /// The watcher is about to run; dirtying it again re-queues it.
    fn settle(&mut self, id: WatcherId) {
        self.pending.remove(&id);
    }

    /// Drop the rest of the cycle. Returns the watchers that were waiting.
    fn abort(&mut self) -> Vec<WatcherId> {
        self.queue.clear();
        self.pending.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }
}

impl Runtime {
    /// Mark a watcher dirty.
    ///
    /// Lazy watchers only flip their dirty flag. Eager watchers are queued
    /// and flushed on the next tick, or immediately when the runtime is
    /// configured for synchronous updates.
    pub(crate) fn mark_dirty(&self, id: WatcherId) {
        let Some(watcher) = self.watcher(id) else {
            return;
        };
        if !watcher.active.get() {
            return;
        }
        if watcher.lazy {
            watcher.dirty.set(true);
            return;
        }

        let (queued, flushing) = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            (scheduler.enqueue(id), scheduler.flushing)
        };
        if !queued {
            return;
        }
        trace!(watcher = %id, label = %watcher.label, "watcher queued");

        if self.inner.config.async_updates {
            self.request_tick();
        } else if !flushing {
            self.flush();
        }
    }

    fn request_tick(&self) {
        let first = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            !std::mem::replace(&mut scheduler.tick_requested, true)
        };
        if first {
            self.inner.defer.request_tick();
        }
    }

    /// Register a callback to run after the next flush completes.
    pub fn next_tick(&self, callback: impl FnOnce(&Runtime) + 'static) {
        self.inner
            .scheduler
            .borrow_mut()
            .after_flush
            .push(Box::new(callback));
        self.request_tick();
    }

    /// Run one deferred cycle if one was requested. Returns whether it ran.
    pub fn tick(&self) -> bool {
        if !self.inner.scheduler.borrow().tick_requested {
            return false;
        }
        self.flush();
        true
    }

    /// Tick until no further work is requested, up to `max_tick_rounds`.
    /// Returns the number of ticks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ticks = 0;
        while self.tick() {
            ticks += 1;
            if ticks >= self.inner.config.max_tick_rounds {
                warn!(ticks, "runtime still busy after max_tick_rounds");
                break;
            }
        }
        ticks
    }

    /// Whether a tick has been requested and not yet run.
    pub fn is_tick_pending(&self) -> bool {
        self.inner.scheduler.borrow().tick_requested
    }

    /// Number of completed flushes.
    pub fn flush_count(&self) -> u64 {
        self.inner.scheduler.borrow().flush_count
    }

    /// Drain the queue, then fire `updated` hooks and after-flush callbacks.
    pub(crate) fn flush(&self) {
        {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            if scheduler.flushing {
                return;
            }
            scheduler.flushing = true;
        }

        let limit = self.inner.config.max_update_count;
        let mut runs: HashMap<WatcherId, u32> = HashMap::new();
        let mut touched: IndexSet<ComponentId> = IndexSet::new();
        let mut rounds = 0usize;

        'rounds: loop {
            let round = self.inner.scheduler.borrow_mut().take_round();
            if round.is_empty() {
                break;
            }
            rounds += 1;

            for id in round {
                self.inner.scheduler.borrow_mut().settle(id);

                let count = runs.entry(id).or_insert(0);
                *count += 1;
                if *count > limit {
                    let label = self
                        .watcher(id)
                        .map_or_else(|| id.to_string(), |w| w.label.clone());
                    let dropped = self.inner.scheduler.borrow_mut().abort();
                    // The writes that queued them drained their deps.
                    for watcher in dropped.into_iter().chain(std::iter::once(id)) {
                        self.resubscribe(watcher);
                    }
                    self.report(Error::RunawayUpdate {
                        watcher: label,
                        limit,
                    });
                    break 'rounds;
                }

                let owner = self.watcher(id).and_then(|w| w.owner);
                if self.run_watcher(id) {
                    if let Some(owner) = owner {
                        touched.insert(owner);
                    }
                }
            }
        }

        let callbacks = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            scheduler.flushing = false;
            scheduler.tick_requested = false;
            scheduler.flush_count += 1;
            std::mem::take(&mut scheduler.after_flush)
        };
        debug!(
            rounds,
            watchers = runs.len(),
            callbacks = callbacks.len(),
            "flush complete"
        );

        for component in touched {
            self.component_updated(component);
        }
        for callback in callbacks {
            self.untracked(|| callback(self));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::dom::MemoryHost;
    use crate::reactive::watcher::WatcherSpec;
    use crate::reactive::{Object, Observable, Value};
    use crate::RuntimeConfig;

    fn runtime() -> Runtime {
        Runtime::new(Rc::new(MemoryHost::new()))
    }

    #[test]
    fn enqueue_is_unique() {
        let mut scheduler = UpdateScheduler::new();
        assert!(scheduler.enqueue(WatcherId::from_raw(3)));
        assert!(!scheduler.enqueue(WatcherId::from_raw(3)));
        assert!(scheduler.enqueue(WatcherId::from_raw(1)));
        assert_eq!(scheduler.len(), 2);

        let round: Vec<_> = scheduler.take_round().into_iter().collect();
        assert_eq!(round, vec![WatcherId::from_raw(1), WatcherId::from_raw(3)]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn burst_of_writes_coalesces_into_one_run() {
        let host = Rc::new(MemoryHost::new());
        let driver = Rc::new(CountingTick::new());
        let rt = Runtime::builder(host).defer(driver.clone()).build();
        let store = Observable::wrap(&rt, Object::new().with("a", 1).with("b", 1));

        let s = Rc::clone(&store);
        let id = rt.create_watcher(WatcherSpec::new(None, "sum", move |_| {
            let a = s.get("a").as_i64().unwrap_or(0);
            let b = s.get("b").as_i64().unwrap_or(0);
            Ok(Value::from(a + b))
        }));
        assert_eq!(rt.watcher_runs(id), Some(1));

        store.set("a", 2);
        store.set("b", 3);
        store.set("a", 4);
        assert_eq!(driver.requests(), 1);
        assert_eq!(rt.watcher_runs(id), Some(1));

        assert!(rt.tick());
        assert_eq!(rt.watcher_runs(id), Some(2));
        assert_eq!(rt.watcher_value(id), Some(Value::from(7)));
        assert!(!rt.tick());
    }

    #[test]
    fn flush_runs_in_creation_order() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("n", 0));
        let order = Rc::new(RefCell::new(Vec::new()));

        let mut ids = Vec::new();
        for label in ["first", "second", "third"] {
            let s = Rc::clone(&store);
            let log = Rc::clone(&order);
            ids.push(rt.create_watcher(WatcherSpec::new(None, label, move |_| {
                log.borrow_mut().push(label);
                Ok(s.get("n"))
            })));
        }
        order.borrow_mut().clear();

        // queue in reverse to show ordering does not depend on insertion
        for id in ids.iter().rev() {
            rt.mark_dirty(*id);
        }
        rt.tick();
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn cascading_updates_run_in_the_same_flush() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("a", 1).with("b", 0));

        let s = Rc::clone(&store);
        let writer = Rc::clone(&store);
        rt.create_watcher(
            WatcherSpec::new(None, "a", move |_| Ok(s.get("a")))
                .callback(move |_, new, _| {
                    writer.set("b", new.clone());
                }),
        );
        let s = Rc::clone(&store);
        let b = rt.create_watcher(WatcherSpec::new(None, "b", move |_| Ok(s.get("b"))));

        store.set("a", 9);
        rt.tick();
        assert_eq!(rt.watcher_value(b), Some(Value::from(9)));
        assert!(!rt.is_tick_pending());
    }

    #[test]
    fn runaway_updates_abort_with_a_diagnostic() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("n", 0));

        let s = Rc::clone(&store);
        let writer = Rc::clone(&store);
        rt.create_watcher(
            WatcherSpec::new(None, "loop", move |_| Ok(s.get("n")))
                .callback(move |_, new, _| {
                    writer.set("n", new.as_i64().unwrap_or(0) + 1);
                }),
        );

        store.set("n", 1);
        rt.tick();

        let diagnostics = rt.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0],
            Error::RunawayUpdate { limit: 100, .. }
        ));
        assert!(!rt.is_tick_pending());
        assert!(!rt.tick());
    }

    #[test]
    fn watchers_dropped_by_an_abort_react_next_cycle() {
        let host = Rc::new(MemoryHost::new());
        let config = RuntimeConfig {
            max_update_count: 5,
            ..RuntimeConfig::default()
        };
        let rt = Runtime::builder(host).config(config).build();
        let store = Observable::wrap(&rt, Object::new().with("n", 0).with("m", 0));

        let s = Rc::clone(&store);
        let writer = Rc::clone(&store);
        let looping = rt.create_watcher(
            WatcherSpec::new(None, "loop", move |_| Ok(s.get("n"))).callback(move |_, new, _| {
                let next = new.as_i64().unwrap_or(0) + 1;
                writer.set("n", next);
                writer.set("m", next);
            }),
        );
        let calls = Rc::new(Cell::new(0));
        let s = Rc::clone(&store);
        let counter = Rc::clone(&calls);
        let follower = rt.create_watcher(
            WatcherSpec::new(None, "follow", move |_| Ok(s.get("m")))
                .callback(move |_, _, _| counter.set(counter.get() + 1)),
        );

        store.set("n", 1);
        rt.tick();
        assert_eq!(rt.take_diagnostics().len(), 1);
        let before = calls.get();
        assert_eq!(store.dependent_count("m"), 1);
        assert_eq!(store.dependent_count("n"), 1);

        store.set("m", 1000);
        assert!(rt.tick());
        assert_eq!(calls.get(), before + 1);
        assert_eq!(rt.watcher_value(follower), Some(Value::from(1000)));
        assert!(rt.take_diagnostics().is_empty());

        // the looping watcher is still subscribed too
        store.set("n", -100);
        rt.tick();
        assert!(rt.watcher_runs(looping).unwrap_or(0) > 6);
    }

    #[test]
    fn runaway_bound_is_configurable() {
        let host = Rc::new(MemoryHost::new());
        let config = RuntimeConfig {
            max_update_count: 3,
            ..RuntimeConfig::default()
        };
        let rt = Runtime::builder(host).config(config).build();
        let store = Observable::wrap(&rt, Object::new().with("n", 0));
        let runs = Rc::new(Cell::new(0));

        let s = Rc::clone(&store);
        let writer = Rc::clone(&store);
        let counter = Rc::clone(&runs);
        rt.create_watcher(
            WatcherSpec::new(None, "loop", move |_| {
                counter.set(counter.get() + 1);
                Ok(s.get("n"))
            })
            .callback(move |_, new, _| {
                writer.set("n", new.as_i64().unwrap_or(0) + 1);
            }),
        );
        runs.set(0);

        store.set("n", 1);
        rt.tick();
        assert_eq!(runs.get(), 3);
        assert_eq!(rt.take_diagnostics().len(), 1);
    }

    #[test]
    fn next_tick_runs_after_the_flush() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("n", 0));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&store);
        let id = rt.create_watcher(WatcherSpec::new(None, "n", move |_| Ok(s.get("n"))));

        let log = Rc::clone(&seen);
        rt.next_tick(move |rt| log.borrow_mut().push(("first", rt.watcher_value(id))));
        store.set("n", 1);
        let log = Rc::clone(&seen);
        rt.next_tick(move |_| log.borrow_mut().push(("second", None)));

        assert!(seen.borrow().is_empty());
        rt.tick();
        assert_eq!(
            *seen.borrow(),
            vec![("first", Some(Value::from(1))), ("second", None)]
        );
    }

    #[test]
    fn callbacks_registered_in_callbacks_wait_for_the_next_cycle() {
        let rt = runtime();
        let hits = Rc::new(Cell::new(0));

        let counter = Rc::clone(&hits);
        rt.next_tick(move |rt| {
            counter.set(counter.get() + 1);
            let counter = Rc::clone(&counter);
            rt.next_tick(move |_| counter.set(counter.get() + 10));
        });

        rt.tick();
        assert_eq!(hits.get(), 1);
        assert!(rt.is_tick_pending());
        assert_eq!(rt.run_until_idle(), 1);
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn sync_mode_flushes_immediately() {
        let host = Rc::new(MemoryHost::new());
        let config = RuntimeConfig {
            async_updates: false,
            ..RuntimeConfig::default()
        };
        let rt = Runtime::builder(host).config(config).build();
        let store = Observable::wrap(&rt, Object::new().with("n", 0));

        let s = Rc::clone(&store);
        let id = rt.create_watcher(WatcherSpec::new(None, "n", move |_| Ok(s.get("n"))));
        store.set("n", 5);
        assert_eq!(rt.watcher_value(id), Some(Value::from(5)));
    }

    #[test]
    fn torn_down_watcher_in_queue_is_skipped() {
        let rt = runtime();
        let store = Observable::wrap(&rt, Object::new().with("n", 0));
        let s = Rc::clone(&store);
        let id = rt.create_watcher(WatcherSpec::new(None, "n", move |_| Ok(s.get("n"))));

        store.set("n", 1);
        rt.teardown_watcher(id);
        rt.tick();
        assert_eq!(rt.watcher_runs(id), None);
        assert!(rt.take_diagnostics().is_empty());
    }
}

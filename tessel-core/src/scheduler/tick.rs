//! Deferred Tick Requests
//!
//! The runtime never flushes on its own. When work becomes pending it asks
//! its [`Defer`] implementation, once per cycle, to arrange for
//! [`Runtime::tick`] to be called after the current synchronous work. A
//! browser host would post a microtask, an event loop would schedule a task,
//! and a headless host simply calls `tick` itself.
//!
//! [`Runtime::tick`]: crate::Runtime::tick

use std::cell::Cell;

/// The single scheduling primitive the runtime needs from its host.
pub trait Defer {
    /// Arrange for `Runtime::tick` to run after the current synchronous work.
    fn request_tick(&self);
}

/// Any `Fn()` can serve as a driver.
impl<F: Fn()> Defer for F {
    fn request_tick(&self) {
        self()
    }
}

/// Headless driver: the host calls `tick` explicitly.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualTick;

impl Defer for ManualTick {
    fn request_tick(&self) {}
}

/// Driver that only counts requests.
#[derive(Debug, Default)]
pub struct CountingTick {
    requests: Cell<usize>,
}

impl CountingTick {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl Defer for CountingTick {
    fn request_tick(&self) {
        self.requests.set(self.requests.get() + 1);
    }
}

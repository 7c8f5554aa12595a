//! Time sources for wrappers that measure callbacks themselves
//!
//! Boundary events carry their own timestamps. A clock is only consulted
//! when the engine wraps a host callback (tracers, `run_in`).

use crate::Timestamp;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Source of page-relative timestamps in milliseconds
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Milliseconds elapsed since the clock was created, like `performance.now()`
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock driven by hand. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, ts: Timestamp) {
        self.now.set(ts);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

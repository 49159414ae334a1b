//! Time sources for timer-based combinators.
//!
//! The bus never reads the wall clock directly. Production code uses
//! [`SystemClock`]; tests inject a [`ManualClock`] and advance it by hand so
//! debounce/throttle/batch windows can be exercised without sleeping.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// A monotonic millisecond time source.
pub trait Clock {
    /// Milliseconds elapsed since an arbitrary, fixed origin.
    fn now_ms(&self) -> u64;
}

/// Monotonic clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is "now".
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Virtual clock advanced explicitly. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    /// Jump to an absolute time.
    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

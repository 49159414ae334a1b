//! Rate-limiting state machines behind `debounce`, `throttle` and `batch`.
//!
//! Each combinator is a small stateful object fed with events through
//! `on_event(event, now)` and asked for due deliveries through `poll(now)`.
//! Time is always passed in, so the semantics are testable with a virtual
//! clock. The bus wires these objects to subscriptions and to its timer
//! queue.

use chorus_types::Event;

/// Delivers only the last event of a burst, once the burst has been quiet
/// for `delay_ms`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay_ms: u64,
    pending: Option<(Event, u64)>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet window.
    pub const fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            pending: None,
        }
    }

    /// Record an event, replacing any pending one and restarting the window.
    pub fn on_event(&mut self, event: Event, now: u64) {
        self.pending = Some((event, now.saturating_add(self.delay_ms)));
    }

    /// Return the pending event if its quiet window has elapsed.
    pub fn poll(&mut self, now: u64) -> Option<Event> {
        match self.pending {
            Some((_, deadline)) if now >= deadline => self.pending.take().map(|(e, _)| e),
            _ => None,
        }
    }

    /// Whether an event is waiting for its window to elapse.
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Delivers at most one event per `interval_ms`. The first event of a burst
/// goes through immediately; the last event that arrived while throttled is
/// delivered once the interval has elapsed.
#[derive(Debug, Clone)]
pub struct Throttler {
    interval_ms: u64,
    last_delivery: Option<u64>,
    trailing: Option<Event>,
}

impl Throttler {
    /// Create a throttler with the given interval.
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_delivery: None,
            trailing: None,
        }
    }

    fn open(&self, now: u64) -> bool {
        self.last_delivery
            .is_none_or(|last| now.saturating_sub(last) >= self.interval_ms)
    }

    /// Record an event. Returns it when it may be delivered right away;
    /// otherwise keeps it as the trailing candidate.
    pub fn on_event(&mut self, event: Event, now: u64) -> Option<Event> {
        if self.open(now) {
            self.last_delivery = Some(now);
            self.trailing = None;
            Some(event)
        } else {
            self.trailing = Some(event);
            None
        }
    }

    /// Return the trailing event if the interval has elapsed.
    pub fn poll(&mut self, now: u64) -> Option<Event> {
        if self.trailing.is_some() && self.open(now) {
            self.last_delivery = Some(now);
            self.trailing.take()
        } else {
            None
        }
    }

    /// Whether a trailing event is waiting.
    pub const fn is_pending(&self) -> bool {
        self.trailing.is_some()
    }
}

/// Collects every event received within a `window_ms` window (opened by the
/// first event) and delivers them together.
#[derive(Debug, Clone)]
pub struct Batcher {
    window_ms: u64,
    opened_at: Option<u64>,
    items: Vec<Event>,
}

impl Batcher {
    /// Create a batcher with the given window.
    pub const fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            opened_at: None,
            items: Vec::new(),
        }
    }

    /// Add an event to the current window, opening one if needed.
    pub fn on_event(&mut self, event: Event, now: u64) {
        if self.opened_at.is_none() {
            self.opened_at = Some(now);
        }
        self.items.push(event);
    }

    /// Return the collected events once the window has closed.
    pub fn poll(&mut self, now: u64) -> Option<Vec<Event>> {
        let opened = self.opened_at?;
        if now.saturating_sub(opened) >= self.window_ms {
            self.opened_at = None;
            Some(std::mem::take(&mut self.items))
        } else {
            None
        }
    }

    /// Number of events waiting in the open window.
    pub fn pending(&self) -> usize {
        self.items.len()
    }
}

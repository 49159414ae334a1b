//! The event bus: registration, ordered synchronous delivery, and the
//! derived combinators.
//!
//! # Delivery
//!
//! [`EventBus::emit`] is synchronous and runs on the caller's stack:
//!
//! 1. Build the [`Event`].
//! 2. Run middleware in insertion order. Any middleware returning `false`
//!    vetoes the event silently: no listener runs, nothing is recorded.
//! 3. Append to history and bump the per-type counter.
//! 4. Gather exact listeners, matching wildcard listeners, and pending
//!    once-listeners for the type.
//! 5. Sort by descending priority; ties keep registration order.
//! 6. Invoke in that order, stopping as soon as a listener calls
//!    [`Event::stop_propagation`].
//! 7. A listener that returns `Err` or panics is logged and turned into one
//!    nested `error` event. The remaining listeners still run.
//!
//! The bus is a single-threaded handle (`Rc` inside). Listeners may emit,
//! subscribe and unsubscribe re-entrantly; no internal borrow is held while
//! a listener runs.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};
use std::time::Duration;

use chorus_types::{Event, topics};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::clock::{Clock, SystemClock};
use crate::combinators::{Batcher, Debouncer, Throttler};
use crate::error::{BusError, ListenerFault};
use crate::history::{DEFAULT_HISTORY_LIMIT, History};
use crate::pattern::Pattern;

/// Default ceiling on re-entrant emission depth.
pub const DEFAULT_MAX_EMIT_DEPTH: usize = 64;

/// Outcome of a single listener invocation.
pub type ListenerResult = Result<(), ListenerFault>;

/// A listener callback. Identity is the `Rc` allocation: subscribing and
/// unsubscribing use the same handle.
pub type Listener = Rc<dyn Fn(&mut Event) -> ListenerResult>;

/// A callback receiving a whole batch of events.
pub type BatchListener = Rc<dyn Fn(&[Event]) -> ListenerResult>;

/// Middleware runs before delivery; returning `false` vetoes the event.
pub type Middleware = Rc<dyn Fn(&mut Event) -> bool>;

/// Payload transformation used by [`EventBus::pipe`].
pub type Transform = Rc<dyn Fn(&Value) -> Value>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&mut Event) -> ListenerResult + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as a [`BatchListener`].
pub fn batch_listener<F>(f: F) -> BatchListener
where
    F: Fn(&[Event]) -> ListenerResult + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as [`Middleware`].
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(&mut Event) -> bool + 'static,
{
    Rc::new(f)
}

/// Tunables for a bus instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusOptions {
    /// Number of events retained in history.
    pub history_limit: usize,
    /// Maximum nesting of `emit` calls made from inside listeners.
    pub max_emit_depth: usize,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_emit_depth: DEFAULT_MAX_EMIT_DEPTH,
        }
    }
}

/// Per-subscription options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Higher priorities are delivered first. Default 0.
    pub priority: i32,
}

impl SubscribeOptions {
    /// Options with the given priority.
    pub const fn priority(priority: i32) -> Self {
        Self { priority }
    }
}

/// Delivery counters for introspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Events that passed middleware and were delivered.
    pub emitted: u64,
    /// Events vetoed by middleware.
    pub vetoed: u64,
    /// Listener faults caught during delivery.
    pub faults: u64,
    /// Emissions dropped for exceeding the depth ceiling.
    pub dropped: u64,
    /// Delivered events per event type.
    pub per_type: BTreeMap<String, u64>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Registration {
    key: String,
    pattern: Pattern,
    listener: Listener,
    priority: i32,
    sequence: u64,
    once: bool,
    active: Rc<Cell<bool>>,
}

impl Registration {
    fn same_identity(&self, key: &str, listener: &Listener, once: bool) -> bool {
        self.key == key && self.once == once && Rc::ptr_eq(&self.listener, listener)
    }
}

#[derive(Default)]
struct Registry {
    /// Exact-type listeners keyed by event type.
    exact: HashMap<String, Vec<Registration>>,
    /// Wildcard listeners (including wildcard once-listeners).
    wildcard: Vec<Registration>,
    /// Exact-type once-listeners keyed by event type.
    once: HashMap<String, Vec<Registration>>,
}

impl Registry {
    fn find(&self, key: &str, listener: &Listener, once: bool) -> Option<&Registration> {
        let bucket = if once { &self.once } else { &self.exact };
        bucket
            .get(key)
            .into_iter()
            .flatten()
            .chain(self.wildcard.iter())
            .find(|r| r.same_identity(key, listener, once))
    }

    fn insert(&mut self, registration: Registration) {
        if registration.pattern.is_wildcard() {
            self.wildcard.push(registration);
        } else if registration.once {
            self.once
                .entry(registration.key.clone())
                .or_default()
                .push(registration);
        } else {
            self.exact
                .entry(registration.key.clone())
                .or_default()
                .push(registration);
        }
    }

    /// Remove every registration satisfying `pred`, deactivating it.
    fn remove_where<P>(&mut self, key: &str, pred: P) -> usize
    where
        P: Fn(&Registration) -> bool,
    {
        let mut removed = 0usize;
        let mut sweep = |list: &mut Vec<Registration>| {
            list.retain(|r| {
                if r.key == key && pred(r) {
                    r.active.set(false);
                    removed = removed.saturating_add(1);
                    false
                } else {
                    true
                }
            });
        };
        for map in [&mut self.exact, &mut self.once] {
            if let Some(list) = map.get_mut(key) {
                sweep(list);
                if list.is_empty() {
                    map.remove(key);
                }
            }
        }
        sweep(&mut self.wildcard);
        removed
    }

    fn remove_sequence(&mut self, key: &str, sequence: u64) -> bool {
        self.remove_where(key, |r| r.sequence == sequence) > 0
    }

    /// Listeners for `event_type`, sorted for delivery.
    fn targets(&self, event_type: &str) -> Vec<Registration> {
        let mut targets: Vec<Registration> = self
            .exact
            .get(event_type)
            .into_iter()
            .flatten()
            .chain(self.once.get(event_type).into_iter().flatten())
            .chain(self.wildcard.iter().filter(|r| r.pattern.matches(event_type)))
            .cloned()
            .collect();
        targets.sort_by_key(|r| (Reverse(r.priority), r.sequence));
        targets
    }

    fn count(&self, key: &str) -> usize {
        let in_map = |map: &HashMap<String, Vec<Registration>>| map.get(key).map_or(0, Vec::len);
        in_map(&self.exact)
            .saturating_add(in_map(&self.once))
            .saturating_add(self.wildcard.iter().filter(|r| r.key == key).count())
    }

    fn total(&self) -> usize {
        let sum = |map: &HashMap<String, Vec<Registration>>| {
            map.values().map(Vec::len).fold(0usize, usize::saturating_add)
        };
        sum(&self.exact)
            .saturating_add(sum(&self.once))
            .saturating_add(self.wildcard.len())
    }
}

// ---------------------------------------------------------------------------
// Timer queue
// ---------------------------------------------------------------------------

/// A pending combinator poll. Returns the number of deliveries it made.
type TimerPoll = Rc<dyn Fn(&EventBus, u64) -> usize>;

struct TimerTask {
    id: u64,
    poll: TimerPoll,
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

struct BusInner {
    registry: RefCell<Registry>,
    middleware: RefCell<Vec<Middleware>>,
    history: RefCell<History>,
    stats: RefCell<BusStats>,
    timers: RefCell<Vec<TimerTask>>,
    clock: Rc<dyn Clock>,
    depth: Cell<usize>,
    max_depth: usize,
    next_sequence: Cell<u64>,
}

/// Single-threaded publish/subscribe router.
///
/// Cloning the handle shares the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.total_listeners())
            .field("depth", &self.inner.depth.get())
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by every subscribing call.
///
/// [`cancel`](Self::cancel) removes exactly the registration it was created
/// for (and any combinator timer attached to it). Cancelling twice, or after
/// a once-listener already fired, is a no-op. Dropping the handle does *not*
/// cancel.
#[derive(Clone)]
pub struct Subscription {
    bus: Weak<BusInner>,
    key: String,
    sequence: u64,
    active: Rc<Cell<bool>>,
    timer: Option<u64>,
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("sequence", &self.sequence)
            .field("active", &self.active.get())
            .finish()
    }
}

/// Cancels the wrapped registration when the owner goes away, including a
/// `wait_for` future dropped before it resolves.
struct CancelOnDrop(Subscription);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl Subscription {
    /// Remove the registration. Returns `true` if this call removed it.
    pub fn cancel(&self) -> bool {
        let Some(inner) = self.bus.upgrade() else {
            self.active.set(false);
            return false;
        };
        if let Some(timer) = self.timer {
            inner.timers.borrow_mut().retain(|t| t.id != timer);
        }
        if !self.active.get() {
            return false;
        }
        self.active.set(false);
        inner
            .registry
            .borrow_mut()
            .remove_sequence(&self.key, self.sequence)
    }

    /// Whether the registration is still live.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// The subscription key (event type or pattern).
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl EventBus {
    /// Create a bus with default options and the system clock.
    pub fn new() -> Self {
        Self::with_options(BusOptions::default(), Rc::new(SystemClock::new()))
    }

    /// Create a bus with explicit options and time source.
    pub fn with_options(options: BusOptions, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(BusInner {
                registry: RefCell::new(Registry::default()),
                middleware: RefCell::new(Vec::new()),
                history: RefCell::new(History::new(options.history_limit)),
                stats: RefCell::new(BusStats::default()),
                timers: RefCell::new(Vec::new()),
                clock,
                depth: Cell::new(0),
                max_depth: options.max_emit_depth.max(1),
                next_sequence: Cell::new(0),
            }),
        }
    }

    /// Current time according to the bus clock.
    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    fn next_sequence(&self) -> u64 {
        let seq = self.inner.next_sequence.get();
        self.inner.next_sequence.set(seq.saturating_add(1));
        seq
    }

    fn handle_for(&self, registration: &Registration, timer: Option<u64>) -> Subscription {
        Subscription {
            bus: Rc::downgrade(&self.inner),
            key: registration.key.clone(),
            sequence: registration.sequence,
            active: Rc::clone(&registration.active),
            timer,
        }
    }

    /// A handle that is already inactive, returned for rejected keys.
    fn dead_handle(&self, key: &str) -> Subscription {
        Subscription {
            bus: Rc::downgrade(&self.inner),
            key: key.to_owned(),
            sequence: u64::MAX,
            active: Rc::new(Cell::new(false)),
            timer: None,
        }
    }

    fn register(&self, key: &str, listener: Listener, priority: i32, once: bool) -> Subscription {
        let pattern = match Pattern::parse(key) {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!(key, error = %err, "rejected subscription");
                return self.dead_handle(key);
            }
        };

        if let Some(existing) = self.inner.registry.borrow().find(key, &listener, once) {
            debug!(key, "duplicate subscription ignored");
            return self.handle_for(existing, None);
        }

        let registration = Registration {
            key: key.to_owned(),
            pattern,
            listener,
            priority,
            sequence: self.next_sequence(),
            once,
            active: Rc::new(Cell::new(true)),
        };
        let handle = self.handle_for(&registration, None);
        self.inner.registry.borrow_mut().insert(registration);
        handle
    }

    // -----------------------------------------------------------------------
    // Subscribe / unsubscribe
    // -----------------------------------------------------------------------

    /// Subscribe to an event type or wildcard pattern at priority 0.
    pub fn subscribe(&self, key: &str, listener: Listener) -> Subscription {
        self.subscribe_with(key, listener, SubscribeOptions::default())
    }

    /// Subscribe with explicit options.
    ///
    /// Subscribing the same `(key, listener)` pair twice keeps the first
    /// registration and returns a handle to it. Malformed keys are logged
    /// and yield an inactive handle.
    pub fn subscribe_with(
        &self,
        key: &str,
        listener: Listener,
        options: SubscribeOptions,
    ) -> Subscription {
        self.register(key, listener, options.priority, false)
    }

    /// Subscribe for a single delivery. The registration is removed
    /// immediately before the listener runs.
    pub fn subscribe_once(&self, key: &str, listener: Listener) -> Subscription {
        self.register(key, listener, 0, true)
    }

    /// Subscribe for a single delivery with explicit options.
    pub fn subscribe_once_with(
        &self,
        key: &str,
        listener: Listener,
        options: SubscribeOptions,
    ) -> Subscription {
        self.register(key, listener, options.priority, true)
    }

    /// Remove the registration(s) of `listener` under `key`. Returns `true`
    /// if anything was removed; repeated calls are harmless.
    pub fn unsubscribe(&self, key: &str, listener: &Listener) -> bool {
        self.inner
            .registry
            .borrow_mut()
            .remove_where(key, |r| Rc::ptr_eq(&r.listener, listener))
            > 0
    }

    /// Remove every registration under `key`. Returns how many were removed.
    pub fn unsubscribe_all(&self, key: &str) -> usize {
        self.inner.registry.borrow_mut().remove_where(key, |_| true)
    }

    /// Number of live registrations under exactly `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.inner.registry.borrow().count(key)
    }

    /// Number of live registrations across all keys.
    pub fn total_listeners(&self) -> usize {
        self.inner.registry.borrow().total()
    }

    /// Append middleware. Middleware runs in insertion order.
    pub fn add_middleware(&self, middleware: Middleware) {
        self.inner.middleware.borrow_mut().push(middleware);
    }

    /// Remove all middleware.
    pub fn clear_middleware(&self) {
        self.inner.middleware.borrow_mut().clear();
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    /// Emit an event synchronously and return it after delivery.
    pub fn emit(&self, event_type: &str, data: Value) -> Event {
        let mut event = Event::new(event_type, data);
        self.dispatch(&mut event);
        event
    }

    /// Emit on the next scheduler turn. Yields once, then delivers exactly
    /// like [`emit`](Self::emit).
    pub async fn emit_async(&self, event_type: &str, data: Value) -> Event {
        let event_type = event_type.to_owned();
        tokio::task::yield_now().await;
        self.emit(&event_type, data)
    }

    fn dispatch(&self, event: &mut Event) {
        let depth = self.inner.depth.get();
        if depth >= self.inner.max_depth {
            warn!(
                event_type = event.event_type(),
                depth, "emit depth ceiling reached, dropping event"
            );
            event.prevent_default();
            let mut stats = self.inner.stats.borrow_mut();
            stats.dropped = stats.dropped.saturating_add(1);
            return;
        }

        let chain: Vec<Middleware> = self.inner.middleware.borrow().clone();
        for mw in &chain {
            if !mw(event) {
                debug!(event_type = event.event_type(), "event vetoed by middleware");
                let mut stats = self.inner.stats.borrow_mut();
                stats.vetoed = stats.vetoed.saturating_add(1);
                return;
            }
        }

        self.inner.history.borrow_mut().push(event.clone());
        {
            let mut stats = self.inner.stats.borrow_mut();
            stats.emitted = stats.emitted.saturating_add(1);
            let counter = stats.per_type.entry(event.event_type().to_owned()).or_insert(0);
            *counter = counter.saturating_add(1);
        }

        let targets = self.inner.registry.borrow().targets(event.event_type());

        self.inner.depth.set(depth.saturating_add(1));
        for registration in targets {
            if event.is_stopped() {
                break;
            }
            if !registration.active.get() {
                continue;
            }
            if registration.once {
                registration.active.set(false);
                self.inner
                    .registry
                    .borrow_mut()
                    .remove_sequence(&registration.key, registration.sequence);
            }
            if let Err(fault) = invoke(&registration.listener, event) {
                self.report_fault(event, &registration.key, &fault);
            }
        }
        self.inner.depth.set(depth);
    }

    /// Log a listener fault and raise the nested `error` event.
    ///
    /// Faults raised while delivering an `error` event are only logged, so
    /// a failing error handler cannot feed itself.
    fn report_fault(&self, event: &Event, key: &str, fault: &ListenerFault) {
        {
            let mut stats = self.inner.stats.borrow_mut();
            stats.faults = stats.faults.saturating_add(1);
        }
        error!(
            event_type = event.event_type(),
            listener = key,
            error = %fault,
            "listener fault"
        );
        if event.event_type() == topics::ERROR {
            return;
        }
        self.emit(
            topics::ERROR,
            json!({
                "source_event": event.event_type(),
                "source_id": event.id().to_string(),
                "listener": key,
                "message": fault.message,
            }),
        );
    }

    // -----------------------------------------------------------------------
    // History and stats
    // -----------------------------------------------------------------------

    /// Recent events, oldest first. `filter` is an event type or pattern.
    pub fn history(&self, filter: Option<&str>, limit: Option<usize>) -> Vec<Event> {
        let pattern = filter.and_then(|key| Pattern::parse(key).ok());
        if filter.is_some() && pattern.is_none() {
            return Vec::new();
        }
        self.inner.history.borrow().query(pattern.as_ref(), limit)
    }

    /// The most recent retained event of exactly `event_type`.
    pub fn last_event(&self, event_type: &str) -> Option<Event> {
        self.inner.history.borrow().last_of(event_type).cloned()
    }

    /// Drop all retained history.
    pub fn clear_history(&self) {
        self.inner.history.borrow_mut().clear();
    }

    /// Snapshot of delivery counters.
    pub fn stats(&self) -> BusStats {
        self.inner.stats.borrow().clone()
    }

    // -----------------------------------------------------------------------
    // Awaiting
    // -----------------------------------------------------------------------

    /// Resolve with the next event of `event_type`, or fail with
    /// [`BusError::Timeout`] once `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`BusError::Timeout`] when nothing arrives in time;
    /// [`BusError::Cancelled`] when the waiting registration is removed
    /// externally (e.g. by [`unsubscribe_all`](Self::unsubscribe_all)).
    pub async fn wait_for(&self, event_type: &str, timeout: Duration) -> Result<Event, BusError> {
        let (tx, rx) = oneshot::channel::<Event>();
        let sender = RefCell::new(Some(tx));
        let _registration = CancelOnDrop(self.subscribe_once(
            event_type,
            listener(move |event: &mut Event| {
                if let Some(tx) = sender.borrow_mut().take() {
                    let _ = tx.send(event.clone());
                }
                Ok(())
            }),
        ));

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_closed)) => Err(BusError::Cancelled {
                event_type: event_type.to_owned(),
            }),
            Err(_elapsed) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                debug!(event_type, timeout_ms, "wait_for timed out");
                Err(BusError::Timeout {
                    event_type: event_type.to_owned(),
                    timeout_ms,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Combinators
    // -----------------------------------------------------------------------

    /// Re-emit every event matching `source` as `target`, with the payload
    /// optionally transformed.
    ///
    /// # Errors
    ///
    /// [`BusError::PipeLoop`] if `target` itself matches `source`;
    /// [`BusError::InvalidPattern`] if `source` is malformed.
    pub fn pipe(
        &self,
        source: &str,
        target: &str,
        transform: Option<Transform>,
    ) -> Result<Subscription, BusError> {
        let pattern = Pattern::parse(source)?;
        if pattern.matches(target) {
            return Err(BusError::PipeLoop {
                source_pattern: source.to_owned(),
                target: target.to_owned(),
            });
        }

        let bus = Rc::downgrade(&self.inner);
        let target = target.to_owned();
        Ok(self.subscribe(
            source,
            listener(move |event: &mut Event| {
                let Some(inner) = bus.upgrade() else {
                    return Ok(());
                };
                let data = transform
                    .as_ref()
                    .map_or_else(|| event.data().clone(), |f| f(event.data()));
                EventBus { inner }.emit(&target, data);
                Ok(())
            }),
        ))
    }

    fn add_timer(&self, poll: TimerPoll) -> u64 {
        let id = self.next_sequence();
        self.inner.timers.borrow_mut().push(TimerTask { id, poll });
        id
    }

    fn with_timer(&self, subscription: Subscription, timer: u64) -> Subscription {
        Subscription {
            timer: Some(timer),
            ..subscription
        }
    }

    /// Deliver a combinator-held event to its listener, reporting faults.
    fn deliver(&self, key: &str, target: &Listener, mut event: Event) {
        if let Err(fault) = invoke(target, &mut event) {
            self.report_fault(&event, key, &fault);
        }
    }

    /// Deliver only the last event of each burst, after `delay` of quiet.
    pub fn debounce(&self, event_type: &str, target: Listener, delay: Duration) -> Subscription {
        let state = Rc::new(RefCell::new(Debouncer::new(duration_ms(delay))));

        let feed = Rc::clone(&state);
        let clock = Rc::clone(&self.inner.clock);
        let subscription = self.subscribe(
            event_type,
            listener(move |event: &mut Event| {
                feed.borrow_mut().on_event(event.clone(), clock.now_ms());
                Ok(())
            }),
        );

        let key = event_type.to_owned();
        let timer = self.add_timer(Rc::new(move |bus: &EventBus, now: u64| {
            let due = state.borrow_mut().poll(now);
            due.map_or(0, |event| {
                bus.deliver(&key, &target, event);
                1
            })
        }));
        self.with_timer(subscription, timer)
    }

    /// Deliver at most one event per `interval`, with a guaranteed trailing
    /// delivery of the last throttled event.
    pub fn throttle(&self, event_type: &str, target: Listener, interval: Duration) -> Subscription {
        let state = Rc::new(RefCell::new(Throttler::new(duration_ms(interval))));

        let feed = Rc::clone(&state);
        let clock = Rc::clone(&self.inner.clock);
        let leading = Rc::clone(&target);
        let subscription = self.subscribe(
            event_type,
            listener(move |event: &mut Event| {
                let pass = feed.borrow_mut().on_event(event.clone(), clock.now_ms());
                match pass {
                    Some(mut passed) => leading(&mut passed),
                    None => Ok(()),
                }
            }),
        );

        let key = event_type.to_owned();
        let timer = self.add_timer(Rc::new(move |bus: &EventBus, now: u64| {
            let due = state.borrow_mut().poll(now);
            due.map_or(0, |event| {
                bus.deliver(&key, &target, event);
                1
            })
        }));
        self.with_timer(subscription, timer)
    }

    /// Collect events arriving within `window` and deliver them together.
    pub fn batch(&self, event_type: &str, target: BatchListener, window: Duration) -> Subscription {
        let state = Rc::new(RefCell::new(Batcher::new(duration_ms(window))));

        let feed = Rc::clone(&state);
        let clock = Rc::clone(&self.inner.clock);
        let subscription = self.subscribe(
            event_type,
            listener(move |event: &mut Event| {
                feed.borrow_mut().on_event(event.clone(), clock.now_ms());
                Ok(())
            }),
        );

        let key = event_type.to_owned();
        let timer = self.add_timer(Rc::new(move |bus: &EventBus, now: u64| {
            let due = state.borrow_mut().poll(now);
            let Some(events) = due else {
                return 0;
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| target(&events)))
                .unwrap_or_else(|payload| Err(fault_from_panic(payload.as_ref())));
            if let Err(fault) = outcome {
                let probe = Event::new(key.as_str(), json!({ "batch_size": events.len() }));
                bus.report_fault(&probe, &key, &fault);
            }
            1
        }));
        self.with_timer(subscription, timer)
    }

    /// Flush every combinator whose window has elapsed. Returns the number
    /// of deliveries made. The runtime loop calls this once per scheduler
    /// turn; tests call it after advancing a virtual clock.
    pub fn run_due_timers(&self) -> usize {
        let now = self.now_ms();
        let polls: Vec<TimerPoll> = self
            .inner
            .timers
            .borrow()
            .iter()
            .map(|t| Rc::clone(&t.poll))
            .collect();
        polls
            .iter()
            .map(|poll| poll(self, now))
            .fold(0usize, usize::saturating_add)
    }

    /// Number of live combinator timers.
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Run a listener, converting a panic into a [`ListenerFault`].
fn invoke(target: &Listener, event: &mut Event) -> ListenerResult {
    catch_unwind(AssertUnwindSafe(|| target(event)))
        .unwrap_or_else(|payload| Err(fault_from_panic(payload.as_ref())))
}

fn fault_from_panic(payload: &(dyn std::any::Any + Send)) -> ListenerFault {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(
            || ListenerFault::new("listener panicked"),
            |msg| ListenerFault::new(format!("listener panicked: {msg}")),
        )
}

//! The agent runtime: registry, lifecycle and the decision cycle.
//!
//! The runtime owns every registered mind (type-erased behind a private
//! driver) in registration order. Each call to [`AgentRuntime::tick`] runs
//! one decision cycle for every running mind whose update interval has
//! elapsed:
//!
//! 1. **Perceive** -- the mind snapshots world fields and counters; the
//!    runtime rotates current into previous.
//! 2. **Propose** -- the mind lists candidate actions.
//! 3. **Score** -- each candidate is scored and clamped to `[0, 1]`.
//! 4. **Select** -- deterministic argmax, first proposed wins ties.
//! 5. **Execute** -- the only step that mutates, emits or calls the stage.
//! 6. **Reward** -- recorded in the mind's [`AgentStatus`].
//!
//! Bus events reach a mind through the patterns it declares. An event that
//! arrives while that same mind is busy (mid-cycle, mid-message, or
//! handling another event) is queued in the mind's inbox and delivered as
//! soon as the mind is free again.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use chorus_bus::{Listener, ListenerFault, Subscription, listener};
use chorus_types::{Event, Lifecycle, topics};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::mind::{Message, Mind, clamp_score, select};
use crate::perception::Perceptions;

/// Upper bound on deferred events delivered in one drain.
const MAX_DEFERRED_PER_DRAIN: usize = 256;

/// Errors surfaced by runtime operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// A mind with this id is already registered.
    #[error("agent {id} is already registered")]
    DuplicateAgent {
        /// The conflicting id.
        id: String,
    },

    /// No mind with this id is registered.
    #[error("agent {id} is not registered")]
    UnknownAgent {
        /// The requested id.
        id: String,
    },

    /// The operation requires a running mind.
    #[error("agent {id} is not running")]
    NotRunning {
        /// The stopped agent.
        id: String,
    },

    /// The mind is already in use further up the call stack.
    #[error("agent {id} is busy")]
    Busy {
        /// The busy agent.
        id: String,
    },

    /// The mind refused an inbound message.
    #[error("agent {agent} rejected message {topic}: {reason}")]
    MessageRejected {
        /// The receiving agent.
        agent: String,
        /// The message topic.
        topic: String,
        /// The mind's error.
        reason: String,
    },
}

/// Observable state of one registered mind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    /// Agent id.
    pub id: String,
    /// Agent kind.
    pub kind: String,
    /// Current lifecycle state.
    pub lifecycle: Lifecycle,
    /// Current energy, `[0, 1]`.
    pub energy: f64,
    /// Completed decision cycles.
    pub cycles: u64,
    /// Label of the last executed action.
    pub last_action: Option<String>,
    /// Clamped score of the last executed action.
    pub last_score: Option<f64>,
    /// Reward of the last cycle.
    pub last_reward: Option<f64>,
    /// Events waiting in the inbox.
    pub deferred_events: usize,
}

/// Outcome of one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// Agent id.
    pub agent: String,
    /// Label of the executed action, if one was selected.
    pub action: Option<String>,
    /// Its clamped score.
    pub score: Option<f64>,
    /// Reward computed after execution.
    pub reward: f64,
    /// Execution error, if the action failed.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Type-erased driver
// ---------------------------------------------------------------------------

trait Driven {
    fn kind(&self) -> String;
    fn update_rate_hz(&self) -> f64;
    fn subscriptions(&self) -> Vec<String>;
    fn energy(&self) -> f64;
    fn start(&mut self, ctx: &Context);
    fn stop(&mut self, ctx: &Context);
    fn cycle(&mut self, agent: &str, ctx: &Context) -> CycleReport;
    fn deliver(&mut self, event: &Event, ctx: &Context) -> Result<(), String>;
    fn message(&mut self, message: &Message, ctx: &Context) -> Result<(), String>;
}

struct Driver<M> {
    mind: M,
    perceptions: Perceptions,
}

impl<M: Mind> Driven for Driver<M> {
    fn kind(&self) -> String {
        self.mind.kind().to_owned()
    }

    fn update_rate_hz(&self) -> f64 {
        self.mind.update_rate_hz()
    }

    fn subscriptions(&self) -> Vec<String> {
        self.mind.subscriptions()
    }

    fn energy(&self) -> f64 {
        self.mind.energy()
    }

    fn start(&mut self, ctx: &Context) {
        self.perceptions = Perceptions::new();
        self.mind.on_start(ctx);
    }

    fn stop(&mut self, ctx: &Context) {
        self.mind.on_stop(ctx);
    }

    fn cycle(&mut self, agent: &str, ctx: &Context) -> CycleReport {
        let percept = self.mind.perceive(ctx);
        self.perceptions.rotate(percept);

        let candidates = self.mind.possible_actions(&self.perceptions);
        let proposed = candidates.len();
        let scored: Vec<(M::Action, f64)> = candidates
            .into_iter()
            .map(|action| {
                let score = clamp_score(self.mind.evaluate_action(&self.perceptions, &action));
                (action, score)
            })
            .collect();

        let mut report = CycleReport {
            agent: agent.to_owned(),
            action: None,
            score: None,
            reward: 0.0,
            error: None,
        };

        if let Some((action, score)) = select(scored) {
            let label = self.mind.describe(&action);
            debug!(agent, action = %label, score, proposed, "action selected");
            if let Err(err) = self.mind.execute_action(action, ctx) {
                report.error = Some(err.to_string());
            }
            report.action = Some(label);
            report.score = Some(score);
        }

        report.reward = self.mind.calculate_reward(&self.perceptions);
        report
    }

    fn deliver(&mut self, event: &Event, ctx: &Context) -> Result<(), String> {
        self.mind.on_event(event, ctx).map_err(|e| e.to_string())
    }

    fn message(&mut self, message: &Message, ctx: &Context) -> Result<(), String> {
        self.mind
            .handle_message(message, ctx)
            .map_err(|e| e.to_string())
    }
}

type SharedDriver = Rc<RefCell<dyn Driven>>;
type Inbox = Rc<RefCell<VecDeque<Event>>>;

struct Slot {
    id: String,
    kind: String,
    driver: SharedDriver,
    inbox: Inbox,
    lifecycle: Lifecycle,
    subscriptions: Vec<Subscription>,
    interval_ms: Option<u64>,
    last_cycle_ms: Option<u64>,
    cycles: u64,
    last_action: Option<String>,
    last_score: Option<f64>,
    last_reward: Option<f64>,
}

impl Slot {
    fn status(&self) -> AgentStatus {
        AgentStatus {
            id: self.id.clone(),
            kind: self.kind.clone(),
            lifecycle: self.lifecycle,
            energy: self.driver.try_borrow().map_or(0.0, |d| d.energy()),
            cycles: self.cycles,
            last_action: self.last_action.clone(),
            last_score: self.last_score,
            last_reward: self.last_reward,
            deferred_events: self.inbox.borrow().len(),
        }
    }

    fn is_due(&self, now_ms: u64) -> bool {
        self.lifecycle == Lifecycle::Running
            && self.interval_ms.is_some_and(|interval| {
                self.last_cycle_ms
                    .is_none_or(|last| now_ms.saturating_sub(last) >= interval)
            })
    }

    fn busy(&self) -> RuntimeError {
        RuntimeError::Busy {
            id: self.id.clone(),
        }
    }

    fn busy_from(&self, source: &impl core::fmt::Display) -> RuntimeError {
        debug!(agent = %self.id, %source, "agent in use further up the stack");
        self.busy()
    }
}

/// Interval between cycles for a rate in Hz; `None` disables cycling.
fn interval_ms(rate_hz: f64) -> Option<u64> {
    if rate_hz.is_finite() && rate_hz > 0.0 {
        Duration::try_from_secs_f64(rate_hz.recip())
            .ok()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    } else {
        None
    }
}

/// Report a fault raised outside normal listener delivery.
fn report_fault(ctx: &Context, agent: &str, source_event: &str, message: &str) {
    warn!(agent, source_event, error = message, "agent fault");
    ctx.bus.emit(
        topics::ERROR,
        json!({
            "source_event": source_event,
            "listener": agent,
            "agent": agent,
            "message": message,
        }),
    );
}

/// Deliver queued events once the driver is free.
fn drain_inbox(
    agent: &str,
    driver: &RefCell<dyn Driven>,
    inbox: &RefCell<VecDeque<Event>>,
    ctx: &Context,
) {
    let mut delivered = 0usize;
    while delivered < MAX_DEFERRED_PER_DRAIN {
        let next = inbox.borrow_mut().pop_front();
        let Some(event) = next else {
            return;
        };
        let Ok(mut d) = driver.try_borrow_mut() else {
            inbox.borrow_mut().push_front(event);
            return;
        };
        let result = d.deliver(&event, ctx);
        drop(d);
        if let Err(reason) = result {
            report_fault(ctx, agent, event.event_type(), &reason);
        }
        delivered = delivered.saturating_add(1);
    }
    warn!(
        agent,
        remaining = inbox.borrow().len(),
        "deferred event drain limit reached"
    );
}

fn event_listener(
    agent: String,
    driver: Weak<RefCell<dyn Driven>>,
    inbox: Inbox,
    ctx: Context,
) -> Listener {
    listener(move |event: &mut Event| {
        let Some(driver) = driver.upgrade() else {
            return Ok(());
        };
        let result = match driver.try_borrow_mut() {
            Ok(mut d) => d.deliver(event, &ctx),
            Err(_) => {
                debug!(
                    agent = %agent,
                    event_type = event.event_type(),
                    "agent busy, deferring event"
                );
                inbox.borrow_mut().push_back(event.clone());
                return Ok(());
            }
        };
        drain_inbox(&agent, &driver, &inbox, &ctx);
        result.map_err(ListenerFault::new)
    })
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Drives registered minds through their lifecycle and decision cycles.
pub struct AgentRuntime {
    ctx: Context,
    slots: Vec<Slot>,
}

impl core::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("agents", &self.ids())
            .finish_non_exhaustive()
    }
}

impl AgentRuntime {
    /// Create an empty runtime over `ctx`.
    pub const fn new(ctx: Context) -> Self {
        Self {
            ctx,
            slots: Vec::new(),
        }
    }

    /// The shared context.
    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.id.clone()).collect()
    }

    /// Number of registered minds.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no minds are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.slots.iter().any(|s| s.id == id)
    }

    fn slot(&self, id: &str) -> Result<&Slot, RuntimeError> {
        self.slots
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| RuntimeError::UnknownAgent { id: id.to_owned() })
    }

    fn slot_mut(&mut self, id: &str) -> Result<&mut Slot, RuntimeError> {
        self.slots
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| RuntimeError::UnknownAgent { id: id.to_owned() })
    }

    /// Register a mind in the stopped state.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::DuplicateAgent`] if the id is taken.
    pub fn register<M>(&mut self, mind: M) -> Result<(), RuntimeError>
    where
        M: Mind + 'static,
    {
        let id = mind.id().to_owned();
        if self.contains(&id) {
            return Err(RuntimeError::DuplicateAgent { id });
        }
        let kind = mind.kind().to_owned();
        let interval = interval_ms(mind.update_rate_hz());
        let driver: SharedDriver = Rc::new(RefCell::new(Driver {
            mind,
            perceptions: Perceptions::new(),
        }));
        info!(agent = %id, kind = %kind, interval_ms = ?interval, "agent registered");
        self.slots.push(Slot {
            id,
            kind,
            driver,
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            lifecycle: Lifecycle::Stopped,
            subscriptions: Vec::new(),
            interval_ms: interval,
            last_cycle_ms: None,
            cycles: 0,
            last_action: None,
            last_score: None,
            last_reward: None,
        });
        Ok(())
    }

    /// Stop (if running) and remove a mind.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownAgent`] if not registered.
    pub fn deregister(&mut self, id: &str) -> Result<(), RuntimeError> {
        self.stop(id)?;
        self.slots.retain(|s| s.id != id);
        info!(agent = id, "agent deregistered");
        Ok(())
    }

    /// Start a mind: run its entry hook and subscribe its patterns.
    ///
    /// Returns `false` if it was already running.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownAgent`] or [`RuntimeError::Busy`].
    pub fn start(&mut self, id: &str) -> Result<bool, RuntimeError> {
        let ctx = self.ctx.clone();
        let slot = self.slot_mut(id)?;
        if slot.lifecycle == Lifecycle::Running {
            debug!(agent = id, "start ignored, already running");
            return Ok(false);
        }

        slot.driver
            .try_borrow_mut()
            .map_err(|e| slot.busy_from(&e))?
            .start(&ctx);

        let patterns = slot
            .driver
            .try_borrow()
            .map_err(|e| slot.busy_from(&e))?
            .subscriptions();
        for pattern in patterns {
            let subscription = ctx.bus.subscribe(
                &pattern,
                event_listener(
                    slot.id.clone(),
                    Rc::downgrade(&slot.driver),
                    Rc::clone(&slot.inbox),
                    ctx.clone(),
                ),
            );
            if !subscription.is_active() {
                warn!(agent = id, pattern = %pattern, "agent subscription rejected");
            }
            slot.subscriptions.push(subscription);
        }
        slot.lifecycle = Lifecycle::Running;
        slot.last_cycle_ms = None;

        info!(agent = id, kind = %slot.kind, "agent started");
        let payload = json!({ "id": slot.id, "kind": slot.kind });
        drain_inbox(&slot.id, &slot.driver, &slot.inbox, &ctx);
        ctx.bus.emit(topics::AGENT_STARTED, payload);
        Ok(true)
    }

    /// Stop a mind: cancel its subscriptions and run its exit hook.
    ///
    /// Returns `false` if it was already stopped.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownAgent`] or [`RuntimeError::Busy`].
    pub fn stop(&mut self, id: &str) -> Result<bool, RuntimeError> {
        let ctx = self.ctx.clone();
        let slot = self.slot_mut(id)?;
        if slot.lifecycle == Lifecycle::Stopped {
            debug!(agent = id, "stop ignored, already stopped");
            return Ok(false);
        }

        for subscription in slot.subscriptions.drain(..) {
            subscription.cancel();
        }
        slot.inbox.borrow_mut().clear();
        slot.driver
            .try_borrow_mut()
            .map_err(|e| slot.busy_from(&e))?
            .stop(&ctx);
        slot.lifecycle = Lifecycle::Stopped;

        info!(agent = id, kind = %slot.kind, "agent stopped");
        ctx.bus
            .emit(topics::AGENT_STOPPED, json!({ "id": slot.id, "kind": slot.kind }));
        Ok(true)
    }

    /// Start every registered mind in registration order. Returns how many
    /// were started.
    pub fn start_all(&mut self) -> usize {
        self.ids()
            .iter()
            .filter(|id| self.start(id).unwrap_or(false))
            .count()
    }

    /// Stop every registered mind in registration order. Returns how many
    /// were stopped.
    pub fn stop_all(&mut self) -> usize {
        self.ids()
            .iter()
            .filter(|id| self.stop(id).unwrap_or(false))
            .count()
    }

    /// Deliver an inbound message immediately.
    ///
    /// Messages reach stopped minds too.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownAgent`], [`RuntimeError::Busy`], or
    /// [`RuntimeError::MessageRejected`] carrying the mind's error.
    pub fn send(&mut self, id: &str, message: &Message) -> Result<(), RuntimeError> {
        let slot = self.slot(id)?;
        let result = slot
            .driver
            .try_borrow_mut()
            .map_err(|e| slot.busy_from(&e))?
            .message(message, &self.ctx);
        drain_inbox(&slot.id, &slot.driver, &slot.inbox, &self.ctx);
        result.map_err(|reason| {
            debug!(agent = id, topic = %message.topic, %reason, "message rejected");
            RuntimeError::MessageRejected {
                agent: id.to_owned(),
                topic: message.topic.clone(),
                reason,
            }
        })
    }

    /// Run one cycle for every running mind whose interval has elapsed, in
    /// registration order.
    pub fn tick(&mut self, now_ms: u64) -> Vec<CycleReport> {
        let ctx = &self.ctx;
        self.slots
            .iter_mut()
            .filter(|slot| slot.is_due(now_ms))
            .filter_map(|slot| run_cycle(slot, ctx, Some(now_ms)))
            .collect()
    }

    /// Force one cycle for every running mind, ignoring update rates.
    ///
    /// Forced cycles do not move the schedule used by [`tick`](Self::tick).
    pub fn cycle_all(&mut self) -> Vec<CycleReport> {
        let ctx = &self.ctx;
        self.slots
            .iter_mut()
            .filter(|slot| slot.lifecycle == Lifecycle::Running)
            .filter_map(|slot| run_cycle(slot, ctx, None))
            .collect()
    }

    /// Force one cycle for a single running mind.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownAgent`], [`RuntimeError::NotRunning`] or
    /// [`RuntimeError::Busy`].
    pub fn cycle(&mut self, id: &str) -> Result<CycleReport, RuntimeError> {
        let ctx = self.ctx.clone();
        let slot = self.slot_mut(id)?;
        if slot.lifecycle != Lifecycle::Running {
            return Err(RuntimeError::NotRunning { id: id.to_owned() });
        }
        run_cycle(slot, &ctx, None).ok_or_else(|| slot.busy())
    }

    /// Status of one mind.
    pub fn status(&self, id: &str) -> Option<AgentStatus> {
        self.slot(id).ok().map(Slot::status)
    }

    /// Status of every mind in registration order.
    pub fn statuses(&self) -> Vec<AgentStatus> {
        self.slots.iter().map(Slot::status).collect()
    }
}

fn run_cycle(slot: &mut Slot, ctx: &Context, now_ms: Option<u64>) -> Option<CycleReport> {
    let report = {
        let Ok(mut driver) = slot.driver.try_borrow_mut() else {
            warn!(agent = %slot.id, "cycle skipped, agent busy");
            return None;
        };
        driver.cycle(&slot.id, ctx)
    };

    slot.cycles = slot.cycles.saturating_add(1);
    if now_ms.is_some() {
        slot.last_cycle_ms = now_ms;
    }
    slot.last_reward = Some(report.reward);
    if report.action.is_some() {
        slot.last_action.clone_from(&report.action);
        slot.last_score = report.score;
    }
    if let Some(reason) = &report.error {
        report_fault(ctx, &slot.id, "agent.cycle", reason);
    }

    drain_inbox(&slot.id, &slot.driver, &slot.inbox, ctx);
    Some(report)
}

impl Drop for AgentRuntime {
    fn drop(&mut self) {
        // Listeners hold the context, which holds the bus; cancelling breaks
        // the reference cycle.
        for slot in &mut self.slots {
            for subscription in slot.subscriptions.drain(..) {
                subscription.cancel();
            }
        }
    }
}

//! The [`Mind`] trait and the pure pieces of the decision cycle.
//!
//! A mind is one autonomous decision maker. The runtime drives it through
//! perceive, propose, score, select, execute and reward; the mind supplies
//! each step. Only [`Mind::execute_action`], the bus handler
//! [`Mind::on_event`] and [`Mind::handle_message`] take `&mut self`, so
//! proposal and scoring cannot have side effects.

use core::fmt;

use chorus_types::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::perception::{Percept, Perceptions};

/// A typed inbound message delivered by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// What the message asks for (`set_root`, `set_energy`, ...).
    pub topic: String,
    /// Topic-specific arguments.
    pub payload: Value,
}

impl Message {
    /// Build a message.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// One autonomous decision maker.
pub trait Mind {
    /// Candidate actions this mind can propose.
    type Action: fmt::Debug;

    /// Error returned by execution, event handling and messages.
    type Error: std::error::Error;

    /// Unique id within a runtime.
    fn id(&self) -> &str;

    /// Kind label (`harmonic`, `recorder`, ...).
    fn kind(&self) -> &str;

    /// Decision cycles per second. Zero or negative disables periodic
    /// cycling; the mind then only reacts to events and messages.
    fn update_rate_hz(&self) -> f64;

    /// Bus patterns the runtime subscribes on start and cancels on stop.
    fn subscriptions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Entry hook, run when the mind starts.
    fn on_start(&mut self, _ctx: &Context) {}

    /// Exit hook, run when the mind stops.
    fn on_stop(&mut self, _ctx: &Context) {}

    /// Read world fields and internal counters into a snapshot.
    fn perceive(&self, ctx: &Context) -> Percept;

    /// Propose candidates for this cycle.
    fn possible_actions(&self, perceptions: &Perceptions) -> Vec<Self::Action>;

    /// Score a candidate. The runtime clamps the result to `[0, 1]`.
    fn evaluate_action(&self, perceptions: &Perceptions, action: &Self::Action) -> f64;

    /// Carry out the selected candidate.
    ///
    /// # Errors
    ///
    /// Mind-specific; the runtime logs it and raises an `error` event.
    fn execute_action(&mut self, action: Self::Action, ctx: &Context) -> Result<(), Self::Error>;

    /// Reward for the cycle that just ran.
    fn calculate_reward(&self, perceptions: &Perceptions) -> f64;

    /// Handle a bus event from one of [`subscriptions`](Self::subscriptions).
    ///
    /// # Errors
    ///
    /// Mind-specific; surfaces as a listener fault.
    fn on_event(&mut self, _event: &Event, _ctx: &Context) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Apply an inbound message.
    ///
    /// # Errors
    ///
    /// Mind-specific, typically an unsupported topic or a bad payload.
    fn handle_message(&mut self, message: &Message, ctx: &Context) -> Result<(), Self::Error>;

    /// Current energy, `[0, 1]`.
    fn energy(&self) -> f64;

    /// Short label for a candidate, used in status and logs.
    fn describe(&self, action: &Self::Action) -> String {
        format!("{action:?}")
    }
}

/// Clamp a raw score to `[0, 1]`; NaN scores count as zero.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Deterministic argmax. The first candidate wins ties; an empty input
/// selects nothing.
pub fn select<A>(scored: impl IntoIterator<Item = (A, f64)>) -> Option<(A, f64)> {
    scored.into_iter().fold(None, |best, (action, score)| match best {
        Some((_, best_score)) if score <= best_score => best,
        _ => Some((action, score)),
    })
}

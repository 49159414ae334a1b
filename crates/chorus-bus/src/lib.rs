//! Publish/subscribe message bus for the Chorus coordination substrate.
//!
//! Every collaborator (agents, the metronome, input adapters, the recorder)
//! talks through one [`EventBus`]. Delivery is synchronous, ordered by
//! descending priority with registration order breaking ties, and isolated:
//! a failing listener never prevents its siblings from running.
//!
//! # Modules
//!
//! - [`bus`] -- The [`EventBus`] itself: subscribe, emit, middleware,
//!   awaiting, pipes, and the timer-driven combinators.
//! - [`clock`] -- Injectable millisecond time sources.
//! - [`combinators`] -- Debounce, throttle and batch state machines.
//! - [`error`] -- [`ListenerFault`] and [`BusError`].
//! - [`history`] -- Bounded ring of recently delivered events.
//! - [`pattern`] -- Dotted event-type patterns with `*` segments.

pub mod bus;
pub mod clock;
pub mod combinators;
pub mod error;
pub mod history;
pub mod pattern;

pub use bus::{
    BatchListener, BusOptions, BusStats, DEFAULT_MAX_EMIT_DEPTH, EventBus, Listener,
    ListenerResult, Middleware, SubscribeOptions, Subscription, Transform, batch_listener,
    listener, middleware,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BusError, ListenerFault};
pub use history::DEFAULT_HISTORY_LIMIT;
pub use pattern::Pattern;

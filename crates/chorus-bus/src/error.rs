//! Error types for the `chorus-bus` crate.
//!
//! Listener faults are ordinary values: a listener returns
//! `Err(ListenerFault)` (or panics, which the bus converts into one) and the
//! bus turns it into a nested `error` event. [`BusError`] covers the few
//! operations that report failure to their caller.

/// Failure raised by a single listener while handling an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ListenerFault {
    /// Human-readable description of what went wrong.
    pub message: String,
}

impl ListenerFault {
    /// Build a fault from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for ListenerFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ListenerFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Errors surfaced by bus operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// No matching event arrived before the deadline.
    #[error("timed out waiting for {event_type} after {timeout_ms}ms")]
    Timeout {
        /// The awaited event type.
        event_type: String,
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The waiting subscription was removed before an event arrived.
    #[error("subscription for {event_type} was removed while waiting")]
    Cancelled {
        /// The awaited event type.
        event_type: String,
    },

    /// A pipe would re-emit into its own source and loop forever.
    #[error("pipe from {source_pattern} to {target} would feed itself")]
    PipeLoop {
        /// The source pattern.
        source_pattern: String,
        /// The target event type.
        target: String,
    },

    /// A pattern string could not be compiled.
    #[error("invalid event pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

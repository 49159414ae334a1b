//! Error types for the chorus-agents crate.
//!
//! Minds return these from event handlers, messages and execution; the
//! runtime turns them into logged faults and `error` events, so none of
//! them stops a mind.

use chorus_core::PersistenceError;

/// Errors raised by the concrete minds.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The mind does not understand this message topic.
    #[error("unsupported message topic: {topic}")]
    UnsupportedMessage {
        /// The rejected topic.
        topic: String,
    },

    /// A message or event payload was missing a field or out of range.
    #[error("invalid payload for {topic}: {reason}")]
    InvalidPayload {
        /// Message topic or event type.
        topic: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The persistence collaborator failed at a checkpoint.
    #[error("persistence failed: {source}")]
    Persistence {
        /// The underlying store error.
        #[from]
        source: PersistenceError,
    },
}

impl AgentError {
    pub(crate) fn invalid(topic: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            topic: topic.to_owned(),
            reason: reason.into(),
        }
    }
}

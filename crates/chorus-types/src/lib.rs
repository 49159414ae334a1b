//! Shared type definitions for the Chorus coordination substrate.
//!
//! This crate is the single source of truth for the data that flows between
//! the message bus, the world state, the agent runtime, and the concrete
//! minds. It performs no I/O and holds no shared state.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for events and recordings
//! - [`enums`] -- Eras, zones, gesture tags, and agent lifecycle states
//! - [`event`] -- The [`Event`] envelope delivered by the bus
//! - [`recording`] -- Captured gesture recordings and their sample points
//! - [`topics`] -- Well-known event type names shared by collaborators

pub mod enums;
pub mod event;
pub mod ids;
pub mod recording;
pub mod topics;

// Re-export all public types at crate root for convenience.
pub use enums::{Era, GestureKind, Lifecycle, Zone};
pub use event::{Event, now_millis};
pub use ids::{EventId, RecordingId};
pub use recording::{GesturePoint, Recording};

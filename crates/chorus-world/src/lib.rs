//! Shared world state for the Chorus coordination substrate.
//!
//! The world is a single JSON document (era, zone, dynamics, energy,
//! tension, plus whatever collaborators choose to publish) addressed by
//! dotted paths. Minds read it during perception; collaborators write it.
//!
//! # Modules
//!
//! - [`error`] -- Error types for document writes.
//! - [`state`] -- [`WorldState`], the shared handle with dotted access and
//!   typed accessors that fall back to documented defaults.

pub mod error;
pub mod state;

pub use error::WorldError;
pub use state::{
    DEFAULT_DYNAMICS, DEFAULT_ENERGY, DEFAULT_TENSION, DYNAMICS, ENERGY, ERA, TENSION, WorldState,
    ZONE,
};

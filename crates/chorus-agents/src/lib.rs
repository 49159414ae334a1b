//! Concrete minds for Chorus.
//!
//! Both minds plug into the `chorus-core` runtime through the `Mind` trait
//! and only touch the outside world through the context they are handed.
//!
//! # Modules
//!
//! - [`error`] -- Error types for mind handlers and messages ([`AgentError`])
//! - [`harmonic`] -- [`HarmonicMind`]: progressions, zone roots, voicings,
//!   filter and mix
//! - [`recorder`] -- [`GestureRecorder`]: gesture capture with a
//!   persistence checkpoint on `gesture.end`
//! - [`theory`] -- Chord, voicing, progression and zone-root tables

pub mod error;
pub mod harmonic;
pub mod recorder;
pub mod theory;

pub use error::AgentError;
pub use harmonic::{HarmonicAction, HarmonicMind, PAD_BUS};
pub use recorder::GestureRecorder;
pub use theory::{
    ChordQuality, DEFAULT_ROOT_HZ, Progression, ProgressionCursor, ProgressionStep, Voicing,
    find_progression, repertoire, zone_root_hz,
};

//! Agent runtime, metronome and orchestration for Chorus.
//!
//! This crate owns the decision cycle every mind runs (perceive, propose,
//! score, select, execute, reward), the registry that drives minds through
//! their lifecycle, the collaborator interfaces minds act through, and the
//! async loop that ties the metronome, the bus timer queue and the runtime
//! together.
//!
//! # Modules
//!
//! - [`clock`] -- [`Metronome`]: step/beat/bar counter publishing on the bus.
//! - [`config`] -- Configuration loading from `chorus-config.yaml` into
//!   strongly-typed structs.
//! - [`context`] -- [`Context`]: the bus, world and stage handed to minds.
//! - [`control`] -- Pause/resume/stop and loop boundaries.
//! - [`mind`] -- The [`Mind`] trait, inbound [`Message`]s, scoring helpers.
//! - [`perception`] -- Current/previous snapshots with change detection.
//! - [`persistence`] -- Recording storage collaborator and its backends.
//! - [`runner`] -- The async run loop.
//! - [`runtime`] -- [`AgentRuntime`]: registry, lifecycle, decision cycle.
//! - [`stage`] -- The audio/visual collaborator and its no-op and
//!   recording implementations.
//!
//! [`Metronome`]: clock::Metronome
//! [`Context`]: context::Context
//! [`Mind`]: mind::Mind
//! [`Message`]: mind::Message
//! [`AgentRuntime`]: runtime::AgentRuntime

pub mod clock;
pub mod config;
pub mod context;
pub mod control;
pub mod mind;
pub mod perception;
pub mod persistence;
pub mod runner;
pub mod runtime;
pub mod stage;

pub use clock::{ClockError, Metronome, Pulse};
pub use config::{ChorusConfig, ConfigError, LogFormat};
pub use context::Context;
pub use control::{EndReason, RuntimeControl};
pub use mind::{Message, Mind};
pub use perception::{Percept, Perceptions};
pub use persistence::{
    JsonFilePersistence, MemoryPersistence, Persistence, PersistenceError, recording_store,
};
pub use runner::{NoOpHook, RunResult, RunnerError, TurnHook, run};
pub use runtime::{AgentRuntime, AgentStatus, CycleReport, RuntimeError};
pub use stage::{NullStage, RecordingStage, Stage, StageCall, VoiceHandle};

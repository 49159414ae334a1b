//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can stop startup or the run
//! loop, so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: chorus_core::ConfigError,
    },

    /// Metronome construction failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: chorus_core::ClockError,
    },

    /// Registering or starting a mind failed.
    #[error("runtime error: {source}")]
    Runtime {
        /// The underlying runtime error.
        #[from]
        source: chorus_core::RuntimeError,
    },

    /// The run loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: chorus_core::RunnerError,
    },
}

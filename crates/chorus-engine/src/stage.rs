//! A [`Stage`] that writes every call to the log.
//!
//! The engine has no audio or graphics backend; this stage stands in for
//! one so a session can be followed from the trace output.

use std::cell::Cell;

use chorus_core::{Stage, VoiceHandle};
use serde_json::Value;
use tracing::{debug, trace};

/// Traces stage calls instead of producing sound or visuals.
#[derive(Debug, Default)]
pub struct LogStage {
    next: Cell<u64>,
}

impl LogStage {
    /// Create a log stage.
    pub const fn new() -> Self {
        Self { next: Cell::new(1) }
    }

    fn handle(&self) -> VoiceHandle {
        let id = self.next.get();
        self.next.set(id.wrapping_add(1));
        VoiceHandle(id)
    }
}

impl Stage for LogStage {
    fn start_tone(&self, frequency_hz: f64, gain: f64) -> VoiceHandle {
        let handle = self.handle();
        debug!(voice = handle.0, frequency_hz, gain, "tone start");
        handle
    }

    fn stop_tone(&self, handle: VoiceHandle) {
        debug!(voice = handle.0, "tone stop");
    }

    fn play_chord(&self, frequencies_hz: &[f64], gain: f64) -> VoiceHandle {
        let handle = self.handle();
        debug!(voice = handle.0, ?frequencies_hz, gain, "chord");
        handle
    }

    fn stop_chord(&self, handle: VoiceHandle) {
        debug!(voice = handle.0, "chord release");
    }

    fn set_filter_cutoff(&self, cutoff_hz: f64) {
        trace!(cutoff_hz, "filter");
    }

    fn set_mix_level(&self, bus: &str, level: f64) {
        trace!(bus, level, "mix");
    }

    fn visual_cue(&self, cue: &str, params: &Value) {
        trace!(cue, %params, "visual cue");
    }
}

//! The audio/visual collaborator interface.
//!
//! Minds never synthesize sound or draw anything themselves. They call a
//! [`Stage`], which is fire-and-forget: no call returns an error, and a
//! missing backend is represented by [`NullStage`], so an action degrades
//! to a state-only update instead of failing the cycle.

use std::cell::{Cell, RefCell};

use serde_json::Value;

/// Opaque handle to a sounding tone or chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceHandle(pub u64);

/// Audio/visual output collaborator.
pub trait Stage {
    /// Start a sustained tone. Returns a handle for [`stop_tone`](Self::stop_tone).
    fn start_tone(&self, frequency_hz: f64, gain: f64) -> VoiceHandle;

    /// Stop a tone started with [`start_tone`](Self::start_tone).
    fn stop_tone(&self, handle: VoiceHandle);

    /// Sound a chord made of the given frequencies.
    fn play_chord(&self, frequencies_hz: &[f64], gain: f64) -> VoiceHandle;

    /// Release a chord started with [`play_chord`](Self::play_chord).
    fn stop_chord(&self, handle: VoiceHandle);

    /// Move the master low-pass filter.
    fn set_filter_cutoff(&self, cutoff_hz: f64);

    /// Set the output level of the named mix bus.
    fn set_mix_level(&self, bus: &str, level: f64);

    /// Trigger a named visual cue.
    fn visual_cue(&self, cue: &str, params: &Value);
}

/// A stage that does nothing; used when no output backend is attached.
#[derive(Debug, Default)]
pub struct NullStage {
    next: Cell<u64>,
}

impl NullStage {
    /// Create a no-op stage.
    pub const fn new() -> Self {
        Self { next: Cell::new(0) }
    }

    fn handle(&self) -> VoiceHandle {
        let id = self.next.get();
        self.next.set(id.wrapping_add(1));
        VoiceHandle(id)
    }
}

impl Stage for NullStage {
    fn start_tone(&self, _frequency_hz: f64, _gain: f64) -> VoiceHandle {
        self.handle()
    }

    fn stop_tone(&self, _handle: VoiceHandle) {}

    fn play_chord(&self, _frequencies_hz: &[f64], _gain: f64) -> VoiceHandle {
        self.handle()
    }

    fn stop_chord(&self, _handle: VoiceHandle) {}

    fn set_filter_cutoff(&self, _cutoff_hz: f64) {}

    fn set_mix_level(&self, _bus: &str, _level: f64) {}

    fn visual_cue(&self, _cue: &str, _params: &Value) {}
}

/// One call received by a [`RecordingStage`].
#[derive(Debug, Clone, PartialEq)]
pub enum StageCall {
    /// [`Stage::start_tone`].
    StartTone {
        /// Returned handle.
        handle: VoiceHandle,
        /// Requested frequency.
        frequency_hz: f64,
    },
    /// [`Stage::stop_tone`].
    StopTone(VoiceHandle),
    /// [`Stage::play_chord`].
    PlayChord {
        /// Returned handle.
        handle: VoiceHandle,
        /// Requested frequencies.
        frequencies_hz: Vec<f64>,
    },
    /// [`Stage::stop_chord`].
    StopChord(VoiceHandle),
    /// [`Stage::set_filter_cutoff`].
    FilterCutoff(f64),
    /// [`Stage::set_mix_level`].
    MixLevel {
        /// Mix bus name.
        bus: String,
        /// Requested level.
        level: f64,
    },
    /// [`Stage::visual_cue`].
    VisualCue(String),
}

/// A stage that remembers every call, for assertions.
#[derive(Debug, Default)]
pub struct RecordingStage {
    calls: RefCell<Vec<StageCall>>,
    inner: NullStage,
}

impl RecordingStage {
    /// Create an empty recording stage.
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls received so far, oldest first.
    pub fn calls(&self) -> Vec<StageCall> {
        self.calls.borrow().clone()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    /// The most recent chord frequencies played.
    pub fn last_chord(&self) -> Option<Vec<f64>> {
        self.calls.borrow().iter().rev().find_map(|call| match call {
            StageCall::PlayChord { frequencies_hz, .. } => Some(frequencies_hz.clone()),
            _ => None,
        })
    }

    fn record(&self, call: StageCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Stage for RecordingStage {
    fn start_tone(&self, frequency_hz: f64, _gain: f64) -> VoiceHandle {
        let handle = self.inner.handle();
        self.record(StageCall::StartTone {
            handle,
            frequency_hz,
        });
        handle
    }

    fn stop_tone(&self, handle: VoiceHandle) {
        self.record(StageCall::StopTone(handle));
    }

    fn play_chord(&self, frequencies_hz: &[f64], _gain: f64) -> VoiceHandle {
        let handle = self.inner.handle();
        self.record(StageCall::PlayChord {
            handle,
            frequencies_hz: frequencies_hz.to_vec(),
        });
        handle
    }

    fn stop_chord(&self, handle: VoiceHandle) {
        self.record(StageCall::StopChord(handle));
    }

    fn set_filter_cutoff(&self, cutoff_hz: f64) {
        self.record(StageCall::FilterCutoff(cutoff_hz));
    }

    fn set_mix_level(&self, bus: &str, level: f64) {
        self.record(StageCall::MixLevel {
            bus: bus.to_owned(),
            level,
        });
    }

    fn visual_cue(&self, cue: &str, _params: &Value) {
        self.record(StageCall::VisualCue(cue.to_owned()));
    }
}

//! Well-known event type names.
//!
//! Collaborators and minds agree on these strings; the bus itself treats
//! every event type as an opaque dotted string.

/// Nested fault event emitted by the bus when a listener fails.
pub const ERROR: &str = "error";

/// Clock collaborator: one per beat, payload `{beat, bar}`.
pub const BEAT: &str = "beat";
/// Clock collaborator: one per sequencer step, payload `{step}`.
pub const STEP: &str = "step";
/// Clock collaborator: one per bar boundary, payload `{bar}`.
pub const BAR: &str = "bar";

/// Sensor collaborator: gesture began.
pub const GESTURE_START: &str = "gesture.start";
/// Sensor collaborator: gesture moved.
pub const GESTURE_MOVE: &str = "gesture.move";
/// Sensor collaborator: gesture ended.
pub const GESTURE_END: &str = "gesture.end";
/// Pattern covering every gesture event.
pub const GESTURE_ANY: &str = "gesture.*";

/// Spatial zone entered, payload `{zone}`.
pub const ZONE_ENTER: &str = "zone.enter";
/// Spatial zone left, payload `{zone}`.
pub const ZONE_EXIT: &str = "zone.exit";

/// Harmonic mind: the active chord changed.
pub const CHORD_CHANGE: &str = "chord.change";
/// Harmonic mind: the root moved.
pub const ROOT_CHANGE: &str = "harmony.root";
/// Harmonic mind: voicing rotated.
pub const VOICING_CHANGE: &str = "harmony.voicing";
/// Harmonic mind: progression switched.
pub const PROGRESSION_CHANGE: &str = "harmony.progression";

/// Recorder: a recording was finalized and handed to persistence.
pub const RECORDING_SAVED: &str = "recording.saved";

/// Runtime: an agent started cycling.
pub const AGENT_STARTED: &str = "agent.started";
/// Runtime: an agent stopped cycling.
pub const AGENT_STOPPED: &str = "agent.stopped";

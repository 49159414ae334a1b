//! The metronome: the clock collaborator every mind listens to.
//!
//! The metronome is the single source of musical time. It counts steps
//! (sub-beat pulses), derives beats and bars from the step counter, and
//! publishes them on the bus:
//!
//! - `step {step}` on every step,
//! - `beat {beat, bar}` on every `steps_per_beat`-th step,
//! - `bar {bar}` on every `beats_per_bar`-th beat.
//!
//! Counters start at zero, so the very first pulse is the downbeat of bar 0
//! and carries all three events. All derivations use checked arithmetic.

use chorus_bus::EventBus;
use chorus_types::topics;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ClockConfig;

/// Milliseconds per minute.
const MS_PER_MINUTE: u64 = 60_000;

/// Errors that can occur during metronome operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// Step counter would overflow.
    #[error("step counter overflow: cannot advance beyond u64::MAX")]
    StepOverflow,

    /// Invalid tempo or meter.
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Counters published for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Step index (0-based).
    pub step: u64,
    /// Beat index, present when this step starts a beat.
    pub beat: Option<u64>,
    /// Bar index, present when this step starts a bar.
    pub bar: Option<u64>,
}

/// Step/beat/bar counter driven by wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metronome {
    bpm: u32,
    steps_per_beat: u64,
    beats_per_bar: u64,
    step_interval_ms: u64,
    max_catch_up: u64,
    /// Index of the next step to publish.
    next_step: u64,
    /// Wall-clock time the next step is due, once started.
    next_due_ms: Option<u64>,
}

impl Metronome {
    /// Create a metronome from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] for a zero tempo or meter, or
    /// a tempo so fast the step interval rounds to zero milliseconds.
    pub fn new(config: &ClockConfig) -> Result<Self, ClockError> {
        if config.bpm == 0 {
            return Err(ClockError::InvalidConfig {
                reason: "bpm must be at least 1".to_owned(),
            });
        }
        if config.steps_per_beat == 0 || config.beats_per_bar == 0 {
            return Err(ClockError::InvalidConfig {
                reason: "steps_per_beat and beats_per_bar must be at least 1".to_owned(),
            });
        }

        let pulses_per_minute = u64::from(config.bpm)
            .checked_mul(u64::from(config.steps_per_beat))
            .ok_or_else(|| ClockError::InvalidConfig {
                reason: "tempo overflow".to_owned(),
            })?;
        let step_interval_ms = MS_PER_MINUTE
            .checked_div(pulses_per_minute)
            .filter(|ms| *ms > 0)
            .ok_or_else(|| ClockError::InvalidConfig {
                reason: format!(
                    "{} bpm x {} steps is faster than 1 step per millisecond",
                    config.bpm, config.steps_per_beat
                ),
            })?;

        Ok(Self {
            bpm: config.bpm,
            steps_per_beat: u64::from(config.steps_per_beat),
            beats_per_bar: u64::from(config.beats_per_bar),
            step_interval_ms,
            max_catch_up: u64::from(config.max_catch_up_steps.max(1)),
            next_step: 0,
            next_due_ms: None,
        })
    }

    /// Tempo in beats per minute.
    pub const fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Milliseconds between steps.
    pub const fn step_interval_ms(&self) -> u64 {
        self.step_interval_ms
    }

    /// Number of steps published so far.
    pub const fn steps_elapsed(&self) -> u64 {
        self.next_step
    }

    /// Compute the counters for the next step and advance.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::StepOverflow`] if the counter is exhausted.
    pub fn advance(&mut self) -> Result<Pulse, ClockError> {
        let step = self.next_step;
        self.next_step = step.checked_add(1).ok_or(ClockError::StepOverflow)?;

        let beat = (step.checked_rem(self.steps_per_beat) == Some(0))
            .then(|| step.checked_div(self.steps_per_beat))
            .flatten();
        let bar = beat
            .filter(|b| b.checked_rem(self.beats_per_bar) == Some(0))
            .and_then(|b| b.checked_div(self.beats_per_bar));

        Ok(Pulse { step, beat, bar })
    }

    /// Advance one step and publish its events.
    ///
    /// # Errors
    ///
    /// Propagates [`ClockError::StepOverflow`].
    pub fn pulse(&mut self, bus: &EventBus) -> Result<Pulse, ClockError> {
        let pulse = self.advance()?;
        bus.emit(topics::STEP, json!({ "step": pulse.step }));
        if let Some(beat) = pulse.beat {
            let bar = beat.checked_div(self.beats_per_bar).unwrap_or(0);
            bus.emit(topics::BEAT, json!({ "beat": beat, "bar": bar }));
        }
        if let Some(bar) = pulse.bar {
            debug!(bar, "bar");
            bus.emit(topics::BAR, json!({ "bar": bar }));
        }
        Ok(pulse)
    }

    /// Publish every step that has come due by `now_ms`.
    ///
    /// The first call starts the metronome and publishes step 0. After a
    /// stall longer than `max_catch_up_steps` intervals the backlog is
    /// skipped and the schedule restarts from `now_ms`.
    ///
    /// Returns the number of steps published.
    ///
    /// # Errors
    ///
    /// Propagates [`ClockError::StepOverflow`].
    pub fn pump(&mut self, now_ms: u64, bus: &EventBus) -> Result<u64, ClockError> {
        let mut due = *self.next_due_ms.get_or_insert(now_ms);
        let mut published = 0u64;
        while due <= now_ms {
            if published >= self.max_catch_up {
                warn!(
                    skipped_from = due,
                    now_ms, "metronome fell behind, skipping backlog"
                );
                due = now_ms.saturating_add(self.step_interval_ms);
                break;
            }
            self.pulse(bus)?;
            published = published.saturating_add(1);
            due = due.saturating_add(self.step_interval_ms);
        }
        self.next_due_ms = Some(due);
        Ok(published)
    }

    /// Forget the schedule; the next [`pump`](Self::pump) restarts timing
    /// from its `now_ms` without resetting the counters.
    pub const fn resync(&mut self) {
        self.next_due_ms = None;
    }
}

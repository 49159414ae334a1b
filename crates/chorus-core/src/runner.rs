//! The async run loop.
//!
//! [`run`] drives one scheduler turn after another until a boundary or a
//! stop request ends it. Each turn:
//!
//! 1. publishes the metronome steps that have come due,
//! 2. flushes the bus timer queue (debounce/throttle/batch),
//! 3. lets the [`TurnHook`] inject input (e.g. a sensor source),
//! 4. ticks the agent runtime,
//! 5. sleeps for the control's tick interval.
//!
//! Everything runs on the calling task; the loop only yields at the sleep
//! and while paused.

use tracing::info;

use crate::clock::{ClockError, Metronome};
use crate::context::Context;
use crate::control::{EndReason, RuntimeControl};
use crate::runtime::{AgentRuntime, CycleReport};

/// Errors that can end the run loop early.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The metronome failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Why the loop ended.
    pub end_reason: EndReason,
    /// Completed scheduler turns.
    pub total_ticks: u64,
    /// Decision cycles run across all agents.
    pub total_cycles: u64,
    /// Metronome steps published.
    pub total_steps: u64,
}

/// Hook invoked once per turn, before agents cycle.
pub trait TurnHook {
    /// Called with the turn number (1-based), the bus time and the context.
    fn on_turn(&mut self, turn: u64, now_ms: u64, ctx: &Context);

    /// Called with the cycle reports produced this turn.
    fn after_turn(&mut self, _turn: u64, _reports: &[CycleReport]) {}
}

/// A hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHook;

impl TurnHook for NoOpHook {
    fn on_turn(&mut self, _turn: u64, _now_ms: u64, _ctx: &Context) {}
}

/// Run the loop until a boundary or stop request.
///
/// # Errors
///
/// Returns [`RunnerError::Clock`] if the metronome overflows.
pub async fn run(
    runtime: &mut AgentRuntime,
    metronome: &mut Metronome,
    control: &RuntimeControl,
    hook: &mut dyn TurnHook,
) -> Result<RunResult, RunnerError> {
    let ctx = runtime.context().clone();
    let mut total_ticks: u64 = 0;
    let mut total_cycles: u64 = 0;
    let mut total_steps: u64 = 0;

    info!(
        max_ticks = control.max_ticks(),
        max_real_time_seconds = control.max_real_time_seconds(),
        tick_interval_ms = control.tick_interval_ms(),
        bpm = metronome.bpm(),
        agents = runtime.len(),
        "run loop starting"
    );

    let end_reason = loop {
        if control.is_paused() {
            info!("run loop paused");
            control.wait_if_paused().await;
            metronome.resync();
            info!("run loop resumed");
        }

        if control.is_stop_requested() {
            break EndReason::StopRequested;
        }

        if control.time_limit_reached() {
            break EndReason::MaxRealTimeReached;
        }

        let turn = total_ticks.saturating_add(1);
        let now_ms = ctx.bus.now_ms();
        total_steps = total_steps.saturating_add(metronome.pump(now_ms, &ctx.bus)?);
        ctx.bus.run_due_timers();
        hook.on_turn(turn, now_ms, &ctx);

        let reports = runtime.tick(now_ms);
        let cycled = u64::try_from(reports.len()).unwrap_or(u64::MAX);
        total_cycles = total_cycles.saturating_add(cycled);
        hook.after_turn(turn, &reports);
        total_ticks = turn;

        if control.tick_limit_reached(total_ticks) {
            break EndReason::MaxTicksReached;
        }

        let interval_ms = control.tick_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
        }
    };

    let result = RunResult {
        end_reason,
        total_ticks,
        total_cycles,
        total_steps,
    };
    log_run_end(&result);
    Ok(result)
}

/// Log the end of a run.
pub fn log_run_end(result: &RunResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        total_cycles = result.total_cycles,
        total_steps = result.total_steps,
        "run loop ended"
    );
}

//! Steering handle for [`run`](crate::run).
//!
//! The loop itself lives on one thread with the bus and the minds. The only
//! thing that ever reaches it from outside is a [`RuntimeControl`], usually
//! behind an `Arc` held by a signal task. So the handle carries nothing but
//! plain flags and numbers: one mode word (running, paused or stopping),
//! the sleep between turns, and the two run boundaries.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::config::RuntimeConfig;

const RUNNING: u8 = 0;
const PAUSED: u8 = 1;
const STOPPING: u8 = 2;

/// Why the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// The turn counter hit `max_ticks`.
    MaxTicksReached,
    /// The session outlived `max_real_time_seconds`.
    MaxRealTimeReached,
    /// Someone called [`RuntimeControl::request_stop`].
    StopRequested,
}

/// Pause, pacing and stop requests for one run.
///
/// Stopping is final: once requested, `pause` no longer has any effect.
#[derive(Debug)]
pub struct RuntimeControl {
    mode: AtomicU8,
    wake: Notify,
    tick_interval_ms: AtomicU64,
    started_at: DateTime<Utc>,
    max_ticks: u64,
    max_real_time_seconds: u64,
}

impl RuntimeControl {
    /// Fresh handle in running mode, bounded by `config`.
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            mode: AtomicU8::new(RUNNING),
            wake: Notify::new(),
            tick_interval_ms: AtomicU64::new(config.tick_interval_ms),
            started_at: Utc::now(),
            max_ticks: config.max_ticks,
            max_real_time_seconds: config.max_real_time_seconds,
        }
    }

    fn mode(&self) -> u8 {
        self.mode.load(Ordering::Acquire)
    }

    /// True between [`pause`](Self::pause) and the next resume or stop.
    pub fn is_paused(&self) -> bool {
        self.mode() == PAUSED
    }

    /// Hold the loop before its next turn. Ignored once stopping.
    pub fn pause(&self) {
        let _ = self
            .mode
            .compare_exchange(RUNNING, PAUSED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Let a held loop continue.
    pub fn resume(&self) {
        if self
            .mode
            .compare_exchange(PAUSED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.wake.notify_one();
        }
    }

    /// Park the caller while paused; returns at once otherwise.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() {
            self.wake.notified().await;
        }
    }

    /// Ask the loop to end after its current turn. Wakes a held loop.
    pub fn request_stop(&self) {
        self.mode.store(STOPPING, Ordering::Release);
        self.wake.notify_one();
    }

    /// Whether [`request_stop`](Self::request_stop) was called.
    pub fn is_stop_requested(&self) -> bool {
        self.mode() == STOPPING
    }

    /// Sleep between turns, in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Retune the sleep between turns. Zero is refused and yields `None`;
    /// otherwise the old value comes back.
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        (ms > 0).then(|| self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    /// `completed` turns have used up the turn budget. No budget when
    /// `max_ticks` is 0.
    pub const fn tick_limit_reached(&self, completed: u64) -> bool {
        self.max_ticks > 0 && completed >= self.max_ticks
    }

    /// The session has used up its wall-clock budget. No budget when
    /// `max_real_time_seconds` is 0.
    pub fn time_limit_reached(&self) -> bool {
        self.max_real_time_seconds > 0 && self.elapsed_seconds() >= self.max_real_time_seconds
    }

    /// When the handle was created.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whole seconds since [`started_at`](Self::started_at).
    pub fn elapsed_seconds(&self) -> u64 {
        let seconds = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        u64::try_from(seconds).unwrap_or(0)
    }

    /// Turn budget (0 = none).
    pub const fn max_ticks(&self) -> u64 {
        self.max_ticks
    }

    /// Wall-clock budget in seconds (0 = none).
    pub const fn max_real_time_seconds(&self) -> u64 {
        self.max_real_time_seconds
    }
}

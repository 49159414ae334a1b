//! Captured gesture recordings.
//!
//! A [`Recording`] is assembled from one `gesture.start` .. `gesture.end`
//! sequence and handed to the persistence collaborator when it closes.

use serde::{Deserialize, Serialize};

use crate::enums::GestureKind;
use crate::ids::RecordingId;

/// One sampled point of a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GesturePoint {
    /// Normalized horizontal position, `[0, 1]`.
    pub x: f64,
    /// Normalized vertical position, `[0, 1]`, growing downwards.
    pub y: f64,
    /// Normalized speed, `[0, 1]`.
    pub velocity: f64,
    /// Milliseconds since the Unix epoch.
    pub t: i64,
}

/// A finished gesture capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Unique identifier.
    pub id: RecordingId,
    /// Timestamp of the opening `gesture.start`.
    pub started_at: i64,
    /// Timestamp of the closing `gesture.end`.
    pub ended_at: i64,
    /// Classified gesture tag reported on `gesture.end`.
    pub gesture: GestureKind,
    /// Sampled points in arrival order.
    pub points: Vec<GesturePoint>,
}

impl Recording {
    /// Duration in milliseconds, never negative.
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.ended_at.saturating_sub(self.started_at)).unwrap_or(0)
    }

    /// Highest sampled velocity, `0.0` for an empty recording.
    pub fn peak_velocity(&self) -> f64 {
        self.points.iter().map(|p| p.velocity).fold(0.0, f64::max)
    }
}

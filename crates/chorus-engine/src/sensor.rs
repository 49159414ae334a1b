//! Seeded stand-in for the gesture sensor.
//!
//! Once per `sample_interval_ms` the sensor takes one sample. It alternates
//! between resting and performing a gesture: `gesture.start`, a fixed
//! number of `gesture.move` samples on a random walk, then `gesture.end`.
//! While it moves it keeps the world's zone and dynamics up to date and
//! announces zone crossings with `zone.exit` / `zone.enter`.
//!
//! The same seed always produces the same session.

use chorus_core::config::SensorConfig;
use chorus_core::{Context, CycleReport, TurnHook};
use chorus_types::{GestureKind, Zone, topics};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, trace};

/// Largest per-axis displacement between two samples.
const MAX_STEP: f64 = 0.08;

/// Gestures the simulator performs.
const KINDS: [GestureKind; 5] = [
    GestureKind::Tap,
    GestureKind::Drag,
    GestureKind::Swipe,
    GestureKind::Circle,
    GestureKind::Hold,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resting { samples_left: u32 },
    Moving { kind: GestureKind, moves_left: u32 },
}

/// Simulated gesture source, driven by the run loop.
#[derive(Debug)]
pub struct SimulatedSensor {
    rng: StdRng,
    sample_interval_ms: u64,
    points_per_gesture: u32,
    next_sample_ms: Option<u64>,
    phase: Phase,
    x: f64,
    y: f64,
    zone: Option<Zone>,
    gestures: u64,
}

impl SimulatedSensor {
    /// Create a sensor from configuration.
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            sample_interval_ms: config.sample_interval_ms.max(1),
            points_per_gesture: config.points_per_gesture,
            next_sample_ms: None,
            phase: Phase::Resting { samples_left: 0 },
            x: 0.5,
            y: 0.5,
            zone: None,
            gestures: 0,
        }
    }

    /// Gestures completed so far.
    pub const fn gestures(&self) -> u64 {
        self.gestures
    }

    /// Take one sample and publish what it produced.
    pub fn sample(&mut self, ctx: &Context) {
        self.phase = match self.phase {
            Phase::Resting { samples_left: 0 } => self.begin(ctx),
            Phase::Resting { samples_left } => {
                self.drift_tension(ctx);
                Phase::Resting {
                    samples_left: samples_left.saturating_sub(1),
                }
            }
            Phase::Moving {
                kind,
                moves_left: 0,
            } => self.finish(kind, ctx),
            Phase::Moving { kind, moves_left } => {
                self.step(kind, ctx);
                Phase::Moving {
                    kind,
                    moves_left: moves_left.saturating_sub(1),
                }
            }
        };
    }

    fn begin(&mut self, ctx: &Context) -> Phase {
        self.x = self.rng.random_range(0.0..=1.0);
        self.y = self.rng.random_range(0.0..=1.0);
        let index = self.rng.random_range(0..KINDS.len());
        let kind = KINDS.get(index).copied().unwrap_or(GestureKind::Unknown);
        let velocity: f64 = self.rng.random_range(0.1..0.6);
        debug!(gesture = kind.as_str(), x = self.x, y = self.y, "gesture begins");
        ctx.bus.emit(
            topics::GESTURE_START,
            json!({ "x": self.x, "y": self.y, "velocity": velocity, "gesture": kind.as_str() }),
        );
        self.track_zone(ctx);
        Phase::Moving {
            kind,
            moves_left: self.points_per_gesture,
        }
    }

    fn step(&mut self, kind: GestureKind, ctx: &Context) {
        let dx: f64 = self.rng.random_range(-MAX_STEP..=MAX_STEP);
        let dy: f64 = self.rng.random_range(-MAX_STEP..=MAX_STEP);
        self.x = (self.x + dx).clamp(0.0, 1.0);
        self.y = (self.y + dy).clamp(0.0, 1.0);
        let velocity = (dx.hypot(dy) / (MAX_STEP * core::f64::consts::SQRT_2)).clamp(0.0, 1.0);
        trace!(x = self.x, y = self.y, velocity, "gesture moves");
        ctx.bus.emit(
            topics::GESTURE_MOVE,
            json!({ "x": self.x, "y": self.y, "velocity": velocity, "gesture": kind.as_str() }),
        );
        let dynamics = ctx.world.dynamics();
        ctx.world.set_dynamics(0.8f64.mul_add(dynamics, 0.2 * velocity));
        self.track_zone(ctx);
    }

    fn finish(&mut self, kind: GestureKind, ctx: &Context) -> Phase {
        ctx.bus.emit(
            topics::GESTURE_END,
            json!({ "x": self.x, "y": self.y, "velocity": 0.0, "gesture": kind.as_str() }),
        );
        self.gestures = self.gestures.saturating_add(1);
        let samples_left = self.rng.random_range(1..=4u32);
        debug!(gesture = kind.as_str(), total = self.gestures, rest = samples_left, "gesture ends");
        Phase::Resting { samples_left }
    }

    fn drift_tension(&mut self, ctx: &Context) {
        let delta: f64 = self.rng.random_range(-0.05..=0.05);
        ctx.world.set_tension(ctx.world.tension() + delta);
    }

    fn track_zone(&mut self, ctx: &Context) {
        let zone = Zone::from_position(self.x, self.y);
        if self.zone == Some(zone) {
            return;
        }
        if let Some(old) = self.zone.replace(zone) {
            ctx.bus.emit(topics::ZONE_EXIT, json!({ "zone": old.as_str() }));
        }
        ctx.world.set_zone(zone);
        ctx.bus.emit(topics::ZONE_ENTER, json!({ "zone": zone.as_str() }));
    }
}

impl TurnHook for SimulatedSensor {
    fn on_turn(&mut self, _turn: u64, now_ms: u64, ctx: &Context) {
        let due = *self.next_sample_ms.get_or_insert(now_ms);
        if now_ms < due {
            return;
        }
        self.next_sample_ms = Some(now_ms.saturating_add(self.sample_interval_ms));
        self.sample(ctx);
    }

    fn after_turn(&mut self, turn: u64, reports: &[CycleReport]) {
        for report in reports {
            trace!(
                turn,
                agent = %report.agent,
                action = ?report.action,
                reward = report.reward,
                "cycle"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chorus_bus::EventBus;
    use chorus_world::WorldState;
    use serde_json::Value;

    use super::*;

    fn config(points_per_gesture: u32) -> SensorConfig {
        SensorConfig {
            points_per_gesture,
            ..SensorConfig::default()
        }
    }

    fn context() -> Context {
        Context::new(EventBus::new(), WorldState::new())
    }

    fn session(seed: u64, samples: usize) -> Vec<(String, Value)> {
        let ctx = context();
        let mut sensor = SimulatedSensor::new(&SensorConfig {
            seed,
            ..SensorConfig::default()
        });
        for _ in 0..samples {
            sensor.sample(&ctx);
        }
        ctx.bus
            .history(None, None)
            .iter()
            .map(|e| (e.event_type().to_owned(), e.data().clone()))
            .collect()
    }

    #[test]
    fn same_seed_same_session() {
        assert_eq!(session(7, 40), session(7, 40));
        assert_ne!(session(7, 40), session(8, 40));
    }

    #[test]
    fn gesture_is_start_moves_end() {
        let ctx = context();
        let mut sensor = SimulatedSensor::new(&config(3));
        for _ in 0..5 {
            sensor.sample(&ctx);
        }
        let kinds: Vec<String> = ctx
            .bus
            .history(Some(topics::GESTURE_ANY), None)
            .iter()
            .map(|e| e.event_type().to_owned())
            .collect();
        assert_eq!(
            kinds,
            vec![
                topics::GESTURE_START,
                topics::GESTURE_MOVE,
                topics::GESTURE_MOVE,
                topics::GESTURE_MOVE,
                topics::GESTURE_END,
            ]
        );
        assert_eq!(sensor.gestures(), 1);
    }

    #[test]
    fn first_sample_enters_a_zone() {
        let ctx = context();
        let mut sensor = SimulatedSensor::new(&config(3));
        sensor.sample(&ctx);
        let entered = ctx.bus.history(Some(topics::ZONE_ENTER), None);
        assert_eq!(entered.len(), 1);
        assert_eq!(
            entered[0].str_field("zone"),
            Some(ctx.world.zone().as_str())
        );
        assert!(ctx.bus.history(Some(topics::ZONE_EXIT), None).is_empty());
    }

    #[test]
    fn samples_follow_the_interval() {
        let ctx = context();
        let mut sensor = SimulatedSensor::new(&SensorConfig {
            sample_interval_ms: 100,
            ..SensorConfig::default()
        });
        for now in [1_000, 1_050, 1_099, 1_100, 1_150] {
            sensor.on_turn(1, now, &ctx);
        }
        // start at 1000, first move at 1100
        assert_eq!(ctx.bus.history(Some(topics::GESTURE_ANY), None).len(), 2);
    }
}

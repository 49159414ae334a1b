//! The gesture recorder: captures `gesture.start` .. `gesture.end`
//! sequences and checkpoints them through the persistence collaborator.
//!
//! The recorder is purely event-driven (its update rate is zero). The only
//! place it touches storage is the `gesture.end` handler, once per finished
//! recording. A failed save is returned as an [`AgentError::Persistence`],
//! which the runtime logs and raises as an `error` event; the recording
//! stays in memory and is written again with the next checkpoint.
//!
//! A store that cannot be read at start is set aside before anything is
//! written. If even that fails the recorder keeps recordings in memory and
//! never saves over the unreadable data.

use std::convert::Infallible;
use std::rc::Rc;

use chorus_core::config::RecorderConfig;
use chorus_core::{Context, Message, Mind, Percept, Perceptions, Persistence};
use chorus_types::{Event, GestureKind, GesturePoint, Recording, RecordingId, topics};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::AgentError;

/// A gesture being captured.
#[derive(Debug, Clone)]
struct OpenGesture {
    started_at: i64,
    points: Vec<GesturePoint>,
}

/// Captures gestures into [`Recording`]s.
pub struct GestureRecorder {
    id: String,
    min_points: usize,
    store: Rc<dyn Persistence>,
    recordings: Vec<Recording>,
    open: Option<OpenGesture>,
    memory_only: bool,
}

impl core::fmt::Debug for GestureRecorder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GestureRecorder")
            .field("id", &self.id)
            .field("min_points", &self.min_points)
            .field("recordings", &self.recordings.len())
            .field("open", &self.open.is_some())
            .field("memory_only", &self.memory_only)
            .finish_non_exhaustive()
    }
}

impl GestureRecorder {
    /// Create a recorder writing through `store`.
    pub fn new(id: impl Into<String>, config: &RecorderConfig, store: Rc<dyn Persistence>) -> Self {
        Self {
            id: id.into(),
            min_points: config.min_points,
            store,
            recordings: Vec::new(),
            open: None,
            memory_only: false,
        }
    }

    /// Recordings finished (or loaded) so far, oldest first.
    pub fn recordings(&self) -> &[Recording] {
        &self.recordings
    }

    /// Whether a gesture is currently being captured.
    pub const fn is_capturing(&self) -> bool {
        self.open.is_some()
    }

    /// Whether saving is off because the store could not be read or set
    /// aside at start.
    pub const fn is_memory_only(&self) -> bool {
        self.memory_only
    }

    fn checkpoint(&self) -> Result<bool, AgentError> {
        if self.memory_only {
            warn!(
                agent = %self.id,
                recordings = self.recordings.len(),
                "store unavailable, recordings kept in memory"
            );
            return Ok(false);
        }
        self.store.save(&self.recordings)?;
        Ok(true)
    }

    fn load_existing(&mut self) {
        self.memory_only = false;
        let err = match self.store.load() {
            Ok(existing) => {
                info!(agent = %self.id, loaded = existing.len(), "recorder started");
                self.recordings = existing;
                return;
            }
            Err(err) => err,
        };
        self.recordings.clear();
        match self.store.set_aside() {
            Ok(moved) => warn!(
                agent = %self.id,
                error = %err,
                moved_to = ?moved,
                "could not load recordings, starting empty"
            ),
            Err(aside) => {
                warn!(
                    agent = %self.id,
                    error = %err,
                    set_aside = %aside,
                    "could not load or set aside recordings, saving disabled"
                );
                self.memory_only = true;
            }
        }
    }

    fn point(event: &Event) -> Result<GesturePoint, AgentError> {
        let coordinate = |key: &str| {
            event
                .f64_field(key)
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 1.0))
                .ok_or_else(|| {
                    AgentError::invalid(event.event_type(), format!("missing coordinate `{key}`"))
                })
        };
        Ok(GesturePoint {
            x: coordinate("x")?,
            y: coordinate("y")?,
            velocity: event.f64_field("velocity").unwrap_or(0.0).clamp(0.0, 1.0),
            t: event.timestamp(),
        })
    }

    fn begin(&mut self, event: &Event) -> Result<(), AgentError> {
        let point = Self::point(event)?;
        if let Some(dropped) = self.open.take() {
            debug!(
                agent = %self.id,
                points = dropped.points.len(),
                "unfinished gesture replaced by a new start"
            );
        }
        self.open = Some(OpenGesture {
            started_at: event.timestamp(),
            points: vec![point],
        });
        Ok(())
    }

    fn extend(&mut self, event: &Event) -> Result<(), AgentError> {
        let point = Self::point(event)?;
        match self.open.as_mut() {
            Some(open) => open.points.push(point),
            None => debug!(agent = %self.id, "move without start ignored"),
        }
        Ok(())
    }

    fn finish(&mut self, event: &Event, ctx: &Context) -> Result<(), AgentError> {
        let Some(mut open) = self.open.take() else {
            debug!(agent = %self.id, "end without start ignored");
            return Ok(());
        };
        if let Ok(point) = Self::point(event) {
            open.points.push(point);
        }
        if open.points.len() < self.min_points {
            debug!(
                agent = %self.id,
                points = open.points.len(),
                min_points = self.min_points,
                "gesture too short, discarded"
            );
            return Ok(());
        }

        let recording = Recording {
            id: RecordingId::new(),
            started_at: open.started_at,
            ended_at: event.timestamp(),
            gesture: GestureKind::resolve(event.str_field("gesture").unwrap_or_default()),
            points: open.points,
        };
        let id = recording.id;
        let points = recording.points.len();
        let gesture = recording.gesture;
        let duration_ms = recording.duration_ms();
        self.recordings.push(recording);

        if !self.checkpoint()? {
            return Ok(());
        }
        info!(agent = %self.id, recording = %id, points, gesture = gesture.as_str(), "recording saved");
        ctx.bus.emit(
            topics::RECORDING_SAVED,
            json!({
                "id": id,
                "points": points,
                "gesture": gesture.as_str(),
                "duration_ms": duration_ms,
            }),
        );
        Ok(())
    }
}

impl Mind for GestureRecorder {
    type Action = Infallible;
    type Error = AgentError;

    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "recorder"
    }

    fn update_rate_hz(&self) -> f64 {
        0.0
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![topics::GESTURE_ANY.to_owned()]
    }

    fn on_start(&mut self, _ctx: &Context) {
        self.load_existing();
    }

    fn on_stop(&mut self, _ctx: &Context) {
        if let Some(open) = self.open.take() {
            debug!(agent = %self.id, points = open.points.len(), "open gesture dropped on stop");
        }
    }

    fn perceive(&self, _ctx: &Context) -> Percept {
        let mut percept = Percept::new();
        percept.insert("recordings".to_owned(), json!(self.recordings.len()));
        percept.insert("capturing".to_owned(), json!(self.open.is_some()));
        percept
    }

    fn possible_actions(&self, _perceptions: &Perceptions) -> Vec<Infallible> {
        Vec::new()
    }

    fn evaluate_action(&self, _perceptions: &Perceptions, action: &Infallible) -> f64 {
        match *action {}
    }

    fn execute_action(&mut self, action: Infallible, _ctx: &Context) -> Result<(), AgentError> {
        match action {}
    }

    fn calculate_reward(&self, _perceptions: &Perceptions) -> f64 {
        0.0
    }

    fn on_event(&mut self, event: &Event, ctx: &Context) -> Result<(), AgentError> {
        match event.event_type() {
            topics::GESTURE_START => self.begin(event),
            topics::GESTURE_MOVE => self.extend(event),
            topics::GESTURE_END => self.finish(event, ctx),
            _ => Ok(()),
        }
    }

    fn handle_message(&mut self, message: &Message, _ctx: &Context) -> Result<(), AgentError> {
        match message.topic.as_str() {
            "clear" => {
                self.recordings.clear();
                self.checkpoint()?;
                info!(agent = %self.id, "recordings cleared");
                Ok(())
            }
            other => Err(AgentError::UnsupportedMessage {
                topic: other.to_owned(),
            }),
        }
    }

    fn energy(&self) -> f64 {
        if self.open.is_some() { 1.0 } else { 0.0 }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::path::PathBuf;

    use chorus_bus::EventBus;
    use chorus_core::{JsonFilePersistence, MemoryPersistence, PersistenceError};
    use chorus_world::WorldState;

    use super::*;

    fn setup(min_points: usize) -> (GestureRecorder, Context, Rc<MemoryPersistence>) {
        let store = Rc::new(MemoryPersistence::new());
        let config = RecorderConfig {
            min_points,
            ..RecorderConfig::default()
        };
        let recorder = GestureRecorder::new("recorder", &config, store.clone());
        (recorder, Context::new(EventBus::new(), WorldState::new()), store)
    }

    fn gesture(event_type: &str, x: f64, t: i64) -> Event {
        Event::at(
            event_type,
            json!({ "x": x, "y": 0.5, "velocity": 0.4, "gesture": "swipe" }),
            t,
        )
    }

    #[test]
    fn full_gesture_is_saved_once() {
        let (mut rec, ctx, store) = setup(2);
        rec.on_event(&gesture(topics::GESTURE_START, 0.1, 100), &ctx).unwrap();
        rec.on_event(&gesture(topics::GESTURE_MOVE, 0.2, 150), &ctx).unwrap();
        assert_eq!(store.save_count(), 0);
        rec.on_event(&gesture(topics::GESTURE_END, 0.3, 200), &ctx).unwrap();

        assert_eq!(store.save_count(), 1);
        let saved = store.load().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].points.len(), 3);
        assert_eq!(saved[0].gesture, GestureKind::Swipe);
        assert_eq!(saved[0].duration_ms(), 100);

        let announced = ctx.bus.history(Some(topics::RECORDING_SAVED), None);
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].u64_field("points"), Some(3));
    }

    #[test]
    fn short_gestures_are_discarded() {
        let (mut rec, ctx, store) = setup(5);
        rec.on_event(&gesture(topics::GESTURE_START, 0.1, 0), &ctx).unwrap();
        rec.on_event(&gesture(topics::GESTURE_END, 0.1, 10), &ctx).unwrap();
        assert_eq!(store.save_count(), 0);
        assert!(rec.recordings().is_empty());
        assert!(!rec.is_capturing());
    }

    #[test]
    fn stray_moves_and_ends_are_ignored() {
        let (mut rec, ctx, store) = setup(1);
        rec.on_event(&gesture(topics::GESTURE_MOVE, 0.1, 0), &ctx).unwrap();
        rec.on_event(&gesture(topics::GESTURE_END, 0.1, 10), &ctx).unwrap();
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn missing_coordinates_are_rejected() {
        let (mut rec, ctx, _store) = setup(1);
        let bad = Event::new(topics::GESTURE_START, json!({ "velocity": 0.3 }));
        assert!(matches!(
            rec.on_event(&bad, &ctx),
            Err(AgentError::InvalidPayload { .. })
        ));
        assert!(!rec.is_capturing());
    }

    #[test]
    fn start_loads_existing_and_clear_persists() {
        let (mut rec, ctx, store) = setup(1);
        rec.on_event(&gesture(topics::GESTURE_START, 0.1, 0), &ctx).unwrap();
        rec.on_event(&gesture(topics::GESTURE_END, 0.2, 10), &ctx).unwrap();

        let mut again = GestureRecorder::new("again", &RecorderConfig::default(), store.clone());
        again.on_start(&ctx);
        assert_eq!(again.recordings().len(), 1);

        again.handle_message(&Message::new("clear", json!({})), &ctx).unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(matches!(
            again.handle_message(&Message::new("replay", json!({})), &ctx),
            Err(AgentError::UnsupportedMessage { .. })
        ));
    }

    #[test]
    fn corrupt_store_survives_the_next_checkpoint() {
        let path = std::env::temp_dir().join(format!("chorus-recorder-{}.json", RecordingId::new()));
        std::fs::write(&path, b"[{ half a recording").unwrap();
        let store = Rc::new(JsonFilePersistence::new(&path));
        let aside = store.quarantine_path();
        let ctx = Context::new(EventBus::new(), WorldState::new());
        let mut rec = GestureRecorder::new("recorder", &RecorderConfig::default(), store.clone());

        rec.on_start(&ctx);
        assert!(!rec.is_memory_only());
        rec.on_event(&gesture(topics::GESTURE_START, 0.1, 0), &ctx).unwrap();
        rec.on_event(&gesture(topics::GESTURE_MOVE, 0.2, 5), &ctx).unwrap();
        rec.on_event(&gesture(topics::GESTURE_END, 0.3, 10), &ctx).unwrap();

        assert_eq!(std::fs::read(&aside).unwrap(), b"[{ half a recording");
        assert_eq!(store.load().unwrap().len(), 1);
        std::fs::remove_file(&path).unwrap();
        std::fs::remove_file(&aside).unwrap();
    }

    /// Unreadable, and cannot be moved either.
    #[derive(Default)]
    struct StuckStore {
        saves: Cell<u32>,
    }

    impl Persistence for StuckStore {
        fn save(&self, _recordings: &[Recording]) -> Result<(), PersistenceError> {
            self.saves.set(self.saves.get().saturating_add(1));
            Ok(())
        }

        fn load(&self) -> Result<Vec<Recording>, PersistenceError> {
            Err(PersistenceError::Corrupt {
                path: PathBuf::from("recordings.json"),
                source: serde_json::from_str::<Vec<Recording>>("{").unwrap_err(),
            })
        }

        fn set_aside(&self) -> Result<Option<PathBuf>, PersistenceError> {
            Err(PersistenceError::Io {
                path: PathBuf::from("recordings.json"),
                source: std::io::Error::other("read-only file system"),
            })
        }
    }

    #[test]
    fn store_that_cannot_be_set_aside_is_never_written() {
        let store = Rc::new(StuckStore::default());
        let ctx = Context::new(EventBus::new(), WorldState::new());
        let mut rec = GestureRecorder::new("recorder", &RecorderConfig::default(), store.clone());

        rec.on_start(&ctx);
        assert!(rec.is_memory_only());
        rec.on_event(&gesture(topics::GESTURE_START, 0.1, 0), &ctx).unwrap();
        rec.on_event(&gesture(topics::GESTURE_MOVE, 0.2, 5), &ctx).unwrap();
        rec.on_event(&gesture(topics::GESTURE_END, 0.3, 10), &ctx).unwrap();
        assert_eq!(rec.recordings().len(), 1);
        rec.handle_message(&Message::new("clear", json!({})), &ctx).unwrap();

        assert_eq!(store.saves.get(), 0);
        assert!(ctx.bus.history(Some(topics::RECORDING_SAVED), None).is_empty());
    }
}

//! The concrete minds driven through the agent runtime, the bus and the
//! metronome, the way the engine wires them.

#![allow(clippy::unwrap_used, clippy::float_cmp, clippy::missing_panics_doc)]

use std::cell::RefCell;
use std::rc::Rc;

use chorus_agents::{GestureRecorder, HarmonicMind};
use chorus_bus::{EventBus, listener};
use chorus_core::config::{ClockConfig, HarmonicConfig, RecorderConfig};
use chorus_core::{
    AgentRuntime, Context, MemoryPersistence, Message, Metronome, Persistence, PersistenceError,
    RecordingStage,
};
use chorus_types::{Era, Event, Recording, Zone, topics};
use chorus_world::WorldState;
use serde_json::json;

fn runtime_with_stage() -> (AgentRuntime, Rc<RecordingStage>) {
    let stage = Rc::new(RecordingStage::new());
    let ctx = Context::with_stage(EventBus::new(), WorldState::new(), stage.clone());
    (AgentRuntime::new(ctx), stage)
}

fn chord_steps(bus: &EventBus) -> Vec<u64> {
    bus.history(Some(topics::CHORD_CHANGE), None)
        .iter()
        .filter_map(|e| e.u64_field("step"))
        .collect()
}

#[test]
fn eight_beat_chords_change_on_the_eighth_beat_and_wrap() {
    let (mut rt, _stage) = runtime_with_stage();
    rt.register(HarmonicMind::new("harmony", HarmonicConfig::default()))
        .unwrap();
    rt.start("harmony").unwrap();
    rt.send(
        "harmony",
        &Message::new("set_progression", json!({ "name": "cadence" })),
    )
    .unwrap();
    let bus = rt.context().bus.clone();

    for beat in 1..=7u64 {
        bus.emit(topics::BEAT, json!({ "beat": beat }));
    }
    assert!(chord_steps(&bus).is_empty());

    bus.emit(topics::BEAT, json!({ "beat": 8 }));
    assert_eq!(chord_steps(&bus), vec![1]);

    for beat in 9..=32u64 {
        bus.emit(topics::BEAT, json!({ "beat": beat }));
    }
    assert_eq!(chord_steps(&bus), vec![1, 2, 3, 0]);
}

#[test]
fn metronome_beats_drive_the_progression() {
    let (mut rt, stage) = runtime_with_stage();
    rt.register(HarmonicMind::new("harmony", HarmonicConfig::default()))
        .unwrap();
    rt.start_all();
    rt.send(
        "harmony",
        &Message::new("set_progression", json!({ "name": "cadence" })),
    )
    .unwrap();
    let bus = rt.context().bus.clone();
    let mut metronome = Metronome::new(&ClockConfig::default()).unwrap();

    // Beats fall on every fourth step, starting with step 0.
    for _ in 0..28 {
        metronome.pulse(&bus).unwrap();
    }
    assert!(chord_steps(&bus).is_empty());
    stage.clear();

    metronome.pulse(&bus).unwrap();
    assert_eq!(chord_steps(&bus), vec![1]);
    assert!(stage.last_chord().is_some());
}

#[test]
fn zone_change_wins_the_next_cycle() {
    let (mut rt, _stage) = runtime_with_stage();
    rt.register(HarmonicMind::new("harmony", HarmonicConfig::default()))
        .unwrap();
    rt.start_all();
    rt.context().world.set_zone(Zone::South);

    let reports = rt.tick(0);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].action.as_deref(), Some("change_root"));

    let roots = rt.context().bus.history(Some(topics::ROOT_CHANGE), None);
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].f64_field("root"), Some(110.0));
    assert_eq!(roots[0].str_field("zone"), Some("south"));

    let status = rt.status("harmony").unwrap();
    assert_eq!(status.last_action.as_deref(), Some("change_root"));
    assert!(status.energy < 0.5);
}

fn cycle_labels(rt: &mut AgentRuntime, cycles: usize) -> Vec<String> {
    let mut labels = Vec::new();
    for _ in 0..cycles {
        labels.extend(rt.cycle_all().into_iter().filter_map(|r| r.action));
    }
    labels
}

#[test]
fn chosen_progression_holds_until_the_era_moves() {
    let (mut rt, _stage) = runtime_with_stage();
    rt.register(HarmonicMind::new("harmony", HarmonicConfig::default()))
        .unwrap();
    rt.start_all();
    rt.send(
        "harmony",
        &Message::new("set_progression", json!({ "name": "cadence" })),
    )
    .unwrap();

    let labels = cycle_labels(&mut rt, 4);
    assert!(!labels.iter().any(|l| l == "switch_progression"), "{labels:?}");
    let switches = rt.context().bus.history(Some(topics::PROGRESSION_CHANGE), None);
    assert_eq!(switches.len(), 1);
    assert_eq!(switches[0].str_field("name"), Some("cadence"));

    rt.context().world.set_era(Era::Digital);
    assert_eq!(cycle_labels(&mut rt, 1), vec!["switch_progression"]);
    let last = rt
        .context()
        .bus
        .last_event(topics::PROGRESSION_CHANGE)
        .unwrap();
    assert_eq!(last.str_field("era"), Some("digital"));
    assert_eq!(last.str_field("name"), Some("loop"));
}

#[test]
fn manual_root_holds_until_the_zone_moves() {
    let (mut rt, _stage) = runtime_with_stage();
    rt.register(HarmonicMind::new("harmony", HarmonicConfig::default()))
        .unwrap();
    rt.start_all();
    rt.send("harmony", &Message::new("set_root", json!({ "root": 220.0 })))
        .unwrap();

    let labels = cycle_labels(&mut rt, 4);
    assert!(!labels.iter().any(|l| l == "change_root"), "{labels:?}");
    let roots = rt.context().bus.history(Some(topics::ROOT_CHANGE), None);
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].f64_field("root"), Some(220.0));

    rt.context().world.set_zone(Zone::East);
    assert_eq!(cycle_labels(&mut rt, 1), vec!["change_root"]);
    let last = rt.context().bus.last_event(topics::ROOT_CHANGE).unwrap();
    assert_eq!(last.f64_field("root"), Some(196.0));
    assert_eq!(last.str_field("zone"), Some("east"));
}

#[test]
fn settled_mind_only_sustains() {
    let (mut rt, _stage) = runtime_with_stage();
    rt.register(HarmonicMind::new("harmony", HarmonicConfig::default()))
        .unwrap();
    rt.start_all();

    let mut labels = Vec::new();
    for _ in 0..4 {
        labels.extend(rt.cycle_all().into_iter().filter_map(|r| r.action));
    }
    assert_eq!(
        labels,
        vec!["adjust_filter", "adjust_mix", "sustain", "sustain"]
    );
}

#[test]
fn recorder_checkpoints_each_finished_gesture() {
    let store = Rc::new(MemoryPersistence::new());
    let (mut rt, _stage) = runtime_with_stage();
    rt.register(GestureRecorder::new(
        "recorder",
        &RecorderConfig::default(),
        store.clone(),
    ))
    .unwrap();
    rt.start_all();
    let bus = rt.context().bus.clone();

    bus.emit(topics::GESTURE_START, json!({ "x": 0.1, "y": 0.1, "velocity": 0.2 }));
    bus.emit(topics::GESTURE_MOVE, json!({ "x": 0.3, "y": 0.2, "velocity": 0.6 }));
    assert_eq!(store.save_count(), 0);
    bus.emit(
        topics::GESTURE_END,
        json!({ "x": 0.5, "y": 0.3, "velocity": 0.1, "gesture": "drag" }),
    );

    assert_eq!(store.save_count(), 1);
    assert_eq!(store.load().unwrap()[0].points.len(), 3);
    assert_eq!(bus.history(Some(topics::RECORDING_SAVED), None).len(), 1);

    // Event-driven only: ticking never cycles it.
    assert!(rt.tick(10_000).is_empty());
}

/// A store whose disk is always full.
struct FullDisk;

impl Persistence for FullDisk {
    fn save(&self, _recordings: &[Recording]) -> Result<(), PersistenceError> {
        Err(PersistenceError::Io {
            path: "recordings.json".into(),
            source: std::io::Error::other("no space left on device"),
        })
    }

    fn load(&self) -> Result<Vec<Recording>, PersistenceError> {
        Ok(Vec::new())
    }
}

#[test]
fn persistence_failure_is_reported_and_recording_continues() {
    let (mut rt, _stage) = runtime_with_stage();
    rt.register(GestureRecorder::new(
        "recorder",
        &RecorderConfig::default(),
        Rc::new(FullDisk),
    ))
    .unwrap();
    rt.start_all();
    let bus = rt.context().bus.clone();

    let faults = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&faults);
    bus.subscribe(
        topics::ERROR,
        listener(move |event: &mut Event| {
            sink.borrow_mut()
                .push(event.str_field("message").unwrap_or_default().to_owned());
            Ok(())
        }),
    );

    for _ in 0..2 {
        bus.emit(topics::GESTURE_START, json!({ "x": 0.1, "y": 0.1 }));
        bus.emit(topics::GESTURE_END, json!({ "x": 0.2, "y": 0.1 }));
    }

    let faults = faults.borrow();
    assert_eq!(faults.len(), 2);
    assert!(faults[0].contains("no space left on device"));
    assert!(bus.history(Some(topics::RECORDING_SAVED), None).is_empty());
}

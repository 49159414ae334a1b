//! End-to-end delivery scenarios for the `chorus-bus` crate.
//!
//! These exercise the bus only through its public API, the way agents and
//! the runtime loop use it.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::missing_panics_doc
)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use chorus_bus::{
    BusOptions, EventBus, ListenerFault, ManualClock, SubscribeOptions, batch_listener, listener,
    middleware,
};
use chorus_types::Event;
use serde_json::{Value, json};

fn manual_bus(history_limit: usize) -> (EventBus, ManualClock) {
    let clock = ManualClock::new();
    let bus = EventBus::with_options(
        BusOptions {
            history_limit,
            ..BusOptions::default()
        },
        Rc::new(clock.clone()),
    );
    (bus, clock)
}

#[test]
fn zone_wildcard_sees_every_zone_event_but_not_neighbours() {
    let bus = EventBus::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    bus.subscribe(
        "zone.*",
        listener(move |event: &mut Event| {
            sink.borrow_mut().push(event.event_type().to_owned());
            Ok(())
        }),
    );

    for event_type in ["zone.enter", "zone.exit", "zoneenter", "music.zone.enter", "zone"] {
        bus.emit(event_type, Value::Null);
    }

    assert_eq!(*seen.borrow(), vec!["zone.enter", "zone.exit"]);
}

#[test]
fn listener_can_veto_default_and_emitter_observes_it() {
    let bus = EventBus::new();
    bus.subscribe(
        "gesture.start",
        listener(|event: &mut Event| {
            if event.str_field("kind") == Some("hold") {
                event.prevent_default();
            }
            Ok(())
        }),
    );

    let held = bus.emit("gesture.start", json!({ "kind": "hold" }));
    let tapped = bus.emit("gesture.start", json!({ "kind": "tap" }));

    assert!(held.is_prevented());
    assert!(!tapped.is_prevented());
}

#[test]
fn history_keeps_newest_half_after_overflow() {
    let (bus, _clock) = manual_bus(10);
    for n in 0..11u64 {
        bus.emit("step", json!({ "step": n }));
    }

    let history = bus.history(None, None);
    assert_eq!(history.len(), 5);
    let steps: Vec<u64> = history.iter().filter_map(|e| e.u64_field("step")).collect();
    assert_eq!(steps, vec![6, 7, 8, 9, 10]);

    let newest_two = bus.history(Some("step"), Some(2));
    let steps: Vec<u64> = newest_two.iter().filter_map(|e| e.u64_field("step")).collect();
    assert_eq!(steps, vec![9, 10]);
}

#[test]
fn faulting_listener_among_many_produces_one_error_event() {
    let bus = EventBus::new();
    let delivered = Rc::new(RefCell::new(0u32));
    for priority in [3, 1] {
        let delivered = Rc::clone(&delivered);
        bus.subscribe_with(
            "beat",
            listener(move |_event: &mut Event| {
                delivered.replace_with(|n| n.saturating_add(1));
                Ok(())
            }),
            SubscribeOptions::priority(priority),
        );
    }
    bus.subscribe_with(
        "beat",
        listener(|_event: &mut Event| Err(ListenerFault::new("out of tune"))),
        SubscribeOptions::priority(2),
    );

    bus.emit("beat", json!({ "beat": 4 }));

    assert_eq!(*delivered.borrow(), 2);
    let errors = bus.history(Some("error"), None);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].str_field("source_event"), Some("beat"));
    assert_eq!(errors[0].str_field("message"), Some("out of tune"));
}

#[test]
fn middleware_filters_debug_events_for_wildcard_listeners() {
    let bus = EventBus::new();
    bus.add_middleware(middleware(|event: &mut Event| !event.event_type().starts_with("debug.")));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    bus.subscribe(
        "*",
        listener(move |event: &mut Event| {
            sink.borrow_mut().push(event.event_type().to_owned());
            Ok(())
        }),
    );

    bus.emit("debug.trace", Value::Null);
    bus.emit("beat", Value::Null);

    assert_eq!(*seen.borrow(), vec!["beat"]);
    assert_eq!(bus.stats().vetoed, 1);
    assert_eq!(bus.stats().emitted, 1);
}

#[test]
fn throttled_gesture_stream_delivers_leading_and_trailing() {
    let (bus, clock) = manual_bus(100);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    bus.throttle(
        "gesture.move",
        listener(move |event: &mut Event| {
            sink.borrow_mut().push(event.f64_field("x").unwrap_or(-1.0));
            Ok(())
        }),
        Duration::from_millis(100),
    );

    for step in 0..10u32 {
        bus.emit("gesture.move", json!({ "x": f64::from(step) / 10.0 }));
        clock.advance(10);
        bus.run_due_timers();
    }
    clock.advance(100);
    bus.run_due_timers();

    // t=0 leading, t=100 trailing carries the last sample (0.9).
    assert_eq!(seen.borrow().len(), 2);
    assert!((seen.borrow()[1] - 0.9).abs() < f64::EPSILON);
}

#[test]
fn batched_steps_arrive_together() {
    let (bus, clock) = manual_bus(100);
    let batches = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&batches);
    bus.batch(
        "step",
        batch_listener(move |events: &[Event]| {
            sink.borrow_mut()
                .push(events.iter().filter_map(|e| e.u64_field("step")).collect::<Vec<_>>());
            Ok(())
        }),
        Duration::from_millis(50),
    );

    for n in 0..3u64 {
        bus.emit("step", json!({ "step": n }));
        clock.advance(20);
        bus.run_due_timers();
    }
    bus.emit("step", json!({ "step": 3 }));
    clock.advance(50);
    bus.run_due_timers();

    assert_eq!(*batches.borrow(), vec![vec![0, 1, 2], vec![3]]);
}

#[tokio::test]
async fn wait_for_sees_event_emitted_by_another_task_on_same_thread() {
    let bus = EventBus::new();
    let emitter = bus.clone();
    let local = tokio::task::LocalSet::new();
    let event = local
        .run_until(async move {
            tokio::task::spawn_local(async move {
                emitter.emit_async("recording.saved", json!({ "frames": 12 })).await;
            });
            bus.wait_for("recording.saved", Duration::from_secs(1)).await
        })
        .await
        .unwrap();
    assert_eq!(event.u64_field("frames"), Some(12));
}

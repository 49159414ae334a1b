//! Lifecycle, scheduling and decision-cycle behaviour of the agent runtime,
//! driven through a small scripted mind.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::missing_panics_doc
)]

use std::cell::RefCell;
use std::rc::Rc;

use chorus_bus::{EventBus, listener};
use chorus_core::config::{ClockConfig, RuntimeConfig};
use chorus_core::{
    AgentRuntime, Context, EndReason, Message, Metronome, Mind, NoOpHook, Percept, Perceptions,
    RuntimeControl, RuntimeError, run,
};
use chorus_types::{Event, Lifecycle};
use chorus_world::WorldState;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
enum ScriptError {
    #[error("unsupported message {0}")]
    Unsupported(String),
    #[error("action {0} failed")]
    Failed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Quiet,
    Loud,
    Echo,
    Explode,
}

/// Scripted mind: proposes a fixed list, scores from a table, logs what it
/// does into a shared journal.
struct ScriptedMind {
    id: String,
    rate_hz: f64,
    proposals: Vec<(Step, f64)>,
    journal: Rc<RefCell<Vec<String>>>,
    level: f64,
}

impl ScriptedMind {
    fn new(id: &str, proposals: Vec<(Step, f64)>, journal: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            id: id.to_owned(),
            rate_hz: 10.0,
            proposals,
            journal: Rc::clone(journal),
            level: 0.5,
        }
    }

    fn log(&self, entry: String) {
        self.journal.borrow_mut().push(entry);
    }
}

impl Mind for ScriptedMind {
    type Action = Step;
    type Error = ScriptError;

    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "scripted"
    }

    fn update_rate_hz(&self) -> f64 {
        self.rate_hz
    }

    fn subscriptions(&self) -> Vec<String> {
        vec!["ping".to_owned()]
    }

    fn on_start(&mut self, _ctx: &Context) {
        self.log(format!("{}:start", self.id));
    }

    fn on_stop(&mut self, _ctx: &Context) {
        self.log(format!("{}:stop", self.id));
    }

    fn perceive(&self, ctx: &Context) -> Percept {
        let mut percept = Percept::new();
        percept.insert("tension".to_owned(), json!(ctx.world.tension()));
        percept
    }

    fn possible_actions(&self, _perceptions: &Perceptions) -> Vec<Step> {
        self.proposals.iter().map(|(step, _)| *step).collect()
    }

    fn evaluate_action(&self, _perceptions: &Perceptions, action: &Step) -> f64 {
        self.proposals
            .iter()
            .find(|(step, _)| step == action)
            .map_or(0.0, |(_, score)| *score)
    }

    fn execute_action(&mut self, action: Step, ctx: &Context) -> Result<(), ScriptError> {
        self.log(format!("{}:execute:{action:?}", self.id));
        match action {
            Step::Quiet => self.level = 0.2,
            Step::Loud => self.level = 0.9,
            Step::Echo => {
                ctx.bus.emit("ping", json!({ "from": self.id }));
                self.log(format!("{}:after-emit", self.id));
            }
            Step::Explode => return Err(ScriptError::Failed("explode")),
        }
        Ok(())
    }

    fn calculate_reward(&self, perceptions: &Perceptions) -> f64 {
        1.0 - perceptions.f64_or("tension", 0.0)
    }

    fn on_event(&mut self, event: &Event, _ctx: &Context) -> Result<(), ScriptError> {
        self.log(format!("{}:event:{}", self.id, event.event_type()));
        Ok(())
    }

    fn handle_message(&mut self, message: &Message, _ctx: &Context) -> Result<(), ScriptError> {
        match message.topic.as_str() {
            "set_level" => {
                self.level = message.payload["level"].as_f64().unwrap_or(self.level);
                Ok(())
            }
            other => Err(ScriptError::Unsupported(other.to_owned())),
        }
    }

    fn energy(&self) -> f64 {
        self.level
    }
}

fn runtime() -> AgentRuntime {
    AgentRuntime::new(Context::new(EventBus::new(), WorldState::new()))
}

fn journal() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn duplicate_registration_is_rejected() {
    let log = journal();
    let mut rt = runtime();
    rt.register(ScriptedMind::new("a", vec![], &log)).unwrap();
    let err = rt.register(ScriptedMind::new("a", vec![], &log)).unwrap_err();
    assert_eq!(err, RuntimeError::DuplicateAgent { id: "a".to_owned() });
    assert_eq!(rt.len(), 1);
}

#[test]
fn lifecycle_transitions_are_idempotent() {
    let log = journal();
    let mut rt = runtime();
    rt.register(ScriptedMind::new("a", vec![], &log)).unwrap();

    assert!(rt.start("a").unwrap());
    assert!(!rt.start("a").unwrap());
    assert_eq!(rt.status("a").unwrap().lifecycle, Lifecycle::Running);
    assert_eq!(rt.context().bus.listener_count("ping"), 1);

    assert!(rt.stop("a").unwrap());
    assert!(!rt.stop("a").unwrap());
    assert_eq!(rt.status("a").unwrap().lifecycle, Lifecycle::Stopped);
    assert_eq!(rt.context().bus.listener_count("ping"), 0);

    assert_eq!(*log.borrow(), vec!["a:start", "a:stop"]);
    assert_eq!(rt.context().bus.history(Some("agent.started"), None).len(), 1);
    assert_eq!(rt.context().bus.history(Some("agent.stopped"), None).len(), 1);
}

#[test]
fn tick_honours_update_rate_and_registration_order() {
    let log = journal();
    let mut rt = runtime();
    rt.register(ScriptedMind::new("first", vec![(Step::Quiet, 0.5)], &log))
        .unwrap();
    rt.register(ScriptedMind::new("second", vec![(Step::Loud, 0.5)], &log))
        .unwrap();
    assert_eq!(rt.start_all(), 2);
    log.borrow_mut().clear();

    let reports = rt.tick(1_000);
    let agents: Vec<&str> = reports.iter().map(|r| r.agent.as_str()).collect();
    assert_eq!(agents, vec!["first", "second"]);
    assert!(rt.tick(1_050).is_empty());
    assert_eq!(rt.tick(1_100).len(), 2);
    assert_eq!(rt.status("first").unwrap().cycles, 2);
    assert_eq!(
        *log.borrow(),
        vec![
            "first:execute:Quiet",
            "second:execute:Loud",
            "first:execute:Quiet",
            "second:execute:Loud",
        ]
    );
}

#[test]
fn stopped_minds_neither_cycle_nor_hear_events() {
    let log = journal();
    let mut rt = runtime();
    rt.register(ScriptedMind::new("a", vec![(Step::Quiet, 1.0)], &log))
        .unwrap();
    assert!(rt.tick(0).is_empty());
    assert!(rt.cycle_all().is_empty());
    assert!(matches!(rt.cycle("a"), Err(RuntimeError::NotRunning { .. })));
    rt.context().bus.emit("ping", json!({}));
    assert!(log.borrow().is_empty());
}

#[test]
fn ties_go_to_the_first_proposal_and_scores_are_clamped() {
    let log = journal();
    let mut rt = runtime();
    rt.register(ScriptedMind::new(
        "a",
        vec![(Step::Quiet, 7.0), (Step::Loud, 3.0)],
        &log,
    ))
    .unwrap();
    rt.start("a").unwrap();

    let report = rt.cycle("a").unwrap();
    assert_eq!(report.action.as_deref(), Some("Quiet"));
    assert_eq!(report.score, Some(1.0));
    let status = rt.status("a").unwrap();
    assert_eq!(status.last_score, Some(1.0));
    assert_eq!(status.energy, 0.2);
}

#[test]
fn no_candidates_means_no_action_but_still_a_reward() {
    let log = journal();
    let mut rt = runtime();
    rt.context().world.set_tension(0.25);
    rt.register(ScriptedMind::new("a", vec![], &log)).unwrap();
    rt.start("a").unwrap();

    let report = rt.cycle("a").unwrap();
    assert_eq!(report.action, None);
    assert_eq!(report.reward, 0.75);
    assert_eq!(rt.status("a").unwrap().last_reward, Some(0.75));
}

#[test]
fn own_events_emitted_mid_cycle_are_deferred_until_the_cycle_ends() {
    let log = journal();
    let mut rt = runtime();
    rt.register(ScriptedMind::new("a", vec![(Step::Echo, 1.0)], &log))
        .unwrap();
    rt.register(ScriptedMind::new("b", vec![], &log)).unwrap();
    rt.start_all();
    log.borrow_mut().clear();

    rt.cycle("a").unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "a:execute:Echo",
            "b:event:ping",
            "a:after-emit",
            "a:event:ping",
        ]
    );
    assert_eq!(rt.status("a").unwrap().deferred_events, 0);
}

#[test]
fn failed_execution_raises_an_error_event() {
    let log = journal();
    let mut rt = runtime();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    rt.context().bus.subscribe(
        "error",
        listener(move |event: &mut Event| {
            sink.borrow_mut().push(event.str_field("agent").unwrap_or("").to_owned());
            Ok(())
        }),
    );
    rt.register(ScriptedMind::new("a", vec![(Step::Explode, 1.0)], &log))
        .unwrap();
    rt.start("a").unwrap();

    let report = rt.cycle("a").unwrap();
    assert_eq!(report.error.as_deref(), Some("action explode failed"));
    assert_eq!(*errors.borrow(), vec!["a"]);
}

#[test]
fn messages_apply_immediately_and_unknown_topics_are_rejected() {
    let log = journal();
    let mut rt = runtime();
    rt.register(ScriptedMind::new("a", vec![], &log)).unwrap();

    rt.send("a", &Message::new("set_level", json!({ "level": 0.8 })))
        .unwrap();
    assert_eq!(rt.status("a").unwrap().energy, 0.8);

    let err = rt
        .send("a", &Message::new("dance", json!({})))
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::MessageRejected { ref topic, .. } if topic == "dance"
    ));
    assert!(matches!(
        rt.send("ghost", &Message::new("set_level", json!({}))),
        Err(RuntimeError::UnknownAgent { .. })
    ));
}

#[test]
fn deregister_stops_and_removes() {
    let log = journal();
    let mut rt = runtime();
    rt.register(ScriptedMind::new("a", vec![], &log)).unwrap();
    rt.register(ScriptedMind::new("b", vec![], &log)).unwrap();
    rt.start("a").unwrap();
    rt.deregister("a").unwrap();
    assert_eq!(rt.ids(), vec!["b"]);
    assert_eq!(rt.context().bus.listener_count("ping"), 0);
    assert!(log.borrow().contains(&"a:stop".to_owned()));
    assert!(matches!(
        rt.deregister("a"),
        Err(RuntimeError::UnknownAgent { .. })
    ));
}

#[tokio::test]
async fn run_loop_stops_at_tick_limit() {
    let log = journal();
    let mut rt = runtime();
    let mut mind = ScriptedMind::new("a", vec![(Step::Quiet, 1.0)], &log);
    mind.rate_hz = 10_000.0;
    rt.register(mind).unwrap();
    rt.start_all();

    let mut metronome = Metronome::new(&ClockConfig::default()).unwrap();
    let control = RuntimeControl::new(&RuntimeConfig {
        tick_interval_ms: 1,
        max_ticks: 3,
        max_real_time_seconds: 0,
    });

    let result = run(&mut rt, &mut metronome, &control, &mut NoOpHook)
        .await
        .unwrap();
    assert_eq!(result.end_reason, EndReason::MaxTicksReached);
    assert_eq!(result.total_ticks, 3);
    assert_eq!(result.total_cycles, 3);
    assert!(result.total_steps >= 1);
    let steps = rt.context().bus.history(Some("step"), None);
    assert_eq!(steps.len(), usize::try_from(result.total_steps).unwrap());
}

#[tokio::test]
async fn run_loop_honours_stop_request() {
    let mut rt = runtime();
    let mut metronome = Metronome::new(&ClockConfig::default()).unwrap();
    let control = RuntimeControl::new(&RuntimeConfig::default());
    control.request_stop();
    let result = run(&mut rt, &mut metronome, &control, &mut NoOpHook)
        .await
        .unwrap();
    assert_eq!(result.end_reason, EndReason::StopRequested);
    assert_eq!(result.total_ticks, 0);
}

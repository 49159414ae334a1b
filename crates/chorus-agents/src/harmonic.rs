//! The harmonic mind: keeps a chord progression moving in time with the
//! metronome and steers root, voicing, repertoire, filter and mix from the
//! world state.
//!
//! Timing lives in the bus handlers. Every `beat` counts one beat on the
//! active chord; when the chord's duration is reached the cursor moves on
//! (wrapping), the chord is re-triggered and `chord.change` is emitted.
//! Every `bar` feeds the coarse counters that make voicing rotation and
//! repertoire switching due.
//!
//! Decisions live in the cycle. Each cycle proposes at most one of each
//! [`HarmonicAction`] plus a [`HarmonicAction::Sustain`] fallback, so the
//! selected action always executes and energy decays every cycle.
//!
//! The world drives root and repertoire only when it moves. A root set by
//! `set_root` holds until the world zone leaves the zone it was set in, and
//! a progression picked by `set_progression` holds until the world era
//! changes or the next periodic switch, which rotates within that
//! progression's own era.

use chorus_core::config::HarmonicConfig;
use chorus_core::{Context, Message, Mind, Percept, Perceptions, Stage, VoiceHandle};
use chorus_types::{Era, Event, Zone, topics};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::AgentError;
use crate::theory::{
    DEFAULT_ROOT_HZ, Progression, ProgressionCursor, Voicing, find_progression, repertoire,
    zone_root_hz,
};

/// Mix bus the pad level is written to.
pub const PAD_BUS: &str = "pad";

const CHORD_GAIN: f64 = 0.4;
const DRONE_GAIN: f64 = 0.2;
const INITIAL_ENERGY: f64 = 0.5;

// Percept keys.
const ERA: &str = "era";
const ZONE: &str = "zone";
const DYNAMICS: &str = "dynamics";
const TENSION: &str = "tension";
const WORLD_ENERGY: &str = "world_energy";
const ENERGY: &str = "energy";
const BAR: &str = "bar";
const BEAT: &str = "beat";
const STEP: &str = "step";

/// Candidate actions of the harmonic mind.
#[derive(Debug, Clone, PartialEq)]
pub enum HarmonicAction {
    /// Move the key root to the perceived zone's root.
    ChangeRoot {
        /// New root frequency.
        root_hz: f64,
        /// Zone the root belongs to.
        zone: Zone,
    },
    /// Rotate to the next voicing.
    RotateVoicing {
        /// Voicing to switch to.
        voicing: Voicing,
    },
    /// Replace the active progression.
    SwitchProgression {
        /// Era the new progression belongs to.
        era: Era,
        /// The new progression.
        progression: Progression,
        /// Whether the switch was triggered by an era change.
        era_changed: bool,
    },
    /// Move the filter cutoff towards the tension target.
    AdjustFilter {
        /// New cutoff.
        cutoff_hz: f64,
    },
    /// Move the pad level towards the dynamics target.
    AdjustMix {
        /// New level, `[0, 1]`.
        level: f64,
    },
    /// Keep everything as it is.
    Sustain,
}

impl HarmonicAction {
    /// Short label used in status and logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ChangeRoot { .. } => "change_root",
            Self::RotateVoicing { .. } => "rotate_voicing",
            Self::SwitchProgression { .. } => "switch_progression",
            Self::AdjustFilter { .. } => "adjust_filter",
            Self::AdjustMix { .. } => "adjust_mix",
            Self::Sustain => "sustain",
        }
    }
}

/// The harmonic mind.
#[derive(Debug)]
pub struct HarmonicMind {
    id: String,
    config: HarmonicConfig,
    root_hz: f64,
    voicing: Voicing,
    progression: Progression,
    repertoire_era: Era,
    era_heard: Era,
    root_override: Option<Zone>,
    cursor: ProgressionCursor,
    bar: u64,
    beat: u64,
    bars_since_voicing: u64,
    bars_since_switch: u64,
    energy: f64,
    filter_cutoff_hz: Option<f64>,
    mix_level: Option<f64>,
    chord: Option<VoiceHandle>,
    drone: Option<VoiceHandle>,
}

impl HarmonicMind {
    /// Create a stopped harmonic mind on the default root and repertoire.
    pub fn new(id: impl Into<String>, config: HarmonicConfig) -> Self {
        Self {
            id: id.into(),
            config,
            root_hz: DEFAULT_ROOT_HZ,
            voicing: Voicing::default(),
            progression: first_of(Era::DEFAULT),
            repertoire_era: Era::DEFAULT,
            era_heard: Era::DEFAULT,
            root_override: None,
            cursor: ProgressionCursor::new(),
            bar: 0,
            beat: 0,
            bars_since_voicing: 0,
            bars_since_switch: 0,
            energy: INITIAL_ENERGY,
            filter_cutoff_hz: None,
            mix_level: None,
            chord: None,
            drone: None,
        }
    }

    /// Current key root.
    pub const fn root_hz(&self) -> f64 {
        self.root_hz
    }

    /// Current voicing.
    pub const fn voicing(&self) -> Voicing {
        self.voicing
    }

    /// Active progression.
    pub const fn progression(&self) -> &Progression {
        &self.progression
    }

    /// Zone a manually set root is pinned to, if any.
    pub const fn root_override(&self) -> Option<Zone> {
        self.root_override
    }

    /// Position in the active progression.
    pub const fn cursor(&self) -> ProgressionCursor {
        self.cursor
    }

    /// Last bar index seen.
    pub const fn bar(&self) -> u64 {
        self.bar
    }

    /// Last filter cutoff sent to the stage.
    pub const fn filter_cutoff_hz(&self) -> Option<f64> {
        self.filter_cutoff_hz
    }

    /// Last pad level sent to the stage.
    pub const fn mix_level(&self) -> Option<f64> {
        self.mix_level
    }

    fn filter_span(&self) -> f64 {
        (self.config.filter_max_hz - self.config.filter_min_hz).max(0.0)
    }

    fn filter_target(&self, tension: f64) -> f64 {
        tension
            .clamp(0.0, 1.0)
            .mul_add(self.filter_span(), self.config.filter_min_hz)
    }

    fn chord_frequencies(&self) -> Vec<f64> {
        self.progression
            .step(self.cursor.index())
            .map(|step| {
                self.voicing
                    .frequencies(step.chord_root_hz(self.root_hz), step.quality)
            })
            .unwrap_or_default()
    }

    fn chord_payload(&self) -> Value {
        let step = self.progression.step(self.cursor.index());
        json!({
            "step": self.cursor.index(),
            "root": self.root_hz,
            "quality": step.map(|s| s.quality.as_str()),
            "voicing": self.voicing.as_str(),
            "progression": self.progression.name,
        })
    }

    fn retrigger(&mut self, stage: &dyn Stage) {
        if let Some(handle) = self.chord.take() {
            stage.stop_chord(handle);
        }
        let gain = CHORD_GAIN * 0.5f64.mul_add(self.energy, 0.5);
        self.chord = Some(stage.play_chord(&self.chord_frequencies(), gain));
    }

    fn restart_drone(&mut self, stage: &dyn Stage) {
        if let Some(handle) = self.drone.take() {
            stage.stop_tone(handle);
        }
        self.drone = Some(stage.start_tone(self.root_hz / 2.0, DRONE_GAIN));
    }

    fn apply_root(&mut self, root_hz: f64, zone: Option<Zone>, ctx: &Context) {
        let previous = self.root_hz;
        self.root_hz = root_hz;
        self.restart_drone(ctx.stage.as_ref());
        self.retrigger(ctx.stage.as_ref());
        info!(agent = %self.id, previous, root_hz, zone = ?zone, "root changed");
        ctx.bus.emit(
            topics::ROOT_CHANGE,
            json!({
                "root": root_hz,
                "previous": previous,
                "zone": zone.map(Zone::as_str),
            }),
        );
    }

    fn apply_progression(&mut self, era: Era, progression: Progression, ctx: &Context) {
        self.progression = progression;
        self.repertoire_era = era;
        self.cursor.reset();
        self.bars_since_switch = 0;
        self.retrigger(ctx.stage.as_ref());
        info!(
            agent = %self.id,
            progression = %self.progression.name,
            era = %era,
            "progression switched"
        );
        ctx.bus.emit(
            topics::PROGRESSION_CHANGE,
            json!({
                "name": self.progression.name,
                "era": era.as_str(),
                "steps": self.progression.len(),
            }),
        );
    }

    /// Next progression to switch to: the era's first one after an era
    /// change, otherwise the one after the current progression within
    /// `era`.
    fn next_progression(&self, era: Era, era_changed: bool) -> Progression {
        let choices = repertoire(era);
        let position = if era_changed {
            None
        } else {
            choices.iter().position(|p| p.name == self.progression.name)
        };
        let next = position
            .and_then(|i| i.saturating_add(1).checked_rem(choices.len()))
            .unwrap_or(0);
        choices
            .into_iter()
            .nth(next)
            .unwrap_or_else(|| first_of(era))
    }

    fn on_beat(&mut self, event: &Event, ctx: &Context) {
        self.beat = event
            .u64_field(BEAT)
            .unwrap_or_else(|| self.beat.saturating_add(1));
        if let Some(index) = self.cursor.advance_beat(&self.progression) {
            self.retrigger(ctx.stage.as_ref());
            let payload = self.chord_payload();
            debug!(agent = %self.id, step = index, beat = self.beat, "chord change");
            ctx.stage.visual_cue("chord", &payload);
            ctx.bus.emit(topics::CHORD_CHANGE, payload);
        }
    }

    fn on_bar(&mut self, event: &Event) {
        self.bar = event
            .u64_field(BAR)
            .unwrap_or_else(|| self.bar.saturating_add(1));
        self.bars_since_voicing = self.bars_since_voicing.saturating_add(1);
        self.bars_since_switch = self.bars_since_switch.saturating_add(1);
    }

    fn on_gesture(&mut self, event: &Event) {
        let velocity = event.f64_field("velocity").unwrap_or(0.0).clamp(0.0, 1.0);
        self.energy = velocity
            .mul_add(self.config.gesture_energy_gain, self.energy)
            .clamp(0.0, 1.0);
    }
}

fn first_of(era: Era) -> Progression {
    repertoire(era)
        .into_iter()
        .next()
        .unwrap_or_else(|| Progression::new(era.as_str(), Vec::new()))
}

impl Mind for HarmonicMind {
    type Action = HarmonicAction;
    type Error = AgentError;

    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "harmonic"
    }

    fn update_rate_hz(&self) -> f64 {
        self.config.update_rate_hz
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![
            topics::BEAT.to_owned(),
            topics::BAR.to_owned(),
            topics::GESTURE_ANY.to_owned(),
        ]
    }

    fn on_start(&mut self, ctx: &Context) {
        let era = ctx.world.era();
        self.progression = first_of(era);
        self.repertoire_era = era;
        self.era_heard = era;
        self.root_override = None;
        self.root_hz = zone_root_hz(ctx.world.zone());
        self.cursor.reset();
        self.bars_since_voicing = 0;
        self.bars_since_switch = 0;
        self.restart_drone(ctx.stage.as_ref());
        self.retrigger(ctx.stage.as_ref());
        info!(
            agent = %self.id,
            era = %era,
            progression = %self.progression.name,
            root_hz = self.root_hz,
            "harmonic mind started"
        );
    }

    fn on_stop(&mut self, ctx: &Context) {
        if let Some(handle) = self.chord.take() {
            ctx.stage.stop_chord(handle);
        }
        if let Some(handle) = self.drone.take() {
            ctx.stage.stop_tone(handle);
        }
    }

    fn perceive(&self, ctx: &Context) -> Percept {
        let mut percept = Percept::new();
        percept.insert(ERA.to_owned(), json!(ctx.world.era().as_str()));
        percept.insert(ZONE.to_owned(), json!(ctx.world.zone().as_str()));
        percept.insert(DYNAMICS.to_owned(), json!(ctx.world.dynamics()));
        percept.insert(TENSION.to_owned(), json!(ctx.world.tension()));
        percept.insert(WORLD_ENERGY.to_owned(), json!(ctx.world.energy()));
        percept.insert(ENERGY.to_owned(), json!(self.energy));
        percept.insert(BAR.to_owned(), json!(self.bar));
        percept.insert(BEAT.to_owned(), json!(self.beat));
        percept.insert(STEP.to_owned(), json!(self.cursor.index()));
        percept
    }

    fn possible_actions(&self, perceptions: &Perceptions) -> Vec<HarmonicAction> {
        let mut actions = vec![HarmonicAction::Sustain];

        let zone = Zone::resolve(perceptions.str(ZONE).unwrap_or_default());
        let target_root = zone_root_hz(zone);
        let root_due = match self.root_override {
            Some(pinned) => zone != pinned,
            None => (target_root - self.root_hz).abs() > self.config.root_threshold_hz,
        };
        if root_due {
            actions.push(HarmonicAction::ChangeRoot {
                root_hz: target_root,
                zone,
            });
        }

        let rotation = self.config.voicing_rotation_bars;
        if rotation > 0 && self.bars_since_voicing >= rotation {
            actions.push(HarmonicAction::RotateVoicing {
                voicing: self.voicing.next(),
            });
        }

        let era = Era::resolve(perceptions.str(ERA).unwrap_or_default());
        let switch = self.config.progression_switch_bars;
        if era != self.era_heard {
            actions.push(HarmonicAction::SwitchProgression {
                era,
                progression: self.next_progression(era, true),
                era_changed: true,
            });
        } else if switch > 0 && self.bars_since_switch >= switch {
            let own = self.repertoire_era;
            actions.push(HarmonicAction::SwitchProgression {
                era: own,
                progression: self.next_progression(own, false),
                era_changed: false,
            });
        }

        let cutoff_hz = self.filter_target(perceptions.f64_or(TENSION, 0.0));
        let filter_band = self.config.deadband * self.filter_span();
        if self
            .filter_cutoff_hz
            .is_none_or(|current| (current - cutoff_hz).abs() > filter_band)
        {
            actions.push(HarmonicAction::AdjustFilter { cutoff_hz });
        }

        let level = perceptions.f64_or(DYNAMICS, 0.5).clamp(0.0, 1.0);
        if self
            .mix_level
            .is_none_or(|current| (current - level).abs() > self.config.deadband)
        {
            actions.push(HarmonicAction::AdjustMix { level });
        }

        actions
    }

    fn evaluate_action(&self, _perceptions: &Perceptions, action: &HarmonicAction) -> f64 {
        match action {
            HarmonicAction::SwitchProgression {
                era_changed: true, ..
            } => 0.95,
            HarmonicAction::ChangeRoot { .. } => 0.9,
            HarmonicAction::SwitchProgression { .. } => 0.7,
            HarmonicAction::RotateVoicing { .. } => 0.6,
            HarmonicAction::AdjustFilter { cutoff_hz } => {
                let span = self.filter_span().max(1.0);
                let delta = self
                    .filter_cutoff_hz
                    .map_or(1.0, |current| ((current - cutoff_hz).abs() / span).min(1.0));
                0.5f64.mul_add(delta, 0.3)
            }
            HarmonicAction::AdjustMix { level } => {
                let delta = self
                    .mix_level
                    .map_or(1.0, |current| (current - level).abs().min(1.0));
                0.5f64.mul_add(delta, 0.25)
            }
            HarmonicAction::Sustain => 0.1,
        }
    }

    fn execute_action(&mut self, action: HarmonicAction, ctx: &Context) -> Result<(), AgentError> {
        match action {
            HarmonicAction::ChangeRoot { root_hz, zone } => {
                self.root_override = None;
                self.apply_root(root_hz, Some(zone), ctx);
            }
            HarmonicAction::RotateVoicing { voicing } => {
                self.voicing = voicing;
                self.bars_since_voicing = 0;
                self.retrigger(ctx.stage.as_ref());
                debug!(agent = %self.id, voicing = voicing.as_str(), "voicing rotated");
                ctx.bus
                    .emit(topics::VOICING_CHANGE, json!({ "voicing": voicing.as_str() }));
            }
            HarmonicAction::SwitchProgression {
                era,
                progression,
                era_changed,
            } => {
                if era_changed {
                    self.era_heard = era;
                }
                self.apply_progression(era, progression, ctx);
            }
            HarmonicAction::AdjustFilter { cutoff_hz } => {
                ctx.stage.set_filter_cutoff(cutoff_hz);
                self.filter_cutoff_hz = Some(cutoff_hz);
            }
            HarmonicAction::AdjustMix { level } => {
                ctx.stage.set_mix_level(PAD_BUS, level);
                self.mix_level = Some(level);
            }
            HarmonicAction::Sustain => {}
        }
        self.energy = (self.energy - self.config.energy_decay).max(0.0);
        Ok(())
    }

    /// How closely the mind's energy tracks the room's.
    fn calculate_reward(&self, perceptions: &Perceptions) -> f64 {
        let room = perceptions.f64_or(WORLD_ENERGY, 0.5);
        (1.0 - (self.energy - room).abs()).clamp(0.0, 1.0)
    }

    fn on_event(&mut self, event: &Event, ctx: &Context) -> Result<(), AgentError> {
        match event.event_type() {
            topics::BEAT => self.on_beat(event, ctx),
            topics::BAR => self.on_bar(event),
            topics::GESTURE_START | topics::GESTURE_MOVE | topics::GESTURE_END => {
                self.on_gesture(event);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_message(&mut self, message: &Message, ctx: &Context) -> Result<(), AgentError> {
        let topic = message.topic.as_str();
        match topic {
            "set_progression" => {
                let name = message
                    .payload
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::invalid(topic, "missing string field `name`"))?;
                let (era, progression) = find_progression(name)
                    .ok_or_else(|| AgentError::invalid(topic, format!("unknown progression {name}")))?;
                self.apply_progression(era, progression, ctx);
            }
            "set_root" => {
                let root_hz = message
                    .payload
                    .get("root")
                    .and_then(Value::as_f64)
                    .filter(|hz| hz.is_finite() && *hz > 0.0)
                    .ok_or_else(|| AgentError::invalid(topic, "`root` must be a positive number"))?;
                self.root_override = Some(ctx.world.zone());
                self.apply_root(root_hz, None, ctx);
            }
            "set_energy" => {
                let energy = message
                    .payload
                    .get("energy")
                    .and_then(Value::as_f64)
                    .filter(|e| e.is_finite())
                    .ok_or_else(|| AgentError::invalid(topic, "`energy` must be a number"))?;
                self.energy = energy.clamp(0.0, 1.0);
            }
            _ => {
                return Err(AgentError::UnsupportedMessage {
                    topic: topic.to_owned(),
                });
            }
        }
        Ok(())
    }

    fn energy(&self) -> f64 {
        self.energy
    }

    fn describe(&self, action: &HarmonicAction) -> String {
        action.label().to_owned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::rc::Rc;

    use chorus_bus::EventBus;
    use chorus_core::{RecordingStage, StageCall};
    use chorus_world::WorldState;

    use super::*;
    use crate::theory::{ChordQuality, ProgressionStep};

    fn setup() -> (HarmonicMind, Context, Rc<RecordingStage>) {
        let stage = Rc::new(RecordingStage::new());
        let ctx = Context::with_stage(EventBus::new(), WorldState::new(), stage.clone());
        (
            HarmonicMind::new("harmony", HarmonicConfig::default()),
            ctx,
            stage,
        )
    }

    fn two_eights() -> Progression {
        Progression::new(
            "pair",
            vec![
                ProgressionStep::new(1, ChordQuality::Major, 8),
                ProgressionStep::new(4, ChordQuality::Major, 8),
            ],
        )
    }

    fn perceive(mind: &HarmonicMind, ctx: &Context) -> Perceptions {
        let mut perceptions = Perceptions::new();
        perceptions.rotate(mind.perceive(ctx));
        perceptions
    }

    #[test]
    fn start_plays_but_never_announces_a_chord_change() {
        let (mut mind, ctx, stage) = setup();
        mind.on_start(&ctx);
        assert!(stage.last_chord().is_some());
        assert!(ctx.bus.history(Some(topics::CHORD_CHANGE), None).is_empty());
    }

    #[test]
    fn one_chord_change_on_the_eighth_beat() {
        let (mut mind, ctx, _stage) = setup();
        mind.on_start(&ctx);
        mind.progression = two_eights();
        for beat in 1..=7u64 {
            mind.on_event(&Event::new(topics::BEAT, json!({ "beat": beat })), &ctx)
                .unwrap();
        }
        assert!(ctx.bus.history(Some(topics::CHORD_CHANGE), None).is_empty());
        mind.on_event(&Event::new(topics::BEAT, json!({ "beat": 8 })), &ctx)
            .unwrap();
        let changes = ctx.bus.history(Some(topics::CHORD_CHANGE), None);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].u64_field("step"), Some(1));
        assert_eq!(changes[0].str_field("quality"), Some("major"));
    }

    #[test]
    fn root_follows_zone_beyond_threshold_only() {
        let (mut mind, ctx, _stage) = setup();
        mind.on_start(&ctx);

        mind.root_hz = DEFAULT_ROOT_HZ + 0.5;
        let actions = mind.possible_actions(&perceive(&mind, &ctx));
        assert!(!actions.iter().any(|a| matches!(a, HarmonicAction::ChangeRoot { .. })));

        ctx.world.set_zone(Zone::East);
        let actions = mind.possible_actions(&perceive(&mind, &ctx));
        assert!(actions.contains(&HarmonicAction::ChangeRoot {
            root_hz: 196.00,
            zone: Zone::East,
        }));
    }

    #[test]
    fn era_change_outranks_everything() {
        let (mut mind, ctx, _stage) = setup();
        mind.on_start(&ctx);
        ctx.world.set_era(Era::Modern);
        ctx.world.set_zone(Zone::West);
        let perceptions = perceive(&mind, &ctx);
        let best = mind
            .possible_actions(&perceptions)
            .into_iter()
            .map(|a| {
                let score = mind.evaluate_action(&perceptions, &a);
                (a, score)
            })
            .fold(None::<(HarmonicAction, f64)>, |best, (a, s)| match best {
                Some((_, b)) if s <= b => best,
                _ => Some((a, s)),
            })
            .unwrap();
        assert!(matches!(
            best.0,
            HarmonicAction::SwitchProgression {
                era: Era::Modern,
                era_changed: true,
                ..
            }
        ));
    }

    #[test]
    fn bars_make_voicing_rotation_due() {
        let (mut mind, ctx, _stage) = setup();
        mind.on_start(&ctx);
        for bar in 0..4u64 {
            mind.on_event(&Event::new(topics::BAR, json!({ "bar": bar })), &ctx)
                .unwrap();
        }
        let actions = mind.possible_actions(&perceive(&mind, &ctx));
        assert!(actions.contains(&HarmonicAction::RotateVoicing {
            voicing: Voicing::Open
        }));

        mind.execute_action(HarmonicAction::RotateVoicing { voicing: Voicing::Open }, &ctx)
            .unwrap();
        assert_eq!(mind.voicing(), Voicing::Open);
        let actions = mind.possible_actions(&perceive(&mind, &ctx));
        assert!(!actions.iter().any(|a| matches!(a, HarmonicAction::RotateVoicing { .. })));
    }

    #[test]
    fn periodic_switch_walks_the_repertoire_and_resets_counters() {
        let (mut mind, ctx, _stage) = setup();
        mind.on_start(&ctx);
        mind.on_event(&Event::new(topics::BEAT, json!({ "beat": 1 })), &ctx)
            .unwrap();
        mind.bars_since_switch = 16;
        let actions = mind.possible_actions(&perceive(&mind, &ctx));
        let switch = actions
            .into_iter()
            .find(|a| matches!(a, HarmonicAction::SwitchProgression { .. }))
            .unwrap();
        mind.execute_action(switch, &ctx).unwrap();
        assert_eq!(mind.progression().name, "breath");
        assert_eq!(mind.cursor(), ProgressionCursor::new());
        assert_eq!(ctx.bus.history(Some(topics::PROGRESSION_CHANGE), None).len(), 1);
    }

    #[test]
    fn filter_and_mix_respect_the_deadband() {
        let (mut mind, ctx, stage) = setup();
        mind.on_start(&ctx);
        ctx.world.set_tension(0.5);
        mind.execute_action(HarmonicAction::AdjustFilter { cutoff_hz: 4200.0 }, &ctx)
            .unwrap();
        mind.execute_action(HarmonicAction::AdjustMix { level: 0.5 }, &ctx)
            .unwrap();
        assert!(stage.calls().contains(&StageCall::MixLevel {
            bus: PAD_BUS.to_owned(),
            level: 0.5
        }));

        ctx.world.set_dynamics(0.52);
        let actions = mind.possible_actions(&perceive(&mind, &ctx));
        assert_eq!(actions, vec![HarmonicAction::Sustain]);

        ctx.world.set_dynamics(0.9);
        let actions = mind.possible_actions(&perceive(&mind, &ctx));
        assert!(actions.contains(&HarmonicAction::AdjustMix { level: 0.9 }));
    }

    #[test]
    fn gestures_raise_energy_and_cycles_decay_it() {
        let (mut mind, ctx, _stage) = setup();
        mind.on_event(
            &Event::new(topics::GESTURE_MOVE, json!({ "velocity": 1.0 })),
            &ctx,
        )
        .unwrap();
        assert!((mind.energy() - 0.75).abs() < 1e-9);
        mind.execute_action(HarmonicAction::Sustain, &ctx).unwrap();
        assert!((mind.energy() - 0.73).abs() < 1e-9);
    }

    #[test]
    fn messages_steer_and_reject() {
        let (mut mind, ctx, _stage) = setup();
        mind.handle_message(&Message::new("set_progression", json!({ "name": "loop" })), &ctx)
            .unwrap();
        assert_eq!(mind.progression().name, "loop");

        mind.handle_message(&Message::new("set_root", json!({ "root": 220.0 })), &ctx)
            .unwrap();
        assert_eq!(mind.root_hz(), 220.0);

        mind.handle_message(&Message::new("set_energy", json!({ "energy": 4.0 })), &ctx)
            .unwrap();
        assert_eq!(mind.energy(), 1.0);

        assert!(matches!(
            mind.handle_message(&Message::new("set_root", json!({ "root": -3 })), &ctx),
            Err(AgentError::InvalidPayload { .. })
        ));
        assert!(matches!(
            mind.handle_message(&Message::new("set_progression", json!({ "name": "x" })), &ctx),
            Err(AgentError::InvalidPayload { .. })
        ));
        assert!(matches!(
            mind.handle_message(&Message::new("modulate", json!({})), &ctx),
            Err(AgentError::UnsupportedMessage { .. })
        ));
    }

    #[test]
    fn stop_releases_voices() {
        let (mut mind, ctx, stage) = setup();
        mind.on_start(&ctx);
        stage.clear();
        mind.on_stop(&ctx);
        let calls = stage.calls();
        assert!(calls.iter().any(|c| matches!(c, StageCall::StopChord(_))));
        assert!(calls.iter().any(|c| matches!(c, StageCall::StopTone(_))));
    }
}

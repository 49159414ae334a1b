//! Engine binary for Chorus.
//!
//! Wires configuration, logging, the bus, the world, the minds, the
//! metronome and the simulated sensor together, then runs the loop until a
//! boundary or Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `chorus-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build the bus, seed the world, attach the log stage
//! 4. Register and start the harmonic mind and the gesture recorder
//! 5. Create the metronome and the runtime control
//! 6. Run the loop with the simulated sensor as turn hook
//! 7. Stop every mind and log the result

mod error;
mod sensor;
mod stage;

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use chorus_agents::{GestureRecorder, HarmonicMind};
use chorus_bus::{BusOptions, EventBus, SystemClock};
use chorus_core::config::{LoggingConfig, WorldConfig};
use chorus_core::{
    AgentRuntime, ChorusConfig, Context, LogFormat, Metronome, NoOpHook, RuntimeControl, TurnHook,
    recording_store, run,
};
use chorus_types::{Era, Zone};
use chorus_world::WorldState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::sensor::SimulatedSensor;
use crate::stage::LogStage;

/// Default configuration file, relative to the working directory.
const CONFIG_PATH: &str = "chorus-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the run loop fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(from_file, path = CONFIG_PATH, "chorus-engine starting");

    // 3. Bus, world and stage.
    let bus = EventBus::with_options(
        BusOptions {
            history_limit: config.bus.history_limit,
            max_emit_depth: config.bus.max_emit_depth,
        },
        Rc::new(SystemClock::new()),
    );
    let world = seed_world(&config.world);
    let ctx = Context::with_stage(bus, world, Rc::new(LogStage::new()));
    info!(
        era = %ctx.world.era(),
        zone = %ctx.world.zone(),
        history_limit = config.bus.history_limit,
        "Context assembled"
    );

    // 4. Minds.
    let mut runtime = AgentRuntime::new(ctx);
    runtime.register(HarmonicMind::new("harmonic", config.harmonic.clone()))?;
    if config.recorder.enabled {
        let store = recording_store(&config.recorder.path);
        runtime.register(GestureRecorder::new("recorder", &config.recorder, store))?;
    }
    let started = runtime.start_all();
    info!(agents = ?runtime.ids(), started, "Minds started");

    // 5. Metronome and control.
    let mut metronome = Metronome::new(&config.clock)?;
    let control = Arc::new(RuntimeControl::new(&config.runtime));
    info!(
        bpm = metronome.bpm(),
        step_interval_ms = metronome.step_interval_ms(),
        max_ticks = control.max_ticks(),
        max_real_time_seconds = control.max_real_time_seconds(),
        "Clock ready"
    );

    let signal_control = Arc::clone(&control);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                signal_control.request_stop();
            }
            Err(e) => warn!(error = %e, "could not listen for Ctrl-C"),
        }
    });

    // 6. Run.
    let mut sensor = SimulatedSensor::new(&config.sensor);
    let mut idle = NoOpHook;
    let hook: &mut dyn TurnHook = if config.sensor.enabled {
        &mut sensor
    } else {
        &mut idle
    };
    let result = run(&mut runtime, &mut metronome, &control, hook)
        .await
        .map_err(EngineError::from)?;

    // 7. Shut down.
    let stopped = runtime.stop_all();
    let stats = runtime.context().bus.stats();
    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        total_cycles = result.total_cycles,
        total_steps = result.total_steps,
        gestures = sensor.gestures(),
        events_emitted = stats.emitted,
        listener_faults = stats.faults,
        stopped,
        "chorus-engine shutdown complete"
    );

    Ok(())
}

/// Load `chorus-config.yaml`, falling back to defaults when it is absent.
///
/// Returns the configuration and whether it came from the file.
fn load_config() -> Result<(ChorusConfig, bool), EngineError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        Ok((ChorusConfig::from_file(path)?, true))
    } else {
        let mut config = ChorusConfig::default();
        config.logging.apply_env_overrides();
        Ok((config, false))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Build the world from its configured starting values.
fn seed_world(config: &WorldConfig) -> WorldState {
    let world = WorldState::new();
    world.set_era(Era::resolve(&config.era));
    world.set_zone(Zone::resolve(&config.zone));
    world.set_dynamics(config.dynamics);
    world.set_energy(config.energy);
    world.set_tension(config.tension);
    world
}

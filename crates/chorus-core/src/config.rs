//! Configuration loading and typed config structures for Chorus.
//!
//! The canonical configuration lives in `chorus-config.yaml` at the project
//! root. Every section and field has a default, so an empty file (or no
//! file at all) yields a runnable setup.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Environment variable overriding `logging.level`.
pub const LOG_LEVEL_ENV: &str = "CHORUS_LOG_LEVEL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `chorus-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChorusConfig {
    /// Initial world document values.
    #[serde(default)]
    pub world: WorldConfig,

    /// Metronome tempo and meter.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Message bus limits.
    #[serde(default)]
    pub bus: BusConfig,

    /// Runtime loop pacing and bounds.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Harmonic mind tuning.
    #[serde(default)]
    pub harmonic: HarmonicConfig,

    /// Gesture recorder settings.
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Simulated gesture input.
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ChorusConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `CHORUS_LOG_LEVEL` overrides `logging.level` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.logging.apply_env_overrides();
        Ok(config)
    }
}

/// Initial world document values.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorldConfig {
    /// Starting era name.
    #[serde(default = "default_era")]
    pub era: String,

    /// Starting zone name.
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Starting dynamics, `[0, 1]`.
    #[serde(default = "default_half")]
    pub dynamics: f64,

    /// Starting energy, `[0, 1]`.
    #[serde(default = "default_half")]
    pub energy: f64,

    /// Starting tension, `[0, 1]`.
    #[serde(default)]
    pub tension: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            era: default_era(),
            zone: default_zone(),
            dynamics: default_half(),
            energy: default_half(),
            tension: 0.0,
        }
    }
}

/// Metronome configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClockConfig {
    /// Beats per minute.
    #[serde(default = "default_bpm")]
    pub bpm: u32,

    /// Steps (sub-beat pulses) per beat.
    #[serde(default = "default_steps_per_beat")]
    pub steps_per_beat: u32,

    /// Beats per bar.
    #[serde(default = "default_beats_per_bar")]
    pub beats_per_bar: u32,

    /// Upper bound on steps emitted in one pump after a stall.
    #[serde(default = "default_max_catch_up_steps")]
    pub max_catch_up_steps: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            bpm: default_bpm(),
            steps_per_beat: default_steps_per_beat(),
            beats_per_bar: default_beats_per_bar(),
            max_catch_up_steps: default_max_catch_up_steps(),
        }
    }
}

/// Message bus limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BusConfig {
    /// Events retained in history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Maximum nesting of re-entrant emits.
    #[serde(default = "default_max_emit_depth")]
    pub max_emit_depth: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            max_emit_depth: default_max_emit_depth(),
        }
    }
}

/// Runtime loop pacing and bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Real-time milliseconds between scheduler turns.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum scheduler turns before the loop ends (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Maximum wall-clock seconds before the loop ends (0 = unlimited).
    #[serde(default)]
    pub max_real_time_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
            max_real_time_seconds: 0,
        }
    }
}

/// Harmonic mind tuning.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HarmonicConfig {
    /// Decision cycles per second.
    #[serde(default = "default_harmonic_rate_hz")]
    pub update_rate_hz: f64,

    /// Minimum root difference in Hz before a root change is proposed.
    #[serde(default = "default_root_threshold_hz")]
    pub root_threshold_hz: f64,

    /// Rotate the voicing every this many bars (0 disables).
    #[serde(default = "default_voicing_rotation_bars")]
    pub voicing_rotation_bars: u64,

    /// Switch progression every this many bars (0 disables).
    #[serde(default = "default_progression_switch_bars")]
    pub progression_switch_bars: u64,

    /// Energy lost per cycle.
    #[serde(default = "default_energy_decay")]
    pub energy_decay: f64,

    /// Energy gained per unit of gesture velocity.
    #[serde(default = "default_gesture_energy_gain")]
    pub gesture_energy_gain: f64,

    /// Minimum change in filter cutoff or mix level worth acting on.
    #[serde(default = "default_deadband")]
    pub deadband: f64,

    /// Lowest filter cutoff in Hz (tension 0).
    #[serde(default = "default_filter_min_hz")]
    pub filter_min_hz: f64,

    /// Highest filter cutoff in Hz (tension 1).
    #[serde(default = "default_filter_max_hz")]
    pub filter_max_hz: f64,
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        Self {
            update_rate_hz: default_harmonic_rate_hz(),
            root_threshold_hz: default_root_threshold_hz(),
            voicing_rotation_bars: default_voicing_rotation_bars(),
            progression_switch_bars: default_progression_switch_bars(),
            energy_decay: default_energy_decay(),
            gesture_energy_gain: default_gesture_energy_gain(),
            deadband: default_deadband(),
            filter_min_hz: default_filter_min_hz(),
            filter_max_hz: default_filter_max_hz(),
        }
    }
}

/// Gesture recorder settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecorderConfig {
    /// Whether the recorder is registered at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// File the JSON persistence backend writes to. Empty keeps recordings
    /// in memory only.
    #[serde(default = "default_recordings_path")]
    pub path: String,

    /// Recordings with fewer points are discarded.
    #[serde(default = "default_min_points")]
    pub min_points: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_recordings_path(),
            min_points: default_min_points(),
        }
    }
}

/// Simulated gesture source used when no real sensor is attached.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SensorConfig {
    /// Whether the simulated source runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seed for reproducible gesture streams.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Milliseconds between simulated samples.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Samples per simulated gesture.
    #[serde(default = "default_points_per_gesture")]
    pub points_per_gesture: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: default_seed(),
            sample_interval_ms: default_sample_interval_ms(),
            points_per_gesture: default_points_per_gesture(),
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter
    /// directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Apply `CHORUS_LOG_LEVEL` if set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(LOG_LEVEL_ENV) {
            if !val.trim().is_empty() {
                self.level = val;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_era() -> String {
    "primordial".to_owned()
}

fn default_zone() -> String {
    "center".to_owned()
}

const fn default_half() -> f64 {
    0.5
}

const fn default_bpm() -> u32 {
    120
}

const fn default_steps_per_beat() -> u32 {
    4
}

const fn default_beats_per_bar() -> u32 {
    4
}

const fn default_max_catch_up_steps() -> u32 {
    16
}

const fn default_history_limit() -> usize {
    1000
}

const fn default_max_emit_depth() -> usize {
    64
}

const fn default_tick_interval_ms() -> u64 {
    10
}

const fn default_harmonic_rate_hz() -> f64 {
    4.0
}

const fn default_root_threshold_hz() -> f64 {
    1.0
}

const fn default_voicing_rotation_bars() -> u64 {
    4
}

const fn default_progression_switch_bars() -> u64 {
    16
}

const fn default_energy_decay() -> f64 {
    0.02
}

const fn default_gesture_energy_gain() -> f64 {
    0.25
}

const fn default_deadband() -> f64 {
    0.05
}

const fn default_filter_min_hz() -> f64 {
    400.0
}

const fn default_filter_max_hz() -> f64 {
    8000.0
}

fn default_recordings_path() -> String {
    "recordings.json".to_owned()
}

const fn default_min_points() -> usize {
    2
}

const fn default_seed() -> u64 {
    42
}

const fn default_sample_interval_ms() -> u64 {
    120
}

const fn default_points_per_gesture() -> u32 {
    12
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

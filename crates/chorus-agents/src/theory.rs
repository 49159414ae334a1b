//! Harmonic lookup tables: chord qualities, voicings, progressions, the era
//! repertoire and the zone root table.
//!
//! Everything here is pure data plus the [`ProgressionCursor`] that walks a
//! progression one beat at a time. Unknown eras and zones never fail; they
//! resolve to the defaults documented on [`repertoire`] and [`zone_root_hz`].

use chorus_types::{Era, Zone};
use serde::{Deserialize, Serialize};

/// Root used when no zone has been seen yet (C3).
pub const DEFAULT_ROOT_HZ: f64 = 130.81;

/// Major-scale offsets (semitones) for degrees 1..=7.
const SCALE_OFFSETS: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Transpose a frequency by a number of equal-tempered semitones.
pub fn transpose(frequency_hz: f64, semitones: i32) -> f64 {
    frequency_hz * 2f64.powf(f64::from(semitones) / 12.0)
}

/// Root frequency for a spatial zone.
pub const fn zone_root_hz(zone: Zone) -> f64 {
    match zone {
        Zone::Center => DEFAULT_ROOT_HZ,
        Zone::North => 146.83,
        Zone::East => 196.00,
        Zone::South => 110.00,
        Zone::West => 174.61,
    }
}

/// Root frequency for a zone name; unknown names use [`DEFAULT_ROOT_HZ`].
pub fn zone_name_root_hz(name: &str) -> f64 {
    Zone::from_name(name).map_or(DEFAULT_ROOT_HZ, zone_root_hz)
}

// ---------------------------------------------------------------------------
// Chords and voicings
// ---------------------------------------------------------------------------

/// Chord quality, as a stack of intervals above the chord root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    /// Major triad.
    Major,
    /// Minor triad.
    Minor,
    /// Diminished triad.
    Diminished,
    /// Suspended fourth.
    Sus4,
    /// Open fifth, no third.
    Power,
    /// Major seventh.
    Major7,
    /// Minor seventh.
    Minor7,
    /// Dominant seventh.
    Dominant7,
}

impl ChordQuality {
    /// Semitone intervals above the chord root, root included.
    pub const fn intervals(self) -> &'static [i32] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Diminished => &[0, 3, 6],
            Self::Sus4 => &[0, 5, 7],
            Self::Power => &[0, 7, 12],
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
            Self::Dominant7 => &[0, 4, 7, 10],
        }
    }

    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Diminished => "diminished",
            Self::Sus4 => "sus4",
            Self::Power => "power",
            Self::Major7 => "major7",
            Self::Minor7 => "minor7",
            Self::Dominant7 => "dominant7",
        }
    }
}

/// How the chord tones are spread across octaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voicing {
    /// All tones within one octave.
    #[default]
    Close,
    /// Second tone raised an octave.
    Open,
    /// Root dropped an octave, upper tones raised.
    Spread,
}

impl Voicing {
    /// The voicing that follows this one in the rotation.
    pub const fn next(self) -> Self {
        match self {
            Self::Close => Self::Open,
            Self::Open => Self::Spread,
            Self::Spread => Self::Close,
        }
    }

    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Open => "open",
            Self::Spread => "spread",
        }
    }

    /// Frequencies for `quality` built on `chord_root_hz` in this voicing.
    pub fn frequencies(self, chord_root_hz: f64, quality: ChordQuality) -> Vec<f64> {
        quality
            .intervals()
            .iter()
            .enumerate()
            .map(|(position, &interval)| {
                let shift = match (self, position) {
                    (Self::Close, _) | (Self::Open, 0 | 2..) => 0,
                    (Self::Open, 1) | (Self::Spread, 1..) => 12,
                    (Self::Spread, 0) => -12,
                };
                transpose(chord_root_hz, interval.saturating_add(shift))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Progressions
// ---------------------------------------------------------------------------

/// One chord of a progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionStep {
    /// Scale degree of the chord root, 1..=7 (out-of-range wraps).
    pub degree: u8,
    /// Chord quality.
    pub quality: ChordQuality,
    /// How many beats the chord lasts. Zero is treated as one.
    pub duration_beats: u32,
}

impl ProgressionStep {
    /// Build a step.
    pub const fn new(degree: u8, quality: ChordQuality, duration_beats: u32) -> Self {
        Self {
            degree,
            quality,
            duration_beats,
        }
    }

    /// Root of this chord relative to the key root.
    pub fn chord_root_hz(&self, key_root_hz: f64) -> f64 {
        let index = usize::from(self.degree.saturating_sub(1))
            .checked_rem(SCALE_OFFSETS.len())
            .unwrap_or(0);
        let offset = SCALE_OFFSETS.get(index).copied().unwrap_or(0);
        transpose(key_root_hz, offset)
    }
}

/// A named, ordered, cyclic sequence of chords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    /// Name used by `set_progression`.
    pub name: String,
    /// Steps in playing order; never empty.
    pub steps: Vec<ProgressionStep>,
}

impl Progression {
    /// Build a progression. An empty step list gets a single sustained
    /// tonic so a cursor always has something to point at.
    pub fn new(name: impl Into<String>, steps: Vec<ProgressionStep>) -> Self {
        let steps = if steps.is_empty() {
            vec![ProgressionStep::new(1, ChordQuality::Power, 8)]
        } else {
            steps
        };
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the progression has no steps. Always `false` once built
    /// through [`Progression::new`].
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step at `index`, wrapping.
    pub fn step(&self, index: usize) -> Option<&ProgressionStep> {
        index
            .checked_rem(self.steps.len())
            .and_then(|i| self.steps.get(i))
    }
}

/// Position within a progression: the step index and beats spent on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressionCursor {
    index: usize,
    beat_in_chord: u32,
}

impl ProgressionCursor {
    /// A cursor at the first beat of the first step.
    pub const fn new() -> Self {
        Self {
            index: 0,
            beat_in_chord: 0,
        }
    }

    /// Current step index.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Beats counted on the current step.
    pub const fn beat_in_chord(&self) -> u32 {
        self.beat_in_chord
    }

    /// Count one beat. When the count reaches the current step's duration
    /// the cursor moves to the next step (wrapping) and the new index is
    /// returned.
    pub fn advance_beat(&mut self, progression: &Progression) -> Option<usize> {
        let duration = progression
            .step(self.index)
            .map_or(1, |step| step.duration_beats.max(1));
        self.beat_in_chord = self.beat_in_chord.saturating_add(1);
        if self.beat_in_chord < duration {
            return None;
        }
        self.beat_in_chord = 0;
        self.index = self
            .index
            .saturating_add(1)
            .checked_rem(progression.len())
            .unwrap_or(0);
        Some(self.index)
    }

    /// Back to the first beat of the first step.
    pub const fn reset(&mut self) {
        self.index = 0;
        self.beat_in_chord = 0;
    }
}

// ---------------------------------------------------------------------------
// Repertoire
// ---------------------------------------------------------------------------

fn build(name: &str, steps: &[(u8, ChordQuality, u32)]) -> Progression {
    Progression::new(
        name,
        steps
            .iter()
            .map(|&(degree, quality, beats)| ProgressionStep::new(degree, quality, beats))
            .collect(),
    )
}

/// Progressions available in an era, in switching order. Never empty.
pub fn repertoire(era: Era) -> Vec<Progression> {
    use ChordQuality::{Diminished, Dominant7, Major, Major7, Minor, Minor7, Power, Sus4};

    match era {
        Era::Primordial => vec![
            build("drone", &[(1, Power, 16)]),
            build("breath", &[(1, Power, 8), (5, Sus4, 8)]),
        ],
        Era::Tribal => vec![
            build("circle", &[(1, Minor, 8), (7, Major, 8), (6, Major, 8), (7, Major, 8)]),
            build("stomp", &[(1, Sus4, 4), (4, Sus4, 4)]),
        ],
        Era::Classical => vec![
            build("cadence", &[(1, Major, 8), (4, Major, 8), (5, Major, 8), (1, Major, 8)]),
            build("pachelbel", &[
                (1, Major, 4),
                (5, Major, 4),
                (6, Minor, 4),
                (3, Minor, 4),
                (4, Major, 4),
                (1, Major, 4),
                (4, Major, 4),
                (5, Major, 4),
            ]),
        ],
        Era::Romantic => vec![
            build("longing", &[(1, Major, 8), (6, Minor, 8), (2, Diminished, 4), (5, Dominant7, 4)]),
            build("descent", &[(1, Minor, 8), (7, Major, 8), (6, Major, 8), (5, Major, 8)]),
        ],
        Era::Modern => vec![
            build("two-five-one", &[(2, Minor7, 8), (5, Dominant7, 8), (1, Major7, 16)]),
            build("turnaround", &[(1, Major7, 4), (6, Minor7, 4), (2, Minor7, 4), (5, Dominant7, 4)]),
        ],
        Era::Digital => vec![
            build("loop", &[(1, Minor7, 8), (6, Major7, 8)]),
            build("pulse", &[(1, Power, 4), (4, Power, 4), (6, Power, 4), (5, Power, 4)]),
        ],
    }
}

/// Repertoire for an era name; unknown names use [`Era::DEFAULT`].
pub fn repertoire_for(name: &str) -> Vec<Progression> {
    repertoire(Era::resolve(name))
}

/// Find a progression by name across every era.
pub fn find_progression(name: &str) -> Option<(Era, Progression)> {
    Era::ALL.into_iter().find_map(|era| {
        repertoire(era)
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| (era, p))
    })
}

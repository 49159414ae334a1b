//! Enumeration types shared across the workspace.
//!
//! Eras and zones arrive from collaborators as free-form names. Lookups
//! never fail: an unknown name resolves to the documented default variant
//! ([`Era::DEFAULT`], [`Zone::DEFAULT`]).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Eras
// ---------------------------------------------------------------------------

/// A coarse musical epoch that selects a progression repertoire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Era {
    /// Drones and open fifths.
    Primordial,
    /// Modal, pentatonic-flavoured movement.
    Tribal,
    /// Functional cadences.
    Classical,
    /// Chromatic colour and extended chords.
    Romantic,
    /// Jazz-inflected sevenths.
    Modern,
    /// Static, loop-based harmony.
    Digital,
}

impl Era {
    /// Fallback era for unknown names.
    pub const DEFAULT: Self = Self::Primordial;

    /// All eras in chronological order.
    pub const ALL: [Self; 6] = [
        Self::Primordial,
        Self::Tribal,
        Self::Classical,
        Self::Romantic,
        Self::Modern,
        Self::Digital,
    ];

    /// Parse an era name (case-insensitive). Returns `None` if unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "primordial" => Some(Self::Primordial),
            "tribal" => Some(Self::Tribal),
            "classical" => Some(Self::Classical),
            "romantic" => Some(Self::Romantic),
            "modern" => Some(Self::Modern),
            "digital" => Some(Self::Digital),
            _ => None,
        }
    }

    /// Parse an era name, falling back to [`Era::DEFAULT`].
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Self::DEFAULT)
    }

    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primordial => "primordial",
            Self::Tribal => "tribal",
            Self::Classical => "classical",
            Self::Romantic => "romantic",
            Self::Modern => "modern",
            Self::Digital => "digital",
        }
    }
}

impl core::fmt::Display for Era {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

/// Radius (in normalized units) of the central zone.
const CENTER_RADIUS: f64 = 0.2;

/// A named spatial region of the interaction surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// The middle of the surface.
    Center,
    /// Upper band.
    North,
    /// Right band.
    East,
    /// Lower band.
    South,
    /// Left band.
    West,
}

impl Zone {
    /// Fallback zone for unknown names.
    pub const DEFAULT: Self = Self::Center;

    /// Parse a zone name (case-insensitive). Returns `None` if unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "center" | "centre" => Some(Self::Center),
            "north" => Some(Self::North),
            "east" => Some(Self::East),
            "south" => Some(Self::South),
            "west" => Some(Self::West),
            _ => None,
        }
    }

    /// Parse a zone name, falling back to [`Zone::DEFAULT`].
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Self::DEFAULT)
    }

    /// Classify a normalized surface position (`x, y` in `[0, 1]`, `y`
    /// growing downwards) into a zone.
    pub fn from_position(x: f64, y: f64) -> Self {
        let dx = x.clamp(0.0, 1.0) - 0.5;
        let dy = y.clamp(0.0, 1.0) - 0.5;
        if dx.hypot(dy) < CENTER_RADIUS {
            Self::Center
        } else if dx.abs() > dy.abs() {
            if dx > 0.0 { Self::East } else { Self::West }
        } else if dy < 0.0 {
            Self::North
        } else {
            Self::South
        }
    }

    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
        }
    }
}

impl core::fmt::Display for Zone {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Gestures
// ---------------------------------------------------------------------------

/// Classified gesture tag attached to `gesture.*` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    /// Short touch without movement.
    Tap,
    /// Sustained movement.
    Drag,
    /// Fast directional flick.
    Swipe,
    /// Roughly circular path.
    Circle,
    /// Long touch without movement.
    Hold,
    /// Anything the classifier could not name.
    Unknown,
}

impl GestureKind {
    /// Parse a gesture tag, falling back to [`GestureKind::Unknown`].
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "tap" => Self::Tap,
            "drag" => Self::Drag,
            "swipe" => Self::Swipe,
            "circle" => Self::Circle,
            "hold" => Self::Hold,
            _ => Self::Unknown,
        }
    }

    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tap => "tap",
            Self::Drag => "drag",
            Self::Swipe => "swipe",
            Self::Circle => "circle",
            Self::Hold => "hold",
            Self::Unknown => "unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// Agent lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Registered but not cycling.
    #[default]
    Stopped,
    /// Cycling at its update rate.
    Running,
}

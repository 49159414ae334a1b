//! Event type patterns.
//!
//! Event types are dotted strings (`zone.enter`). A subscription key that
//! contains `*` is compiled once into a segment matcher: the key is split on
//! `.` and compared segment by segment against the concrete event type,
//! where `*` matches exactly one non-empty segment. `zone.*` therefore
//! matches `zone.enter` but neither `zoneenter` nor `music.zone.enter`.

use std::fmt;

use crate::error::BusError;

/// Wildcard token inside a pattern segment.
pub const WILDCARD: &str = "*";

/// A single segment in a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    /// Matches exactly the given string.
    Exact(String),
    /// Matches any single non-empty segment.
    Wildcard,
}

impl PatternSegment {
    /// Returns `true` if this segment matches the given value.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(s) => s == value,
            Self::Wildcard => !value.is_empty(),
        }
    }
}

impl fmt::Display for PatternSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => f.write_str(s),
            Self::Wildcard => f.write_str(WILDCARD),
        }
    }
}

/// A compiled subscription key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// A concrete event type, matched by string equality.
    Exact(String),
    /// A wildcard pattern, matched segment by segment.
    Segments(Vec<PatternSegment>),
}

impl Pattern {
    /// Compile a subscription key.
    ///
    /// Keys without `*` compile to [`Pattern::Exact`]. A segment may be
    /// either `*` alone or free of `*`; partial globs such as `zo*` are
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidPattern`] for empty keys, empty segments,
    /// or segments that mix `*` with other characters.
    pub fn parse(key: &str) -> Result<Self, BusError> {
        if key.is_empty() {
            return Err(BusError::InvalidPattern {
                pattern: key.to_owned(),
                reason: "pattern is empty".to_owned(),
            });
        }
        if !key.contains(WILDCARD) {
            return Ok(Self::Exact(key.to_owned()));
        }

        key.split('.')
            .map(|segment| {
                if segment == WILDCARD {
                    Ok(PatternSegment::Wildcard)
                } else if segment.is_empty() {
                    Err(BusError::InvalidPattern {
                        pattern: key.to_owned(),
                        reason: "empty segment".to_owned(),
                    })
                } else if segment.contains(WILDCARD) {
                    Err(BusError::InvalidPattern {
                        pattern: key.to_owned(),
                        reason: format!("segment {segment:?} mixes '*' with text"),
                    })
                } else {
                    Ok(PatternSegment::Exact(segment.to_owned()))
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Segments)
    }

    /// Whether this pattern contains a wildcard.
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::Segments(_))
    }

    /// Returns `true` if the concrete `event_type` matches.
    ///
    /// Wildcard patterns never match strings that themselves contain `*`:
    /// patterns are only evaluated against concrete event types.
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == event_type,
            Self::Segments(segments) => {
                if event_type.contains(WILDCARD) {
                    return false;
                }
                let mut parts = event_type.split('.');
                for segment in segments {
                    match parts.next() {
                        Some(part) if segment.matches(part) => {}
                        _ => return false,
                    }
                }
                parts.next().is_none()
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => f.write_str(s),
            Self::Segments(segments) => {
                let mut first = true;
                for segment in segments {
                    if !first {
                        f.write_str(".")?;
                    }
                    first = false;
                    write!(f, "{segment}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn exact_key_compiles_to_exact() {
        let p = Pattern::parse("zone.enter").unwrap();
        assert!(!p.is_wildcard());
        assert!(p.matches("zone.enter"));
        assert!(!p.matches("zone.exit"));
    }

    #[test]
    fn zone_wildcard_matches_one_segment() {
        let p = Pattern::parse("zone.*").unwrap();
        assert!(p.is_wildcard());
        assert!(p.matches("zone.enter"));
        assert!(p.matches("zone.exit"));
        assert!(!p.matches("zoneenter"));
        assert!(!p.matches("music.zone.enter"));
        assert!(!p.matches("zone"));
        assert!(!p.matches("zone."));
        assert!(!p.matches("zone.enter.fast"));
    }

    #[test]
    fn leading_and_middle_wildcards() {
        let p = Pattern::parse("*.change").unwrap();
        assert!(p.matches("chord.change"));
        assert!(!p.matches("chord.change.late"));

        let p = Pattern::parse("gesture.*.x").unwrap();
        assert!(p.matches("gesture.move.x"));
        assert!(!p.matches("gesture.move.y"));
    }

    #[test]
    fn wildcard_never_matches_other_patterns() {
        let p = Pattern::parse("zone.*").unwrap();
        assert!(!p.matches("zone.*"));
    }

    #[test]
    fn dots_are_literal() {
        let p = Pattern::parse("a.*").unwrap();
        assert!(!p.matches("abc"));
        assert!(!p.matches("a-b"));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(Pattern::parse("").is_err());
        assert!(Pattern::parse("zo*").is_err());
        assert!(Pattern::parse("zone..*").is_err());
    }

    #[test]
    fn display_round_trips() {
        let p = Pattern::parse("gesture.*.x").unwrap();
        assert_eq!(p.to_string(), "gesture.*.x");
    }
}

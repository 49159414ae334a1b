//! Per-mind perception snapshots with change detection.
//!
//! Each cycle a mind builds a fresh [`Percept`] from the world and its own
//! bus-driven counters. The runtime keeps the previous one alongside so the
//! mind can ask [`Perceptions::has_changed`] ("did the era change since the
//! last cycle?") without tracking history itself.

use std::collections::BTreeMap;

use serde_json::Value;

/// One snapshot: field name to value.
pub type Percept = BTreeMap<String, Value>;

/// The current snapshot and the one before it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Perceptions {
    current: Percept,
    previous: Option<Percept>,
    primed: bool,
}

impl Perceptions {
    /// Empty perceptions; nothing has been perceived yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new snapshot, keeping the old one as `previous`.
    pub fn rotate(&mut self, next: Percept) {
        let old = std::mem::replace(&mut self.current, next);
        if self.primed {
            self.previous = Some(old);
        }
        self.primed = true;
    }

    /// The latest snapshot.
    pub const fn current(&self) -> &Percept {
        &self.current
    }

    /// The snapshot before the latest one, if there has been a cycle.
    pub const fn previous(&self) -> Option<&Percept> {
        self.previous.as_ref()
    }

    /// Whether `field` differs between the previous and current snapshot.
    ///
    /// On the first cycle there is no previous snapshot and nothing counts
    /// as changed.
    pub fn has_changed(&self, field: &str) -> bool {
        self.previous
            .as_ref()
            .is_some_and(|prev| prev.get(field) != self.current.get(field))
    }

    /// A current field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.current.get(field)
    }

    /// A current numeric field, or `default`.
    pub fn f64_or(&self, field: &str, default: f64) -> f64 {
        self.get(field).and_then(Value::as_f64).unwrap_or(default)
    }

    /// A current unsigned field, or `default`.
    pub fn u64_or(&self, field: &str, default: u64) -> u64 {
        self.get(field).and_then(Value::as_u64).unwrap_or(default)
    }

    /// A current string field.
    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}

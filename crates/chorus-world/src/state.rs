//! The shared world document.
//!
//! A [`WorldState`] is a cheap, clonable handle onto one JSON object. Paths
//! are dotted (`mix.reverb.wet`); reads walk nested objects and return
//! `None` as soon as a segment is missing. Writes create intermediate
//! objects on demand.
//!
//! Minds only read the world during perception. External collaborators
//! (input adapters, scene controllers, the engine) write it. There is no
//! transactional guarantee across handlers: a read-modify-write that must
//! be atomic goes through [`WorldState::update`] inside one synchronous
//! handler.

use std::cell::RefCell;
use std::rc::Rc;

use chorus_types::{Era, Zone};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::WorldError;

/// Key holding the current era name.
pub const ERA: &str = "era";
/// Key holding the current spatial zone name.
pub const ZONE: &str = "zone";
/// Key holding the performance dynamics level, `[0, 1]`.
pub const DYNAMICS: &str = "dynamics";
/// Key holding the global energy level, `[0, 1]`.
pub const ENERGY: &str = "energy";
/// Key holding the harmonic tension level, `[0, 1]`.
pub const TENSION: &str = "tension";

/// Dynamics reported when the field is absent or malformed.
pub const DEFAULT_DYNAMICS: f64 = 0.5;
/// Energy reported when the field is absent or malformed.
pub const DEFAULT_ENERGY: f64 = 0.5;
/// Tension reported when the field is absent or malformed.
pub const DEFAULT_TENSION: f64 = 0.0;

/// Shared, single-threaded handle onto the world document.
#[derive(Debug, Clone)]
pub struct WorldState {
    doc: Rc<RefCell<Map<String, Value>>>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldState {
    /// A world holding the documented defaults for every well-known key.
    pub fn new() -> Self {
        let mut doc = Map::new();
        doc.insert(ERA.to_owned(), json!(Era::DEFAULT.as_str()));
        doc.insert(ZONE.to_owned(), json!(Zone::DEFAULT.as_str()));
        doc.insert(DYNAMICS.to_owned(), json!(DEFAULT_DYNAMICS));
        doc.insert(ENERGY.to_owned(), json!(DEFAULT_ENERGY));
        doc.insert(TENSION.to_owned(), json!(DEFAULT_TENSION));
        Self {
            doc: Rc::new(RefCell::new(doc)),
        }
    }

    /// A world seeded from an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DocumentNotObject`] if `document` is not an
    /// object.
    pub fn from_document(document: Value) -> Result<Self, WorldError> {
        match document {
            Value::Object(map) => Ok(Self {
                doc: Rc::new(RefCell::new(map)),
            }),
            _ => Err(WorldError::DocumentNotObject),
        }
    }

    /// Read the value at a dotted path.
    pub fn get(&self, path: &str) -> Option<Value> {
        let segments = split(path).ok()?;
        let doc = self.doc.borrow();
        lookup(&doc, &segments).cloned()
    }

    /// Whether a value exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        split(path).is_ok_and(|segments| lookup(&self.doc.borrow(), &segments).is_some())
    }

    /// Write `value` at a dotted path, returning the previous value.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidPath`] for empty paths or segments;
    /// [`WorldError::NotAnObject`] if an intermediate segment holds a
    /// scalar or array.
    pub fn set(&self, path: &str, value: Value) -> Result<Option<Value>, WorldError> {
        let segments = split(path)?;
        let previous = place(&mut self.doc.borrow_mut(), path, &segments, value)?;
        debug!(path, "world field written");
        Ok(previous)
    }

    /// Remove the value at `path`, returning it.
    pub fn remove(&self, path: &str) -> Option<Value> {
        let segments = split(path).ok()?;
        let (last, parents) = segments.split_last()?;
        let mut doc = self.doc.borrow_mut();
        let mut cursor: &mut Map<String, Value> = &mut doc;
        for segment in parents {
            cursor = cursor.get_mut(*segment)?.as_object_mut()?;
        }
        cursor.remove(*last)
    }

    /// Read-modify-write a single field.
    ///
    /// `f` receives the current value (if any) and returns the replacement,
    /// which is stored and returned. `f` runs without the document borrowed
    /// and must not await; the read and the write happen in one synchronous
    /// step from the caller's point of view.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn update<F>(&self, path: &str, f: F) -> Result<Value, WorldError>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let current = self.get(path);
        let next = f(current.as_ref());
        self.set(path, next.clone())?;
        Ok(next)
    }

    /// A deep copy of the whole document.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.doc.borrow().clone())
    }

    // -----------------------------------------------------------------------
    // Typed accessors
    // -----------------------------------------------------------------------

    /// A numeric field, or `default` when absent or non-numeric.
    pub fn f64_or(&self, path: &str, default: f64) -> f64 {
        self.get(path)
            .and_then(|v| v.as_f64())
            .filter(|v| v.is_finite())
            .unwrap_or(default)
    }

    /// A numeric field clamped to `[0, 1]`, or `default`.
    pub fn unit_or(&self, path: &str, default: f64) -> f64 {
        self.f64_or(path, default).clamp(0.0, 1.0)
    }

    /// A string field, or `default` when absent or not a string.
    pub fn string_or(&self, path: &str, default: &str) -> String {
        self.get(path)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| default.to_owned())
    }

    /// Current era. Unknown or missing names resolve to [`Era::DEFAULT`].
    pub fn era(&self) -> Era {
        self.get(ERA)
            .and_then(|v| v.as_str().map(Era::resolve))
            .unwrap_or(Era::DEFAULT)
    }

    /// Current zone. Unknown or missing names resolve to [`Zone::DEFAULT`].
    pub fn zone(&self) -> Zone {
        self.get(ZONE)
            .and_then(|v| v.as_str().map(Zone::resolve))
            .unwrap_or(Zone::DEFAULT)
    }

    /// Performance dynamics in `[0, 1]`.
    pub fn dynamics(&self) -> f64 {
        self.unit_or(DYNAMICS, DEFAULT_DYNAMICS)
    }

    /// Global energy in `[0, 1]`.
    pub fn energy(&self) -> f64 {
        self.unit_or(ENERGY, DEFAULT_ENERGY)
    }

    /// Harmonic tension in `[0, 1]`.
    pub fn tension(&self) -> f64 {
        self.unit_or(TENSION, DEFAULT_TENSION)
    }

    /// Set the era by name.
    pub fn set_era(&self, era: Era) {
        self.set_top(ERA, json!(era.as_str()));
    }

    /// Set the zone by name.
    pub fn set_zone(&self, zone: Zone) {
        self.set_top(ZONE, json!(zone.as_str()));
    }

    /// Set dynamics, clamped to `[0, 1]`.
    pub fn set_dynamics(&self, value: f64) {
        self.set_top(DYNAMICS, json!(value.clamp(0.0, 1.0)));
    }

    /// Set tension, clamped to `[0, 1]`.
    pub fn set_tension(&self, value: f64) {
        self.set_top(TENSION, json!(value.clamp(0.0, 1.0)));
    }

    /// Set energy, clamped to `[0, 1]`.
    pub fn set_energy(&self, value: f64) {
        self.set_top(ENERGY, json!(value.clamp(0.0, 1.0)));
    }

    /// Top-level keys never fail to place.
    fn set_top(&self, key: &str, value: Value) {
        self.doc.borrow_mut().insert(key.to_owned(), value);
    }
}

fn split(path: &str) -> Result<Vec<&str>, WorldError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(WorldError::InvalidPath {
            path: path.to_owned(),
        });
    }
    Ok(segments)
}

fn lookup<'a>(root: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    rest.iter()
        .try_fold(root.get(*first)?, |value, segment| value.get(*segment))
}

fn place(
    root: &mut Map<String, Value>,
    path: &str,
    segments: &[&str],
    value: Value,
) -> Result<Option<Value>, WorldError> {
    let Some((last, parents)) = segments.split_last() else {
        return Err(WorldError::InvalidPath {
            path: path.to_owned(),
        });
    };
    let mut cursor = root;
    for segment in parents {
        let slot = cursor
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        cursor = match slot {
            Value::Object(map) => map,
            _ => {
                return Err(WorldError::NotAnObject {
                    path: path.to_owned(),
                    segment: (*segment).to_owned(),
                });
            }
        };
    }
    Ok(cursor.insert((*last).to_owned(), value))
}

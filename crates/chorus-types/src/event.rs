//! The event envelope delivered by the message bus.
//!
//! An [`Event`] is created once per `emit` call and handed to every
//! matching listener in turn. Its identity (id, type, payload, timestamp) is
//! fixed at construction; the only mutable parts are the two propagation
//! flags that listeners may raise to influence delivery.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::EventId;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A typed occurrence routed by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    id: EventId,
    /// Dotted event type (e.g. `zone.enter`).
    event_type: String,
    /// Payload mapping. Always a JSON object.
    data: Value,
    /// Creation time in milliseconds since the Unix epoch.
    timestamp: i64,
    /// Set by a listener or middleware to mark the default action as cancelled.
    prevented: bool,
    /// Set by a listener to stop delivery to lower-priority listeners.
    stopped: bool,
}

impl Event {
    /// Build a new event stamped with the current time.
    ///
    /// The payload is normalized to a JSON object: `null` becomes an empty
    /// object and any other non-object value is wrapped as `{"value": ..}`.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self::at(event_type, data, now_millis())
    }

    /// Build a new event with an explicit timestamp.
    pub fn at(event_type: impl Into<String>, data: Value, timestamp: i64) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            data: normalize(data),
            timestamp,
            prevented: false,
            stopped: false,
        }
    }

    /// Return the event identifier.
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Return the dotted event type.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Return the payload object.
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// Return the creation timestamp in milliseconds.
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Mark the event's default action as cancelled.
    pub const fn prevent_default(&mut self) {
        self.prevented = true;
    }

    /// Whether [`prevent_default`](Self::prevent_default) was called.
    pub const fn is_prevented(&self) -> bool {
        self.prevented
    }

    /// Stop delivery to the remaining (lower-priority) listeners.
    pub const fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    /// Whether [`stop_propagation`](Self::stop_propagation) was called.
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Look up a payload field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Look up a numeric payload field as `f64`.
    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }

    /// Look up an unsigned integer payload field.
    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }

    /// Look up a string payload field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

fn normalize(data: Value) -> Value {
    match data {
        Value::Object(_) => data,
        Value::Null => Value::Object(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert(String::from("value"), other);
            Value::Object(map)
        }
    }
}

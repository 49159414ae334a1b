//! Bounded record of emitted events.
//!
//! History exists for introspection and debugging only; delivery never
//! depends on it. When the ring grows past its limit the oldest half is
//! dropped in one step, so trimming cost is amortized across many emits.

use std::collections::VecDeque;

use chorus_types::Event;

use crate::pattern::Pattern;

/// Default number of events retained.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Append-only ring of recently emitted events.
#[derive(Debug, Clone)]
pub struct History {
    events: VecDeque<Event>,
    limit: usize,
}

impl History {
    /// Create an empty history retaining at most `limit` events (min 1).
    pub fn new(limit: usize) -> Self {
        Self {
            events: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Append an event, trimming to the newest half when over the limit.
    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
        if self.events.len() > self.limit {
            let keep = self.limit.checked_div(2).unwrap_or(0).max(1);
            let excess = self.events.len().saturating_sub(keep);
            self.events.drain(..excess);
        }
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Configured limit.
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Drop every retained event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Return up to `limit` of the most recent events matching `filter`,
    /// oldest first. `None` filters nothing / limits nothing.
    pub fn query(&self, filter: Option<&Pattern>, limit: Option<usize>) -> Vec<Event> {
        let matching: Vec<&Event> = self
            .events
            .iter()
            .filter(|event| filter.is_none_or(|p| p.matches(event.event_type())))
            .collect();
        let skip = limit.map_or(0, |n| matching.len().saturating_sub(n));
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// The most recent event of exactly `event_type`, if retained.
    pub fn last_of(&self, event_type: &str) -> Option<&Event> {
        self.events
            .iter()
            .rev()
            .find(|event| event.event_type() == event_type)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(event_type: &str, n: u64) -> Event {
        Event::at(event_type, json!({ "n": n }), 0)
    }

    #[test]
    fn overflow_trims_to_half() {
        let mut history = History::new(10);
        for n in 0..10 {
            history.push(event("beat", n));
        }
        assert_eq!(history.len(), 10);

        history.push(event("beat", 10));
        assert_eq!(history.len(), 5);
        let kept: Vec<u64> = history
            .query(None, None)
            .iter()
            .filter_map(|e| e.u64_field("n"))
            .collect();
        assert_eq!(kept, vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn query_filters_and_limits_newest() {
        let mut history = History::new(100);
        history.push(event("zone.enter", 1));
        history.push(event("beat", 2));
        history.push(event("zone.exit", 3));
        history.push(event("zone.enter", 4));

        let zone = Pattern::parse("zone.*").unwrap();
        let all_zone = history.query(Some(&zone), None);
        assert_eq!(all_zone.len(), 3);

        let last_two = history.query(Some(&zone), Some(2));
        let ns: Vec<u64> = last_two.iter().filter_map(|e| e.u64_field("n")).collect();
        assert_eq!(ns, vec![3, 4]);
    }

    #[test]
    fn last_of_finds_most_recent() {
        let mut history = History::default();
        history.push(event("beat", 1));
        history.push(event("beat", 2));
        assert_eq!(history.last_of("beat").and_then(|e| e.u64_field("n")), Some(2));
        assert!(history.last_of("step").is_none());
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn tiny_limit_still_keeps_latest() {
        let mut history = History::new(1);
        history.push(event("a", 1));
        history.push(event("a", 2));
        assert_eq!(history.len(), 1);
        assert_eq!(history.last_of("a").and_then(|e| e.u64_field("n")), Some(2));
    }
}

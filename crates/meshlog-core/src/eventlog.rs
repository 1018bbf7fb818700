//! Retention-bounded, time-ordered event log.
//!
//! Events are appended in detection order during a run. [`EventLog::cleanup`]
//! then restores the persisted invariant: ascending by timestamp (stable, so
//! events with equal timestamps keep their append order) and at most
//! `max_entries` long, evicting the oldest first. Eviction is the only way an
//! accepted event leaves the log.

use tracing::debug;

use crate::event::EventRecord;
use crate::presence::EventSink;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<EventRecord>,
}

impl EventLog {
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    #[must_use]
    pub const fn from_events(events: Vec<EventRecord>) -> Self {
        Self { events }
    }

    pub fn append(&mut self, event: EventRecord) {
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Stable-sort by timestamp and keep only the newest `max_entries`.
    ///
    /// Returns the number of evicted events. Idempotent.
    pub fn cleanup(&mut self, max_entries: usize) -> usize {
        self.events.sort_by_key(|event| event.timestamp);
        let evicted = self.events.len().saturating_sub(max_entries);
        if evicted > 0 {
            self.events.drain(..evicted);
            debug!(evicted, kept = self.events.len(), "event log trimmed");
        }
        evicted
    }

    /// The newest `count` events in log order (oldest of them first).
    ///
    /// Only meaningful after [`cleanup`](Self::cleanup).
    #[must_use]
    pub fn recent(&self, count: usize) -> &[EventRecord] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: EventRecord) {
        self.append(event);
    }
}

//! Event queue for engine-level incidents.
//!
//! The cluster engine records every non-fatal failure as an event; the
//! (out-of-scope) event processor drains the queue into the store for the
//! API to serve. The engine side is a cheaply clonable client whose
//! [`EventClient::add_with_error_log`] both logs and enqueues in one call,
//! so error paths stay single-line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

/// Maximum retained events; older entries are dropped first.
const DEFAULT_CAPACITY: usize = 512;

/// A single recorded incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Severity keyword, e.g. `error` or `warning`.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
    /// Member that recorded the event.
    pub member_id: String,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

struct Inner {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
    member_id: String,
}

/// Bounded in-memory event queue.
pub struct EventQueue {
    inner: Arc<Inner>,
}

impl EventQueue {
    pub fn new(member_id: impl Into<String>) -> Self {
        Self::with_capacity(member_id, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(member_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                events: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                member_id: member_id.into(),
            }),
        }
    }

    /// Create a client handle for producers.
    pub fn client(&self) -> EventClient {
        EventClient {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Drain all queued events, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        let mut events = self.inner.events.lock().expect("event queue poisoned");
        events.drain(..).collect()
    }

    /// Snapshot the queue without draining it.
    pub fn snapshot(&self) -> Vec<Event> {
        let events = self.inner.events.lock().expect("event queue poisoned");
        events.iter().cloned().collect()
    }
}

/// Producer handle onto an [`EventQueue`].
#[derive(Clone)]
pub struct EventClient {
    inner: Arc<Inner>,
}

impl EventClient {
    /// Record an event.
    pub fn add(&self, kind: &str, message: &str) {
        let event = Event {
            kind: kind.to_string(),
            message: message.to_string(),
            member_id: self.inner.member_id.clone(),
            timestamp: Utc::now(),
        };

        let mut events = self.inner.events.lock().expect("event queue poisoned");
        if events.len() >= self.inner.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Record an event and emit it on the error log in one call.
    pub fn add_with_error_log(&self, kind: &str, message: &str) {
        match kind {
            "warning" => warn!("{}", message),
            _ => error!("{}", message),
        }
        self.add(kind, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_drain() {
        let queue = EventQueue::new("member-1");
        let client = queue.client();

        client.add("error", "first");
        client.add("warning", "second");

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[0].member_id, "member-1");
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let queue = EventQueue::with_capacity("member-1", 2);
        let client = queue.client();

        client.add("error", "a");
        client.add("error", "b");
        client.add("error", "c");

        let events = queue.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "b");
        assert_eq!(events[1].message, "c");
    }
}

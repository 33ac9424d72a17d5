use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Typed progress events fanned out to UI subscribers. No persistence; late
/// subscribers do not receive backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "session.started")]
    SessionStarted,
    #[serde(rename = "session.completed")]
    SessionCompleted,
    #[serde(rename = "sync.started")]
    SyncStarted,
    #[serde(rename = "sync.completed")]
    SyncCompleted,
    #[serde(rename = "sync.failed")]
    SyncFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub project: String,
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl ControlPlaneEvent {
    pub fn new(kind: EventKind, project: &str, workflow_id: &str) -> Self {
        Self {
            kind,
            project: project.to_string(),
            workflow_id: workflow_id.to_string(),
            session_name: None,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn with_session(mut self, session_name: &str) -> Self {
        self.session_name = Some(session_name.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// A broadcast-style event bus built on top of flume channels.
///
/// Each call to [`subscribe`](EventBus::subscribe) creates a new receiver
/// that will receive all events published after the subscription was
/// created. The bus is thread-safe and can be cloned cheaply.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<flume::Sender<ControlPlaneEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> flume::Receiver<ControlPlaneEvent> {
        let (tx, rx) = flume::unbounded();
        let mut senders = self.inner.lock().expect("EventBus lock poisoned");
        senders.push(tx);
        rx
    }

    /// Publish an event to all current subscribers. Disconnected
    /// subscribers are pruned as a side effect.
    pub fn publish(&self, event: ControlPlaneEvent) {
        let mut senders = self.inner.lock().expect("EventBus lock poisoned");
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("EventBus lock poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_later_events_only() {
        let bus = EventBus::new();
        bus.publish(ControlPlaneEvent::new(EventKind::SyncStarted, "p", "42"));

        let rx = bus.subscribe();
        bus.publish(ControlPlaneEvent::new(EventKind::SyncCompleted, "p", "42"));

        let got: Vec<_> = rx.drain().collect();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, EventKind::SyncCompleted);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        bus.publish(ControlPlaneEvent::new(EventKind::SessionStarted, "p", "42"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn event_kind_wire_names() {
        let json = serde_json::to_string(&EventKind::SessionCompleted).unwrap();
        assert_eq!(json, "\"session.completed\"");
    }
}

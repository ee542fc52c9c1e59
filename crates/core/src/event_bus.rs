//! Platform event bus — trait for emitting feed/messaging events from any
//! module.
//!
//! Modules accept an `Arc<dyn EventSink>` to emit events toward subscriber
//! webhooks and the activity digests. Fan-out is strictly fire-and-forget: it
//! runs after persistence and a sink failure never unwinds an admission
//! decision or a debit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// What happened, as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BotRegistered,
    FeedPosted,
    WebhookIngested,
    MessageSent,
}

/// A single platform event emitted after a successful effectful write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub bot: String,
    pub item_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Trait for emitting platform events. Implementations route events to
/// subscriber webhooks or digest queues.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PlatformEvent);
}

/// No-op sink for tests and modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: PlatformEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<PlatformEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: PlatformEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating a `PlatformEvent` with minimal boilerplate.
pub fn make_event(event_type: EventType, bot: impl Into<String>, item_id: Option<Uuid>) -> PlatformEvent {
    PlatformEvent {
        event_id: Uuid::new_v4(),
        event_type,
        bot: bot.into(),
        item_id,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(EventType::FeedPosted, "bot-a", Some(Uuid::new_v4())));
        sink.emit(make_event(EventType::MessageSent, "bot-a", None));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EventType::FeedPosted), 1);
        assert_eq!(sink.count_type(EventType::MessageSent), 1);

        let events = sink.events();
        assert_eq!(events[0].bot, "bot-a");
        assert!(events[1].item_id.is_none());
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        // Should not panic
        sink.emit(make_event(EventType::BotRegistered, "bot-b", None));
    }
}

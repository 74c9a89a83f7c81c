//! Journey lifecycle events.
//!
//! The engine reports creation, step progress and state changes of every
//! journey to an `Arc<dyn EventSink>`. Sinks must not block: they are called
//! from the worker that is performing the step.

use crate::types::{JourneyEvent, JourneyEventType};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: JourneyEvent);
}

/// Drops every event.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: JourneyEvent) {}
}

/// Logs each event at debug level.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: JourneyEvent) {
        tracing::debug!(
            event_type = ?event.event_type,
            journey_id = %event.journey_id,
            journey_type = %event.journey_type,
            step = ?event.step_name,
            at = %event.timestamp,
            "Journey event"
        );
    }
}

/// Keeps events in memory so tests can assert on a journey's history.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<JourneyEvent>>,
}

impl CaptureSink {
    pub fn events(&self) -> Vec<JourneyEvent> {
        self.events.lock().clone()
    }

    /// Event types recorded for one journey, oldest first.
    pub fn history(&self, journey_id: Uuid) -> Vec<JourneyEventType> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.journey_id == journey_id)
            .map(|e| e.event_type)
            .collect()
    }

    pub fn count_type(&self, event_type: JourneyEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: JourneyEvent) {
        self.events.lock().push(event);
    }
}

/// Builds an event for `journey_id`, stamped with the engine's clock time.
pub fn journey_event(
    event_type: JourneyEventType,
    journey_id: Uuid,
    journey_type: impl Into<String>,
    step_name: Option<&str>,
    at: DateTime<Utc>,
) -> JourneyEvent {
    JourneyEvent {
        event_id: Uuid::new_v4(),
        event_type,
        journey_id,
        journey_type: journey_type.into(),
        step_name: step_name.map(str::to_string),
        timestamp: at,
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn log_sink() -> Arc<dyn EventSink> {
    Arc::new(LogSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::default())
}

// shared-types-rs/src/audit.rs
// Audit/event sink used by every stage to report security-relevant events

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

/// A named security event with free-form context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub context: Map<String, Value>,
}

impl SecurityEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            context: Map::new(),
        }
    }

    /// Attach a context value; silently skips values that fail to serialize.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.to_string(), value);
        }
        self
    }
}

/// Receives security events. `emit` must not block the request path.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: SecurityEvent);
}

/// Writes events to the `tracing` pipeline under the `audit` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: SecurityEvent) {
        let context = Value::Object(event.context);
        info!(
            target: "audit",
            event = %event.name,
            timestamp = %event.timestamp.to_rfc3339(),
            context = %context,
            "Security event"
        );
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: SecurityEvent) {}
}

/// Keeps every event in memory. Used by tests and embedded deployments that
/// drain events themselves.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_named(&self, name: &str) -> Vec<SecurityEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.name == name)
            .collect()
    }

    pub fn drain(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: SecurityEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_context_builder() {
        let event = SecurityEvent::new("rate_limit.exceeded")
            .with("limit", 10)
            .with("operation", "search");
        assert_eq!(event.context["limit"], 10);
        assert_eq!(event.context["operation"], "search");
    }

    #[test]
    fn test_memory_sink_collects_and_drains() {
        let sink = MemoryAuditSink::new();
        sink.emit(SecurityEvent::new("a"));
        sink.emit(SecurityEvent::new("b"));
        sink.emit(SecurityEvent::new("a"));

        assert_eq!(sink.events_named("a").len(), 2);
        assert_eq!(sink.drain().len(), 3);
        assert!(sink.events().is_empty());
    }
}

//! Audit trail of field-level crosswalk decisions
//!
//! Every decision made while unflattening, crosswalking, validating or
//! post-processing a record is emitted as a [`LogEvent`] through a
//! [`LogSink`] that the caller passes in explicitly. The sink is the audit
//! trail and the per-field status used by migration reports; operator-facing
//! diagnostics go through `tracing` instead.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stage names used in emitted events
pub mod stage {
    pub const UNFLATTEN: &str = "unflatten";
    pub const CROSSWALK: &str = "crosswalk";
    pub const HANDLER: &str = "handler";
    pub const VALIDATE: &str = "validate";
    pub const POSTWALK: &str = "postwalk";
    pub const MIGRATE: &str = "migrate";
}

/// One field-level decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Record id the event belongs to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    pub stage: String,
    pub source_field: String,
    pub dest_field: String,
    pub message: String,
    pub value: Value,
}

impl LogEvent {
    /// Create a new event
    pub fn new(
        stage: impl Into<String>,
        source_field: impl Into<String>,
        dest_field: impl Into<String>,
        message: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            oid: None,
            stage: stage.into(),
            source_field: source_field.into(),
            dest_field: dest_field.into(),
            message: message.into(),
            value,
        }
    }

    /// Tag the event with a record id
    pub fn with_oid(mut self, oid: impl Into<String>) -> Self {
        self.oid = Some(oid.into());
        self
    }
}

/// Receiver for audit events
///
/// Sinks are called synchronously, potentially thousands of times per
/// record, and must buffer rather than block.
pub trait LogSink {
    /// Record a single event
    fn record(&self, event: LogEvent);

    /// Emit an event from its five parts
    fn emit(&self, stage: &str, source_field: &str, dest_field: &str, message: &str, value: Value) {
        self.record(LogEvent::new(stage, source_field, dest_field, message, value));
    }
}

impl<F> LogSink for F
where
    F: Fn(LogEvent),
{
    fn record(&self, event: LogEvent) {
        self(event)
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn record(&self, _event: LogEvent) {}
}

/// Buffering sink that keeps events in emission order
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Mutex<Vec<LogEvent>>,
}

impl AuditLog {
    /// Create an empty audit log
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far
    pub fn events(&self) -> Vec<LogEvent> {
        self.lock().clone()
    }

    /// Take all events, leaving the log empty
    pub fn drain(&self) -> Vec<LogEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no events have been recorded
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Events whose message matches exactly
    pub fn with_message(&self, message: &str) -> Vec<LogEvent> {
        self.lock()
            .iter()
            .filter(|e| e.message == message)
            .cloned()
            .collect()
    }

    /// Event counts keyed by message
    pub fn count_by_message(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for event in self.lock().iter() {
            *counts.entry(event.message.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEvent>> {
        // A poisoned buffer still holds valid events
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LogSink for AuditLog {
    fn record(&self, event: LogEvent) {
        self.lock().push(event);
    }
}

/// Sink adapter that tags every event with a record id
pub struct RecordSink<'a> {
    oid: String,
    inner: &'a dyn LogSink,
}

impl<'a> RecordSink<'a> {
    /// Wrap a sink for one record
    pub fn new(oid: impl Into<String>, inner: &'a dyn LogSink) -> Self {
        Self {
            oid: oid.into(),
            inner,
        }
    }
}

impl LogSink for RecordSink<'_> {
    fn record(&self, event: LogEvent) {
        let event = if event.oid.is_none() {
            event.with_oid(self.oid.clone())
        } else {
            event
        };
        self.inner.record(event);
    }
}

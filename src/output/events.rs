//! Progress events and the sinks that receive them
//!
//! Every run transition is reported as an [`Event`]. Sinks decide where it
//! goes: the tracing subscriber, the `/events` stream, or a test buffer.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    PageStarted,
    PageCompleted,
    PageFailed,
    RetryScheduled,
    RecordDropped,
    /// A line the page function wrote through `context.log`
    PageLog,
    RunCompleted,
    RunAborted,
}

/// One progress event
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub level: EventLevel,
    pub message: String,
    pub fields: IndexMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            kind,
            level,
            message: message.into(),
            fields: IndexMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(kind: EventKind, message: impl Into<String>) -> Self {
        Self::new(kind, EventLevel::Info, message)
    }

    pub fn warn(kind: EventKind, message: impl Into<String>) -> Self {
        Self::new(kind, EventLevel::Warn, message)
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Receives progress events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        let fields = serde_json::to_string(&event.fields).unwrap_or_default();
        match event.level {
            EventLevel::Debug => {
                tracing::debug!(kind = ?event.kind, fields = %fields, "{}", event.message)
            }
            EventLevel::Info => {
                tracing::info!(kind = ?event.kind, fields = %fields, "{}", event.message)
            }
            EventLevel::Warn => {
                tracing::warn!(kind = ?event.kind, fields = %fields, "{}", event.message)
            }
            EventLevel::Error => {
                tracing::error!(kind = ?event.kind, fields = %fields, "{}", event.message)
            }
        }
    }
}

/// Publishes events on a broadcast channel
///
/// Slow subscribers lose the oldest events rather than slowing the crawl.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<Event>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &Event) {
        // No subscribers is not an error
        let _ = self.sender.send(event.clone());
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// Sends every event to several sinks
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &Event) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

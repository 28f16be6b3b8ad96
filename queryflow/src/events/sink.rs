//! Where workflow events go.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tracing::{debug, info, trace, warn, Level};

/// Receiver for workflow and step transitions.
///
/// Every payload the executor sends is a JSON object carrying `run_id`;
/// step events also carry `step`.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers an event, waiting for the sink if it needs to.
    async fn emit(&self, event_type: &str, data: Option<JsonValue>);

    /// Delivers an event from synchronous code. Must never fail or block
    /// for long; the executor calls it between steps.
    fn try_emit(&self, event_type: &str, data: Option<JsonValue>);
}

/// Drops every event. The executor's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<JsonValue>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<JsonValue>) {}
}

/// Writes events to `tracing`.
///
/// Failures and aborts are logged at `WARN`, workflow transitions at `INFO`
/// and step transitions at the configured step level (`DEBUG` by default).
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    step_level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self {
            step_level: Level::DEBUG,
        }
    }
}

impl LoggingEventSink {
    /// Creates a sink with the default levels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the level for step transitions.
    #[must_use]
    pub const fn with_step_level(mut self, level: Level) -> Self {
        self.step_level = level;
        self
    }

    fn log_event(&self, event_type: &str, data: Option<&JsonValue>) {
        let field = |name: &str| {
            data.and_then(|d| d.get(name))
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let run_id = field("run_id");
        let step = field("step");

        if event_type.ends_with(".failed") || event_type.ends_with(".aborted") {
            warn!(event_type, %run_id, %step, payload = ?data, "Workflow event");
        } else if event_type.starts_with("workflow.") {
            info!(event_type, %run_id, payload = ?data, "Workflow event");
        } else if self.step_level == Level::TRACE {
            trace!(event_type, %run_id, %step, "Workflow event");
        } else if self.step_level == Level::INFO {
            info!(event_type, %run_id, %step, "Workflow event");
        } else {
            debug!(event_type, %run_id, %step, "Workflow event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<JsonValue>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<JsonValue>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// One event captured by a [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Event name, such as `step.completed`.
    pub event_type: String,
    /// Payload as emitted.
    pub data: Option<JsonValue>,
}

impl RecordedEvent {
    /// Returns a string field of the payload.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.as_ref()?.get(name)?.as_str()
    }
}

/// Keeps every event in memory, in arrival order. Meant for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    recorded: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event_type: &str, data: Option<JsonValue>) {
        self.recorded.write().push(RecordedEvent {
            event_type: event_type.to_string(),
            data,
        });
    }

    /// Returns a copy of everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.recorded.read().clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded.read().len()
    }

    /// True before the first event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.read().is_empty()
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.recorded.write().clear();
    }

    /// Event names in arrival order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.recorded
            .read()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Payload of the first event named `event_type`.
    #[must_use]
    pub fn first_payload(&self, event_type: &str) -> Option<JsonValue> {
        self.recorded
            .read()
            .iter()
            .find(|e| e.event_type == event_type)
            .and_then(|e| e.data.clone())
    }

    /// Events whose name starts with `prefix` (`"step."` selects every step
    /// event).
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<RecordedEvent> {
        self.recorded
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Step ids of the events named `event_type`, in order.
    #[must_use]
    pub fn steps_for(&self, event_type: &str) -> Vec<String> {
        self.recorded
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter_map(|e| e.field("step").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<JsonValue>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<JsonValue>) {
        self.record(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{STEP_COMPLETED, STEP_FAILED, STEP_STARTED, WORKFLOW_COMPLETED, WORKFLOW_STARTED};
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_events() {
        NoOpEventSink.emit(WORKFLOW_STARTED, None).await;
        NoOpEventSink.try_emit(STEP_STARTED, Some(json!({"step": "seed"})));

        let sink = LoggingEventSink::new().with_step_level(Level::TRACE);
        sink.emit(WORKFLOW_COMPLETED, Some(json!({"run_id": "r"}))).await;
        sink.try_emit(STEP_FAILED, None);
        sink.try_emit(STEP_STARTED, Some(json!({"run_id": "r", "step": 3})));
    }

    #[tokio::test]
    async fn test_collecting_sink_keeps_order() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(WORKFLOW_STARTED, None).await;
        sink.try_emit(STEP_STARTED, Some(json!({"step": "seed"})));
        sink.try_emit(STEP_COMPLETED, Some(json!({"step": "seed"})));
        sink.try_emit(STEP_STARTED, Some(json!({"step": "generate"})));

        assert_eq!(
            sink.event_types(),
            vec![WORKFLOW_STARTED, STEP_STARTED, STEP_COMPLETED, STEP_STARTED]
        );
        assert_eq!(sink.first_payload(STEP_STARTED).unwrap()["step"], "seed");
        assert_eq!(sink.steps_for(STEP_STARTED), vec!["seed", "generate"]);
        assert!(sink.first_payload("workflow.aborted").is_none());
    }

    #[tokio::test]
    async fn test_collecting_sink_filter_and_clear() {
        let sink = CollectingEventSink::new();
        sink.emit(STEP_STARTED, None).await;
        sink.emit(STEP_COMPLETED, None).await;
        sink.emit(WORKFLOW_COMPLETED, None).await;

        assert_eq!(sink.events_of_type("step.").len(), 2);
        let workflow_events = sink.events_of_type("workflow.");
        assert_eq!(workflow_events.len(), 1);
        assert_eq!(workflow_events[0].field("run_id"), None);

        sink.clear();
        assert_eq!(sink.len(), 0);
    }
}

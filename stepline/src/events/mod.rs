//! Lifecycle events emitted while a pipeline runs.
//!
//! The engine reports what it does to an [`EventSink`]. Event types:
//! `pipeline.started`, `step.started`, `step.completed`, `step.skipped`,
//! `group.entered`, `group.skipped`, `pipeline.rescued` and
//! `pipeline.completed`.

mod sink;

#[cfg(test)]
pub use sink::MockEventSink;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-wide event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-wide event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the process-wide event sink, or a [`NoOpEventSink`] if none is set.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    try_get_event_sink().unwrap_or_else(|| Arc::new(NoOpEventSink))
}

/// Gets the process-wide event sink, if one is set.
pub fn try_get_event_sink() -> Option<Arc<dyn EventSink>> {
    GLOBAL_EVENT_SINK.read().clone()
}

/// Builds an engine event payload: run id, pipeline name and timestamp, plus
/// the fields of `extra` when it is an object.
pub(crate) fn event_data(run_id: &str, pipeline: &str, extra: Value) -> Value {
    let mut data = Map::new();
    data.insert("run_id".to_string(), Value::String(run_id.to_string()));
    data.insert("pipeline".to_string(), Value::String(pipeline.to_string()));
    data.insert(
        "timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    if let Value::Object(extra) = extra {
        data.extend(extra);
    }
    Value::Object(data)
}

//! Test fixtures for pipeline testing.

use crate::config::{EngineConfig, InvokeOptions};
use crate::context::Attributes;
use crate::errors::SteplineError;
use crate::events::CollectingEventSink;
use crate::pipeline::{ExecutionEngine, PipelineDefinition};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Builds attributes from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is neither an object nor null.
#[must_use]
pub fn attributes(value: Value) -> Attributes {
    match Attributes::from_value(value) {
        Ok(attributes) => attributes,
        Err(err) => panic!("invalid test attributes: {err}"),
    }
}

/// An ordered record of calls, shared between a host and its test.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns every recorded call, in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Counts occurrences of `entry`.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Returns true if `entry` was recorded.
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.count(entry) > 0
    }

    /// Returns the number of recorded calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forgets every recorded call.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Runs a definition once with a collecting event sink.
pub struct TestRun {
    /// The value or error returned by the run.
    pub outcome: Result<Value, SteplineError>,
    /// Events emitted during the run.
    pub events: Arc<CollectingEventSink>,
}

impl TestRun {
    /// Runs `definition` against `host`.
    pub fn execute<H>(
        definition: &PipelineDefinition<H>,
        host: &mut H,
        attributes: &Attributes,
        options: &InvokeOptions,
    ) -> Self {
        let events = Arc::new(CollectingEventSink::new());
        let outcome = ExecutionEngine::with_config(definition, EngineConfig::default())
            .with_event_sink(events.clone())
            .run(host, attributes, options);

        Self { outcome, events }
    }

    /// Returns the emitted event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.event_types()
    }

    /// Returns the names of steps that completed, in order.
    #[must_use]
    pub fn completed_steps(&self) -> Vec<String> {
        self.events
            .events_of_type("step.completed")
            .into_iter()
            .filter_map(|(_, data)| data?.get("step")?.as_str().map(str::to_string))
            .collect()
    }
}

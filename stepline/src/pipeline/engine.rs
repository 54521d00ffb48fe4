//! Run-time interpretation of a pipeline definition.

use super::callable::Condition;
use super::definition::{
    CallbackEvent, CallbackFn, ConditionGroup, Dispatch, Entry, Phase, PipelineDefinition,
    RescueEntry, StepEntry,
};
use crate::config::{EngineConfig, InvokeOptions};
use crate::context::{Attributes, Bindings, Scope};
use crate::errors::{StepError, SteplineError};
use crate::events::{event_data, try_get_event_sink, EventSink};
use crate::observability::SpanTimer;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

const INLINE: &str = "<inline>";

/// Runs a pipeline definition against one host at a time.
///
/// The engine itself holds no per-invocation state: every call to
/// [`run`](Self::run) gets a fresh binding table and running result, so one
/// engine can serve any number of sequential or concurrent invocations.
pub struct ExecutionEngine<'d, H> {
    definition: &'d PipelineDefinition<H>,
    config: EngineConfig,
    sink: Option<Arc<dyn EventSink>>,
}

impl<'d, H> ExecutionEngine<'d, H> {
    /// Creates an engine with the default configuration and the process-wide
    /// event sink, if one is set.
    #[must_use]
    pub fn new(definition: &'d PipelineDefinition<H>) -> Self {
        Self::with_config(definition, EngineConfig::default())
    }

    /// Creates an engine with a configuration.
    #[must_use]
    pub fn with_config(definition: &'d PipelineDefinition<H>, config: EngineConfig) -> Self {
        Self {
            definition,
            config,
            sink: try_get_event_sink(),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns true if runs report events: emission is enabled and a sink is
    /// attached. Without a sink no event payload is built.
    #[must_use]
    pub fn emits_events(&self) -> bool {
        self.config.emit_events && self.sink.is_some()
    }

    /// Returns the definition being run.
    #[must_use]
    pub const fn definition(&self) -> &'d PipelineDefinition<H> {
        self.definition
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the pipeline once.
    ///
    /// Returns the value of the last step that ran, `Value::Null` if none did,
    /// or the value of the rescue handler that recovered from a failure.
    ///
    /// # Errors
    ///
    /// Returns structured errors unchanged, and any step error no rescue
    /// handler accepted.
    pub fn run(
        &self,
        host: &mut H,
        attributes: &Attributes,
        options: &InvokeOptions,
    ) -> Result<Value, SteplineError> {
        let prefix = options.prefix_or(&self.config.default_prefix);
        let run_id = Uuid::new_v4().to_string();

        let span = tracing::debug_span!(
            "pipeline",
            pipeline = %self.definition.name(),
            run_id = %run_id,
            prefix = %prefix
        );
        let _guard = span.enter();
        let timer = SpanTimer::start(self.definition.name());

        let mut invocation = Invocation {
            definition: self.definition,
            host,
            attributes,
            options,
            prefix,
            bindings: Bindings::new(),
            result: Value::Null,
            run_id,
            sink: self.sink.as_deref().filter(|_| self.config.emit_events),
        };

        invocation.emit("pipeline.started", || {
            json!({"prefix": prefix, "steps": self.definition.step_count()})
        });

        let value = invocation.run_root()?;

        let elapsed_ms = timer.finish();
        tracing::debug!(elapsed_ms, "Pipeline completed");
        invocation.emit("pipeline.completed", || json!({"duration_ms": elapsed_ms}));

        Ok(value)
    }
}

impl<H> fmt::Debug for ExecutionEngine<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("definition", &self.definition.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// State of one run.
struct Invocation<'r, H> {
    definition: &'r PipelineDefinition<H>,
    host: &'r mut H,
    attributes: &'r Attributes,
    options: &'r InvokeOptions,
    prefix: &'r str,
    bindings: Bindings,
    result: Value,
    run_id: String,
    sink: Option<&'r dyn EventSink>,
}

impl<'r, H> Invocation<'r, H> {
    fn run_root(&mut self) -> Result<Value, SteplineError> {
        let root = self.definition.root();

        match self.run_top_level() {
            Ok(()) => Ok(std::mem::take(&mut self.result)),
            Err(err) => self.rescue(err, root.rescues()),
        }
    }

    fn run_top_level(&mut self) -> Result<(), SteplineError> {
        let definition = self.definition;

        self.apply_bindings(definition.root().bindings());
        self.run_callbacks(definition.callbacks().for_all(Phase::Before), Phase::Before, None, None)?;
        self.run_entries(definition.root().entries())?;

        let result = self.result.clone();
        self.run_callbacks(
            definition.callbacks().for_all(Phase::After),
            Phase::After,
            None,
            Some(&result),
        )
    }

    /// Binds each key not bound yet: non-null override, else attribute, else null.
    fn apply_bindings(&mut self, keys: &[String]) {
        for key in keys {
            if self.bindings.contains_key(key) {
                continue;
            }

            let value = self
                .options
                .binding_override(key)
                .or_else(|| self.attributes.get(key))
                .cloned()
                .unwrap_or(Value::Null);
            self.bindings.set(key.as_str(), value);
        }
    }

    fn run_entries(&mut self, entries: &'r [Entry<H>]) -> Result<(), SteplineError> {
        for entry in entries {
            match entry {
                Entry::Step(step) => self.run_step(step)?,
                Entry::Group(group) => self.run_group(group)?,
            }
        }
        Ok(())
    }

    fn run_step(&mut self, step: &'r StepEntry<H>) -> Result<(), SteplineError> {
        let name = step.name();
        let label = name.unwrap_or(INLINE);

        if let Some(condition) = step.condition() {
            if !self.evaluate(condition, name)? {
                tracing::trace!(step = label, "Step skipped, condition not met");
                self.emit("step.skipped", || json!({"step": name, "reason": "condition"}));
                return Ok(());
            }
        }

        // The condition runs even for steps of another prefix.
        if step.prefix() != self.prefix {
            tracing::trace!(step = label, step_prefix = step.prefix(), "Step skipped, prefix mismatch");
            self.emit("step.skipped", || json!({"step": name, "reason": "prefix"}));
            return Ok(());
        }

        self.emit("step.started", || json!({"step": name}));

        let callbacks = self.definition.callbacks();
        self.run_callbacks(callbacks.for_step(Phase::Before, name), Phase::Before, name, None)?;

        let value = self.dispatch(step)?;

        self.run_callbacks(callbacks.for_step(Phase::After, name), Phase::After, name, Some(&value))?;

        if let Some(key) = step.binding() {
            self.bindings.set(key, value.clone());
        }
        self.result = value;

        self.emit("step.completed", || json!({"step": name, "binding": step.binding()}));
        Ok(())
    }

    fn run_group(&mut self, group: &'r ConditionGroup<H>) -> Result<(), SteplineError> {
        let fragment = group.fragment();

        if !self.evaluate(group.condition(), None)? {
            tracing::trace!(steps = fragment.step_count(), "Condition group skipped");
            self.emit("group.skipped", || json!({"steps": fragment.step_count()}));
            return Ok(());
        }

        self.emit("group.entered", || json!({"steps": fragment.step_count()}));
        self.apply_bindings(fragment.bindings());

        if let Err(err) = self.run_entries(fragment.entries()) {
            self.result = self.rescue(err, fragment.rescues())?;
        }
        Ok(())
    }

    fn dispatch(&mut self, step: &'r StepEntry<H>) -> Result<Value, SteplineError> {
        let body = match step.dispatch() {
            Dispatch::Inline { body, .. } => body,
            Dispatch::Method(name) => {
                let method = format!("{}_{}", self.prefix, name);
                self.definition
                    .method(&method)
                    .ok_or_else(|| StepError::unresolved_target(&method))?
            }
        };

        let attributes = self.attributes;
        let mut scope = self.scope().with_step(step.name());
        body.call(&mut scope, attributes)
    }

    fn evaluate(&mut self, condition: &Condition<H>, step: Option<&str>) -> Result<bool, SteplineError> {
        let attributes = self.attributes;
        let mut scope = self.scope().with_step(step);
        condition.evaluate(&mut scope, attributes)
    }

    fn run_callbacks<'c>(
        &mut self,
        callbacks: impl Iterator<Item = &'c CallbackFn<H>>,
        phase: Phase,
        step: Option<&str>,
        value: Option<&Value>,
    ) -> Result<(), SteplineError>
    where
        H: 'c,
    {
        let event = CallbackEvent {
            phase,
            step,
            value,
            attributes: self.attributes,
        };

        for callback in callbacks {
            let mut scope = self.scope().with_step(step);
            callback(&mut scope, &event)?;
        }
        Ok(())
    }

    /// Routes a failure through a rescue list. Only step errors are offered,
    /// and only to the first entry whose filter accepts their kind.
    fn rescue(&mut self, err: SteplineError, rescues: &'r [RescueEntry<H>]) -> Result<Value, SteplineError> {
        let error = match err {
            SteplineError::Step(error) => error,
            other => return Err(other),
        };

        let Some(entry) = rescues.iter().find(|entry| entry.filter().accepts(error.kind())) else {
            return Err(error.into());
        };

        tracing::trace!(kind = error.kind(), "Rescue handler selected");
        self.emit("pipeline.rescued", || {
            json!({"kind": error.kind(), "message": error.message()})
        });

        let attributes = self.attributes;
        let mut scope = self.scope().with_rescued(&error);
        entry.handler().call(&mut scope, attributes)
    }

    fn scope(&mut self) -> Scope<'_, H> {
        Scope::new(&mut *self.host, &mut self.bindings, self.prefix)
    }

    fn emit(&self, event_type: &str, extra: impl FnOnce() -> Value) {
        if let Some(sink) = self.sink {
            sink.emit(
                event_type,
                Some(event_data(&self.run_id, self.definition.name(), extra())),
            );
        }
    }
}

//! Per-call view handed to step bodies, predicates and handlers.

use super::Bindings;
use crate::errors::StepError;
use serde_json::Value;

/// What a step body can see while it runs.
///
/// The scope gives explicit access to the host object and to the invocation's
/// binding table. Attributes are passed separately, and only to callables
/// that asked for them.
pub struct Scope<'a, H> {
    host: &'a mut H,
    bindings: &'a mut Bindings,
    prefix: &'a str,
    step: Option<&'a str>,
    rescued: Option<&'a StepError>,
}

impl<'a, H> Scope<'a, H> {
    /// Creates a scope over a host and a binding table.
    pub fn new(host: &'a mut H, bindings: &'a mut Bindings, prefix: &'a str) -> Self {
        Self {
            host,
            bindings,
            prefix,
            step: None,
            rescued: None,
        }
    }

    /// Sets the name of the step being dispatched.
    #[must_use]
    pub fn with_step(mut self, step: Option<&'a str>) -> Self {
        self.step = step;
        self
    }

    /// Sets the error a rescue handler is recovering from.
    #[must_use]
    pub fn with_rescued(mut self, error: &'a StepError) -> Self {
        self.rescued = Some(error);
        self
    }

    /// Returns the host object.
    pub fn host(&self) -> &H {
        &*self.host
    }

    /// Returns the host object mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut *self.host
    }

    /// Returns the binding table.
    pub fn bindings(&self) -> &Bindings {
        &*self.bindings
    }

    /// Returns the binding table mutably.
    pub fn bindings_mut(&mut self) -> &mut Bindings {
        &mut *self.bindings
    }

    /// Gets a binding.
    pub fn binding(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }

    /// Gets a binding mutably.
    pub fn binding_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.bindings.get_mut(key)
    }

    /// Sets a binding.
    pub fn set_binding(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.bindings.set(key, value)
    }

    /// Returns the prefix selected for this invocation.
    pub fn prefix(&self) -> &str {
        self.prefix
    }

    /// Returns the step being dispatched, if any.
    pub fn step(&self) -> Option<&str> {
        self.step
    }

    /// Returns the error being rescued. Only set for rescue handlers.
    pub fn rescued_error(&self) -> Option<&StepError> {
        self.rescued
    }
}

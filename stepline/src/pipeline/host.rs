//! The host-side entry point: types that carry a pipeline.

use super::definition::PipelineDefinition;
use super::engine::ExecutionEngine;
use super::registrar::StepRegistrar;
use crate::cache::global;
use crate::config::InvokeOptions;
use crate::context::Attributes;
use crate::errors::{ConfigurationError, SteplineError};
use serde_json::Value;
use std::sync::Arc;

/// A type whose behavior is an ordered pipeline of steps.
///
/// Implementors declare their pipeline once in [`define`](Self::define). The
/// definition is built on first use, cached process-wide per type and shared
/// by every later invocation.
///
/// ```rust,ignore
/// impl Steps for Register {
///     fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
///         steps
///             .declare_step("create_user", StepOptions::new().set("user"))?
///             .declare_method("step_create_user", StepFn::new(|scope| { ... }))?;
///         Ok(())
///     }
/// }
///
/// let user = Register::default().invoke(attributes)?;
/// ```
pub trait Steps: Sized + 'static {
    /// Declares the pipeline.
    ///
    /// May read the definition of another type, never its own.
    fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError>;

    /// Name recorded on the definition, spans and events.
    fn pipeline_name() -> String {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_string()
    }

    /// Returns the cached definition, building it on first use.
    fn definition() -> Result<Arc<PipelineDefinition<Self>>, ConfigurationError> {
        global().get_or_define::<Self>()
    }

    /// Runs the pipeline with the default prefix and no overrides.
    fn invoke(&mut self, attributes: Attributes) -> Result<Value, SteplineError> {
        self.invoke_with(attributes, &InvokeOptions::default())
    }

    /// Runs the pipeline with explicit options.
    fn invoke_with(&mut self, attributes: Attributes, options: &InvokeOptions) -> Result<Value, SteplineError> {
        let definition = Self::definition()?;
        ExecutionEngine::new(&definition).run(self, &attributes, options)
    }
}

/// Builds a fresh definition for `H` without caching it.
///
/// # Errors
///
/// Returns the first configuration error raised by [`Steps::define`].
pub fn build_definition<H: Steps>() -> Result<PipelineDefinition<H>, ConfigurationError> {
    let mut registrar = StepRegistrar::new(H::pipeline_name());
    H::define(&mut registrar)?;
    Ok(registrar.finish())
}

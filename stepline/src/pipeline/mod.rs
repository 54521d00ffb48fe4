//! Pipeline declaration and execution.
//!
//! This module provides:
//! - Callables that record whether they take the attributes
//! - Pipeline definitions: steps, condition groups, rescues, callbacks
//! - The registrar used to declare a pipeline
//! - The engine that runs a definition for one invocation
//! - The `Steps` trait tying a host type to its cached definition

mod callable;
mod definition;
mod engine;
mod host;
mod registrar;

#[cfg(test)]
mod integration_tests;

pub use callable::{Callable, Condition, Predicate, StepFn};
pub use definition::{
    CallbackEvent, CallbackFn, CallbackScope, Callbacks, ConditionGroup, Dispatch, Entry, Fragment,
    Phase, PipelineDefinition, RescueEntry, RescueFilter, StepEntry,
};
pub use engine::ExecutionEngine;
pub use host::{build_definition, Steps};
pub use registrar::{StepOptions, StepRegistrar, StepTarget, DEFAULT_PREFIX};

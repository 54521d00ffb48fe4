//! # Stepline
//!
//! Declarative step pipelines for host types.
//!
//! A host type lists its behavior as an ordered set of named steps over an
//! immutable attribute bundle. Steps write their results into per-invocation
//! bindings, and the engine supports:
//!
//! - **Conditions**: `when` / `unless` predicates on steps, and nested
//!   condition groups
//! - **Prefixes**: partitions of a pipeline selected per invocation
//! - **Callbacks**: before/after hooks around the run, every step, or one step
//! - **Rescue chains**: first-match recovery from step errors; structured
//!   errors always propagate
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepline::prelude::*;
//!
//! #[derive(Default)]
//! struct Register;
//!
//! impl Steps for Register {
//!     fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
//!         steps
//!             .declare_binding(["email"])?
//!             .declare_step("create_user", StepOptions::new().set("user"))?
//!             .declare_method("step_create_user", StepFn::new(|scope| {
//!                 Ok(serde_json::json!({"email": scope.binding("email")}))
//!             }))?;
//!         Ok(())
//!     }
//! }
//!
//! let user = Register.invoke(Attributes::new().with("email", "a@b.c".into()))?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{global, DefinitionRegistry, SharedCache};
    pub use crate::config::{EngineConfig, InvokeOptions};
    pub use crate::context::{Attributes, Bindings, Scope};
    pub use crate::errors::{ConfigurationError, StepError, SteplineError, StructuredError};
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::observability::{init_tracing, TracingConfig};
    pub use crate::pipeline::{
        build_definition, Callable, CallbackEvent, CallbackScope, ExecutionEngine, Phase,
        PipelineDefinition, Predicate, RescueFilter, StepFn, StepOptions, StepRegistrar,
        StepTarget, Steps, DEFAULT_PREFIX,
    };
}

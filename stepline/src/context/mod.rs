//! Per-invocation state.
//!
//! This module provides:
//! - The immutable attribute bundle passed to every invocation
//! - The mutable binding table steps write their results into
//! - The scope handed to step bodies, predicates and handlers

mod attributes;
mod bindings;
mod scope;

pub use attributes::Attributes;
pub use bindings::Bindings;
pub use scope::Scope;

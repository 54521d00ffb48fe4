//! Testing utilities for stepline pipelines.
//!
//! This module provides:
//! - An ordered, shareable call log for host types under test
//! - Attribute fixtures and a run harness that collects events
//! - Assertions on pipeline errors

mod assertions;
mod fixtures;

pub use assertions::{
    assert_configuration_error, assert_step_kind, assert_structured, assert_unresolved_target,
};
pub use fixtures::{attributes, CallLog, TestRun};

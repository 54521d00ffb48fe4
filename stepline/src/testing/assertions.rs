//! Test assertions for pipeline errors.

use crate::errors::{ConfigurationError, StepError, SteplineError};
use serde_json::Value;

/// Asserts that the result is a step error of the given kind.
pub fn assert_step_kind<T: std::fmt::Debug>(result: &Result<T, SteplineError>, kind: &str) {
    match result {
        Err(SteplineError::Step(err)) => assert_eq!(
            err.kind(),
            kind,
            "Expected step error of kind '{}', got '{}'",
            kind,
            err.kind()
        ),
        other => panic!("Expected step error of kind '{kind}', got {other:?}"),
    }
}

/// Asserts that the result is an unresolved target error naming `method`.
pub fn assert_unresolved_target<T: std::fmt::Debug>(result: &Result<T, SteplineError>, method: &str) {
    assert_step_kind(result, StepError::UNRESOLVED_TARGET);
    if let Err(err) = result {
        assert!(
            err.to_string().contains(method),
            "Expected unresolved target '{}', got: {}",
            method,
            err
        );
    }
}

/// Asserts that the result is a structured error carrying `payload`.
pub fn assert_structured<T: std::fmt::Debug>(result: &Result<T, SteplineError>, payload: &Value) {
    match result {
        Err(SteplineError::Structured(err)) => assert_eq!(
            err.payload(),
            Some(payload),
            "Expected structured payload {}, got {:?}",
            payload,
            err.payload()
        ),
        other => panic!("Expected structured error, got {other:?}"),
    }
}

/// Asserts that the result is a configuration error equal to `expected`.
pub fn assert_configuration_error<T: std::fmt::Debug>(
    result: &Result<T, ConfigurationError>,
    expected: &ConfigurationError,
) {
    match result {
        Err(err) => assert_eq!(err, expected, "Expected {expected:?}, got {err:?}"),
        Ok(value) => panic!("Expected configuration error {expected:?}, got Ok({value:?})"),
    }
}

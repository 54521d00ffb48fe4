//! Error types for the stepline engine.
//!
//! Three kinds of failure flow through a pipeline:
//!
//! - [`ConfigurationError`]: a malformed declaration, raised while the
//!   definition is being registered.
//! - [`StructuredError`]: an intentional hard failure carrying a JSON payload.
//!   Rescue handlers never see it.
//! - [`StepError`]: anything else raised by a step, predicate, callback or
//!   handler body. This is the only kind the rescue chain may recover from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for stepline operations.
#[derive(Debug, Error)]
pub enum SteplineError {
    /// A declaration was rejected while building a definition.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// An intentional failure with a structured payload.
    #[error("{0}")]
    Structured(#[from] StructuredError),

    /// A recoverable failure raised by a step body or predicate.
    #[error("{0}")]
    Step(#[from] StepError),

    /// The attribute bundle could not be built from the given input.
    #[error("Invalid attributes: {0}")]
    InvalidAttributes(String),
}

impl SteplineError {
    /// Returns true when the rescue chain is allowed to handle this error.
    #[must_use]
    pub const fn is_rescuable(&self) -> bool {
        matches!(self, Self::Step(_))
    }

    /// Returns the step error, if this is one.
    #[must_use]
    pub const fn as_step(&self) -> Option<&StepError> {
        match self {
            Self::Step(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the structured error, if this is one.
    #[must_use]
    pub const fn as_structured(&self) -> Option<&StructuredError> {
        match self {
            Self::Structured(err) => Some(err),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for SteplineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Step(StepError::from(err))
    }
}

impl From<serde_json::Error> for SteplineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Step(StepError::from_source(StepError::SERIALIZATION, err))
    }
}

/// Error raised when a pipeline declaration is malformed.
///
/// These are always fatal: they surface from registration and are never
/// offered to rescue handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A step declared both a method name and an inline body, or labelled a
    /// method target.
    #[error("Step '{step}' declares conflicting targets: {reason}")]
    ConflictingTarget {
        /// The step name involved.
        step: String,
        /// What conflicted.
        reason: String,
    },

    /// A step declared neither a method name nor an inline body.
    #[error("Step declaration has no target")]
    MissingTarget,

    /// A step declared more than one condition.
    #[error("Step '{step}' declares conflicting conditions")]
    ConflictingCondition {
        /// The step name involved.
        step: String,
    },

    /// A name is not a valid identifier.
    #[error("Invalid {what} name '{name}'")]
    InvalidName {
        /// What kind of name this is (step, method, binding, prefix).
        what: &'static str,
        /// The offending name.
        name: String,
    },

    /// A binding key was declared twice in one fragment.
    #[error("Binding '{key}' is declared more than once")]
    DuplicateBinding {
        /// The duplicated key.
        key: String,
    },

    /// A method name was registered twice.
    #[error("Method '{name}' is already registered")]
    DuplicateMethod {
        /// The duplicated method name.
        name: String,
    },

    /// A declaration that only makes sense at the top level appeared in a
    /// conditional group.
    #[error("{declaration} cannot be declared inside a conditional group")]
    NotAllowedInGroup {
        /// The kind of declaration.
        declaration: &'static str,
    },
}

impl ConfigurationError {
    /// Creates a conflicting target error.
    #[must_use]
    pub fn conflicting_target(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConflictingTarget {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Creates a conflicting condition error.
    #[must_use]
    pub fn conflicting_condition(step: impl Into<String>) -> Self {
        Self::ConflictingCondition { step: step.into() }
    }

    /// Creates an invalid name error.
    #[must_use]
    pub fn invalid_name(what: &'static str, name: impl Into<String>) -> Self {
        Self::InvalidName {
            what,
            name: name.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::ConflictingTarget { step, reason } => {
                map.insert("type".to_string(), serde_json::json!("ConflictingTarget"));
                map.insert("step".to_string(), serde_json::json!(step));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::MissingTarget => {
                map.insert("type".to_string(), serde_json::json!("MissingTarget"));
            }
            Self::ConflictingCondition { step } => {
                map.insert("type".to_string(), serde_json::json!("ConflictingCondition"));
                map.insert("step".to_string(), serde_json::json!(step));
            }
            Self::InvalidName { what, name } => {
                map.insert("type".to_string(), serde_json::json!("InvalidName"));
                map.insert("what".to_string(), serde_json::json!(what));
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::DuplicateBinding { key } => {
                map.insert("type".to_string(), serde_json::json!("DuplicateBinding"));
                map.insert("key".to_string(), serde_json::json!(key));
            }
            Self::DuplicateMethod { name } => {
                map.insert("type".to_string(), serde_json::json!("DuplicateMethod"));
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::NotAllowedInGroup { declaration } => {
                map.insert("type".to_string(), serde_json::json!("NotAllowedInGroup"));
                map.insert("declaration".to_string(), serde_json::json!(declaration));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// An intentional failure carrying an arbitrary structured payload.
///
/// Displays as the payload's canonical JSON text so log collaborators can
/// record it as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredError {
    /// The payload, preserved verbatim.
    pub payload: Option<serde_json::Value>,
}

impl StructuredError {
    /// Creates a structured error with a payload.
    #[must_use]
    pub const fn new(payload: serde_json::Value) -> Self {
        Self {
            payload: Some(payload),
        }
    }

    /// Creates a structured error without a payload.
    #[must_use]
    pub const fn empty() -> Self {
        Self { payload: None }
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(payload) => write!(f, "{payload}"),
            None => write!(f, "StructuredError"),
        }
    }
}

impl std::error::Error for StructuredError {}

/// A recoverable failure raised while running a pipeline.
///
/// The `kind` is what rescue filters match against.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct StepError {
    kind: String,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StepError {
    /// Kind used for errors converted from `anyhow::Error`.
    pub const GENERIC: &'static str = "error";
    /// Kind used for JSON (de)serialization failures.
    pub const SERIALIZATION: &'static str = "serialization";
    /// Kind used when a named step has no registered method.
    pub const UNRESOLVED_TARGET: &'static str = "unresolved_target";

    /// Creates a new step error.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a step error wrapping an underlying error.
    #[must_use]
    pub fn from_source<E>(kind: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates the error raised when `"{prefix}_{name}"` is not in the method
    /// table.
    #[must_use]
    pub fn unresolved_target(method: &str) -> Self {
        Self::new(
            Self::UNRESOLVED_TARGET,
            format!("unresolved step target '{method}'"),
        )
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            kind: Self::GENERIC.to_string(),
            message: format!("{err:#}"),
            source: Some(err.into()),
        }
    }
}

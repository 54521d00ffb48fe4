//! Engine and invocation configuration.

use crate::errors::SteplineError;
use crate::pipeline::DEFAULT_PREFIX;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

const fn default_emit_events() -> bool {
    true
}

/// Settings shared by every run of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix used when an invocation does not name one.
    #[serde(default = "default_prefix")]
    pub default_prefix: String,
    /// Whether lifecycle events are sent to the event sink.
    #[serde(default = "default_emit_events")]
    pub emit_events: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_prefix: default_prefix(),
            emit_events: default_emit_events(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON text. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns a serialization step error if the text is not a valid
    /// configuration.
    pub fn from_json(text: &str) -> Result<Self, SteplineError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Sets the default prefix.
    #[must_use]
    pub fn with_default_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.default_prefix = prefix.into();
        self
    }

    /// Turns event emission on or off.
    #[must_use]
    pub const fn with_events(mut self, emit: bool) -> Self {
        self.emit_events = emit;
        self
    }
}

/// Per-call options for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeOptions {
    /// Only steps declared under this prefix run. Falls back to the engine's
    /// default prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Values taking precedence over the attributes when initializing
    /// declared bindings. A null override counts as absent.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub binding_overrides: Map<String, Value>,
}

impl InvokeOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Adds a binding override.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: Value) -> Self {
        self.binding_overrides.insert(key.into(), value);
        self
    }

    /// Returns the override for `key`, ignoring nulls.
    #[must_use]
    pub fn binding_override(&self, key: &str) -> Option<&Value> {
        self.binding_overrides.get(key).filter(|value| !value.is_null())
    }

    /// Returns the prefix to use, given the engine's default.
    #[must_use]
    pub fn prefix_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.prefix.as_deref().unwrap_or(default)
    }
}

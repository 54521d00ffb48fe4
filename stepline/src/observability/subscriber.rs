//! Subscriber installation for binaries and tests embedding the engine.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

fn default_filter() -> String {
    "info".to_string()
}

/// How [`init_tracing`] configures the global subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Filter directives used when `RUST_LOG` is not set, e.g. `"stepline=debug"`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit one JSON object per record instead of human-readable lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl TracingConfig {
    /// Sets the fallback filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Switches to JSON output.
    #[must_use]
    pub const fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }
}

/// Installs a global `tracing` subscriber.
///
/// Returns false if a global subscriber was already installed; the existing
/// one is kept.
pub fn init_tracing(config: &TracingConfig) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(config.env_filter());

    if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

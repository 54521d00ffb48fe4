//! Thread-safe caches for pipeline definitions.
//!
//! This module provides:
//! - A minimal lock-guarded key/value store
//! - A registry holding one pipeline definition per host type

mod registry;
mod shared;

pub use registry::{global, DefinitionRegistry};
pub use shared::SharedCache;

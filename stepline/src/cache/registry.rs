//! Per-type registry of pipeline definitions.

use super::SharedCache;
use crate::errors::ConfigurationError;
use crate::pipeline::{build_definition, PipelineDefinition, Steps};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, LazyLock};

type Erased = Arc<dyn Any + Send + Sync>;

/// One host type's definition, filled on first successful build.
type Slot = Arc<Mutex<Option<Erased>>>;

/// Holds one definition per host type.
///
/// Definitions are stored type-erased behind their [`TypeId`] and handed out
/// as `Arc<PipelineDefinition<H>>`. Once stored, a definition is only read.
///
/// Each type has its own slot. The registry-wide lock only guards slot
/// lookup, so building one type's definition never blocks another's, and a
/// `define` may ask for the definition of a different type.
#[derive(Default)]
pub struct DefinitionRegistry {
    slots: SharedCache<TypeId, Slot>,
}

impl DefinitionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<H: 'static>(&self) -> Slot {
        self.slots.get_or_insert_with(TypeId::of::<H>(), Slot::default)
    }

    /// Builds the definition of `H` and stores it, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns the configuration error raised by `H::define`; the registry is
    /// left unchanged then.
    pub fn define<H: Steps>(&self) -> Result<Arc<PipelineDefinition<H>>, ConfigurationError> {
        let definition = build_definition::<H>()?;
        Ok(self.insert(definition))
    }

    /// Stores a prebuilt definition for `H`, replacing any previous one.
    pub fn insert<H: 'static>(&self, definition: PipelineDefinition<H>) -> Arc<PipelineDefinition<H>> {
        let definition = Arc::new(definition);
        *self.slot::<H>().lock() = Some(Arc::clone(&definition) as Erased);
        definition
    }

    /// Returns the stored definition of `H`, if any.
    #[must_use]
    pub fn get<H: 'static>(&self) -> Option<Arc<PipelineDefinition<H>>> {
        let slot = self.slots.get(&TypeId::of::<H>())?;
        let erased = slot.lock().clone()?;
        erased.downcast().ok()
    }

    /// Returns the definition of `H`, building it on first use.
    ///
    /// Concurrent first calls build the definition exactly once. `H::define`
    /// must not ask for the definition of `H` itself.
    ///
    /// # Errors
    ///
    /// Returns the configuration error raised by `H::define`. Nothing is
    /// cached then, so the next call tries again.
    pub fn get_or_define<H: Steps>(&self) -> Result<Arc<PipelineDefinition<H>>, ConfigurationError> {
        let slot = self.slot::<H>();
        let mut stored = slot.lock();

        if let Some(definition) = stored.clone().and_then(|erased| erased.downcast().ok()) {
            return Ok(definition);
        }

        let definition = Arc::new(build_definition::<H>()?);
        *stored = Some(Arc::clone(&definition) as Erased);
        Ok(definition)
    }

    /// Returns true if a definition of `H` is stored.
    #[must_use]
    pub fn contains<H: 'static>(&self) -> bool {
        self.slots
            .get(&TypeId::of::<H>())
            .is_some_and(|slot| slot.lock().is_some())
    }

    /// Drops the stored definition of `H`.
    pub fn remove<H: 'static>(&self) -> bool {
        self.slots
            .remove(&TypeId::of::<H>())
            .is_some_and(|slot| slot.lock().take().is_some())
    }

    /// Returns the number of stored definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .values()
            .iter()
            .filter(|slot| slot.lock().is_some())
            .count()
    }

    /// Returns true if no definition is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every stored definition.
    pub fn clear(&self) {
        self.slots.clear();
    }
}

impl fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("definitions", &self.len())
            .finish()
    }
}

static GLOBAL_REGISTRY: LazyLock<DefinitionRegistry> = LazyLock::new(DefinitionRegistry::new);

/// Returns the process-wide registry used by [`Steps::invoke`].
pub fn global() -> &'static DefinitionRegistry {
    &GLOBAL_REGISTRY
}

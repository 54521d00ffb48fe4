//! Pipeline definition data: steps, condition groups, rescues and callbacks.
//!
//! A definition is plain data. It is assembled by a
//! [`StepRegistrar`](super::StepRegistrar), frozen behind an `Arc`, and only
//! read by the engine afterwards.

use super::callable::{Condition, StepFn};
use crate::context::{Attributes, Scope};
use crate::errors::SteplineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// How a step produces its value.
pub enum Dispatch<H> {
    /// A host method resolved as `"{prefix}_{name}"` at run time.
    Method(String),
    /// An inline body, optionally labelled so callbacks can target it.
    Inline {
        /// Name used by step-scoped callbacks.
        label: Option<String>,
        /// The body.
        body: StepFn<H>,
    },
}

impl<H> Dispatch<H> {
    /// Returns the step's name: the method name or the inline label.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Method(name) => Some(name.as_str()),
            Self::Inline { label, .. } => label.as_deref(),
        }
    }
}

/// One registered step.
pub struct StepEntry<H> {
    pub(crate) dispatch: Dispatch<H>,
    pub(crate) binding: Option<String>,
    pub(crate) condition: Option<Condition<H>>,
    pub(crate) prefix: String,
}

impl<H> StepEntry<H> {
    /// Returns how the step is dispatched.
    #[must_use]
    pub const fn dispatch(&self) -> &Dispatch<H> {
        &self.dispatch
    }

    /// Returns the step's name, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.dispatch.name()
    }

    /// Returns the binding key receiving the result.
    #[must_use]
    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }

    /// Returns the gating condition.
    #[must_use]
    pub const fn condition(&self) -> Option<&Condition<H>> {
        self.condition.as_ref()
    }

    /// Returns the prefix this step belongs to.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// A nested fragment that only runs when its condition holds.
pub struct ConditionGroup<H> {
    pub(crate) condition: Condition<H>,
    pub(crate) fragment: Fragment<H>,
}

impl<H> ConditionGroup<H> {
    /// Returns the gating condition.
    #[must_use]
    pub const fn condition(&self) -> &Condition<H> {
        &self.condition
    }

    /// Returns the nested fragment.
    #[must_use]
    pub const fn fragment(&self) -> &Fragment<H> {
        &self.fragment
    }
}

/// An ordered entry of a fragment.
pub enum Entry<H> {
    /// A single step.
    Step(StepEntry<H>),
    /// A conditional sub-pipeline.
    Group(ConditionGroup<H>),
}

/// Which error kinds a rescue entry accepts.
///
/// An empty filter accepts every rescuable error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueFilter {
    kinds: BTreeSet<String>,
}

impl RescueFilter {
    /// Accepts any rescuable error.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Accepts only the given error kinds.
    #[must_use]
    pub fn kinds(kinds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the filter accepts `kind`.
    #[must_use]
    pub fn accepts(&self, kind: &str) -> bool {
        self.kinds.is_empty() || self.kinds.contains(kind)
    }
}

/// One rescue handler.
pub struct RescueEntry<H> {
    pub(crate) filter: RescueFilter,
    pub(crate) handler: StepFn<H>,
}

impl<H> RescueEntry<H> {
    /// Returns the error filter.
    #[must_use]
    pub const fn filter(&self) -> &RescueFilter {
        &self.filter
    }

    /// Returns the handler.
    #[must_use]
    pub const fn handler(&self) -> &StepFn<H> {
        &self.handler
    }
}

/// An ordered list of entries with its own binding keys and rescues.
///
/// The root of a definition is a fragment; so is the body of every condition
/// group.
pub struct Fragment<H> {
    pub(crate) entries: Vec<Entry<H>>,
    pub(crate) bindings: Vec<String>,
    pub(crate) rescues: Vec<RescueEntry<H>>,
}

impl<H> Default for Fragment<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            bindings: Vec::new(),
            rescues: Vec::new(),
        }
    }
}

impl<H> Fragment<H> {
    /// Returns the ordered entries.
    #[must_use]
    pub fn entries(&self) -> &[Entry<H>] {
        &self.entries
    }

    /// Returns the declared binding keys.
    #[must_use]
    pub fn bindings(&self) -> &[String] {
        &self.bindings
    }

    /// Returns the rescue entries.
    #[must_use]
    pub fn rescues(&self) -> &[RescueEntry<H>] {
        &self.rescues
    }

    /// Counts steps, including those nested in groups.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Step(_) => 1,
                Entry::Group(group) => group.fragment.step_count(),
            })
            .sum()
    }
}

/// When a callback fires relative to what it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the step or invocation.
    Before,
    /// After the step or invocation.
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => write!(f, "before"),
            Self::After => write!(f, "after"),
        }
    }
}

/// What a callback wraps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackScope {
    /// The whole invocation, once.
    All,
    /// Every dispatched step.
    Each,
    /// Only the step with this name.
    Step(String),
}

/// What a callback is told about the moment it fires.
#[derive(Debug, Clone, Copy)]
pub struct CallbackEvent<'a> {
    /// Before or after.
    pub phase: Phase,
    /// The step being wrapped; `None` for invocation-wide callbacks.
    pub step: Option<&'a str>,
    /// The value produced by the step (after-step) or the invocation result so
    /// far (after-all). `None` for before-callbacks.
    pub value: Option<&'a Value>,
    /// The invocation's attributes.
    pub attributes: &'a Attributes,
}

/// A lifecycle callback.
pub type CallbackFn<H> =
    Arc<dyn Fn(&mut Scope<'_, H>, &CallbackEvent<'_>) -> Result<(), SteplineError> + Send + Sync>;

pub(crate) fn callback_fn<H, F>(f: F) -> CallbackFn<H>
where
    F: Fn(&mut Scope<'_, H>, &CallbackEvent<'_>) -> Result<(), SteplineError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Callbacks indexed by phase and scope.
pub struct Callbacks<H> {
    before: HashMap<CallbackScope, Vec<CallbackFn<H>>>,
    after: HashMap<CallbackScope, Vec<CallbackFn<H>>>,
}

impl<H> Default for Callbacks<H> {
    fn default() -> Self {
        Self {
            before: HashMap::new(),
            after: HashMap::new(),
        }
    }
}

impl<H> Callbacks<H> {
    pub(crate) fn push(&mut self, phase: Phase, scope: CallbackScope, callback: CallbackFn<H>) {
        self.phase_mut(phase).entry(scope).or_default().push(callback);
    }

    /// Returns the invocation-wide callbacks for a phase.
    pub fn for_all(&self, phase: Phase) -> impl Iterator<Item = &CallbackFn<H>> {
        self.phase(phase)
            .get(&CallbackScope::All)
            .into_iter()
            .flatten()
    }

    /// Returns the callbacks wrapping one step: `Each` first, then those
    /// registered for the step's name.
    pub fn for_step<'a>(
        &'a self,
        phase: Phase,
        name: Option<&str>,
    ) -> impl Iterator<Item = &'a CallbackFn<H>> + 'a {
        let callbacks = self.phase(phase);
        let named = name.and_then(|name| callbacks.get(&CallbackScope::Step(name.to_string())));

        callbacks
            .get(&CallbackScope::Each)
            .into_iter()
            .flatten()
            .chain(named.into_iter().flatten())
    }

    /// Returns the number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.before.values().chain(self.after.values()).map(Vec::len).sum()
    }

    /// Returns true if no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    const fn phase(&self, phase: Phase) -> &HashMap<CallbackScope, Vec<CallbackFn<H>>> {
        match phase {
            Phase::Before => &self.before,
            Phase::After => &self.after,
        }
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut HashMap<CallbackScope, Vec<CallbackFn<H>>> {
        match phase {
            Phase::Before => &mut self.before,
            Phase::After => &mut self.after,
        }
    }
}

/// The complete, read-only pipeline of one host type.
pub struct PipelineDefinition<H> {
    pub(crate) name: String,
    pub(crate) root: Fragment<H>,
    pub(crate) callbacks: Callbacks<H>,
    pub(crate) methods: HashMap<String, StepFn<H>>,
}

impl<H> PipelineDefinition<H> {
    /// Returns the definition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the top-level fragment.
    #[must_use]
    pub const fn root(&self) -> &Fragment<H> {
        &self.root
    }

    /// Returns the callback registry.
    #[must_use]
    pub const fn callbacks(&self) -> &Callbacks<H> {
        &self.callbacks
    }

    /// Looks up a host method by its full name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&StepFn<H>> {
        self.methods.get(name)
    }

    /// Returns the registered method names, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Counts steps, including those nested in groups.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.root.step_count()
    }
}

impl<H> fmt::Debug for PipelineDefinition<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("name", &self.name)
            .field("steps", &self.step_count())
            .field("bindings", &self.root.bindings)
            .field("rescues", &self.root.rescues.len())
            .field("callbacks", &self.callbacks.len())
            .field("methods", &self.method_names())
            .finish()
    }
}

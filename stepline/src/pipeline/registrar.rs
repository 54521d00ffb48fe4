//! Definition-time API for declaring steps.

use super::callable::{Condition, Predicate, StepFn};
use super::definition::{
    callback_fn, CallbackEvent, CallbackScope, Callbacks, ConditionGroup, Dispatch, Entry, Fragment,
    Phase, PipelineDefinition, RescueEntry, RescueFilter, StepEntry,
};
use crate::context::Scope;
use crate::errors::{ConfigurationError, SteplineError};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// The prefix steps belong to unless they say otherwise.
pub const DEFAULT_PREFIX: &str = "step";

#[allow(clippy::expect_used)]
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

fn validate_identifier(what: &'static str, name: &str) -> Result<(), ConfigurationError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(ConfigurationError::invalid_name(what, name))
    }
}

/// What a step declaration dispatches to.
///
/// Built from a method name (`"create_user".into()`), an inline body
/// (`StepTarget::inline(body)`), or a labelled inline body. Conflicting forms
/// are accepted here and rejected by [`StepRegistrar::declare_step`].
pub struct StepTarget<H> {
    method: Option<String>,
    body: Option<StepFn<H>>,
    label: Option<String>,
}

impl<H> StepTarget<H> {
    /// Targets a host method, resolved as `"{prefix}_{name}"`.
    #[must_use]
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            method: Some(name.into()),
            body: None,
            label: None,
        }
    }

    /// Targets an inline body.
    #[must_use]
    pub fn inline(body: StepFn<H>) -> Self {
        Self {
            method: None,
            body: Some(body),
            label: None,
        }
    }

    /// Names an inline step so step-scoped callbacks can target it.
    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attaches an inline body.
    #[must_use]
    pub fn with_body(mut self, body: StepFn<H>) -> Self {
        self.body = Some(body);
        self
    }

    fn display_name(&self) -> &str {
        self.method
            .as_deref()
            .or(self.label.as_deref())
            .unwrap_or("<inline>")
    }

    fn into_dispatch(self) -> Result<Dispatch<H>, ConfigurationError> {
        match (self.method, self.body, self.label) {
            (Some(method), Some(_), _) => Err(ConfigurationError::conflicting_target(
                method,
                "both a method name and an inline body",
            )),
            (Some(method), None, Some(label)) => Err(ConfigurationError::conflicting_target(
                method,
                format!("method targets cannot be labelled '{label}'"),
            )),
            (Some(method), None, None) => {
                validate_identifier("step", &method)?;
                Ok(Dispatch::Method(method))
            }
            (None, Some(body), label) => {
                if let Some(label) = &label {
                    validate_identifier("step", label)?;
                }
                Ok(Dispatch::Inline { label, body })
            }
            (None, None, _) => Err(ConfigurationError::MissingTarget),
        }
    }
}

impl<H> From<&str> for StepTarget<H> {
    fn from(name: &str) -> Self {
        Self::method(name)
    }
}

impl<H> From<String> for StepTarget<H> {
    fn from(name: String) -> Self {
        Self::method(name)
    }
}

impl<H> From<StepFn<H>> for StepTarget<H> {
    fn from(body: StepFn<H>) -> Self {
        Self::inline(body)
    }
}

/// Options shared by step declarations.
pub struct StepOptions<H> {
    set: Option<String>,
    when: Option<Predicate<H>>,
    unless: Option<Predicate<H>>,
    prefix: Option<String>,
}

impl<H> Default for StepOptions<H> {
    fn default() -> Self {
        Self {
            set: None,
            when: None,
            unless: None,
            prefix: None,
        }
    }
}

impl<H> Clone for StepOptions<H> {
    fn clone(&self) -> Self {
        Self {
            set: self.set.clone(),
            when: self.when.clone(),
            unless: self.unless.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

impl<H> StepOptions<H> {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the step's result into this binding.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>) -> Self {
        self.set = Some(key.into());
        self
    }

    /// Runs the step only when the predicate holds.
    #[must_use]
    pub fn when(mut self, predicate: Predicate<H>) -> Self {
        self.when = Some(predicate);
        self
    }

    /// Runs the step only when the predicate does not hold.
    #[must_use]
    pub fn unless(mut self, predicate: Predicate<H>) -> Self {
        self.unless = Some(predicate);
        self
    }

    /// Places the step under another prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    const fn has_condition(&self) -> bool {
        self.when.is_some() || self.unless.is_some()
    }
}

/// Appends declarations to a pipeline definition.
///
/// Every declaration is validated immediately; a malformed one returns a
/// [`ConfigurationError`] and leaves the registrar unchanged.
pub struct StepRegistrar<H> {
    name: String,
    fragment: Fragment<H>,
    callbacks: Callbacks<H>,
    methods: HashMap<String, StepFn<H>>,
    nested: bool,
}

impl<H> StepRegistrar<H> {
    /// Creates a registrar for a top-level definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fragment: Fragment::default(),
            callbacks: Callbacks::default(),
            methods: HashMap::new(),
            nested: false,
        }
    }

    fn nested(name: &str) -> Self {
        Self {
            nested: true,
            ..Self::new(name)
        }
    }

    /// Declares a step.
    ///
    /// # Errors
    ///
    /// Returns an error for conflicting or missing targets, conflicting
    /// conditions, or invalid names.
    pub fn declare_step(
        &mut self,
        target: impl Into<StepTarget<H>>,
        options: StepOptions<H>,
    ) -> Result<&mut Self, ConfigurationError> {
        let entry = Self::build_step(target.into(), options)?;
        self.fragment.entries.push(Entry::Step(entry));
        Ok(self)
    }

    /// Declares a group of steps that only runs when `predicate` holds.
    ///
    /// `builder` receives a fresh registrar; nothing it declares leaks into
    /// this one except through the resulting group.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while building the group.
    pub fn declare_conditional_group<F>(
        &mut self,
        predicate: Predicate<H>,
        builder: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        F: FnOnce(&mut Self) -> Result<(), ConfigurationError>,
    {
        self.push_group(Condition::when(predicate), builder)
    }

    /// Declares a group of steps that only runs when `predicate` does not hold.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while building the group.
    pub fn declare_unless_group<F>(
        &mut self,
        predicate: Predicate<H>,
        builder: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        F: FnOnce(&mut Self) -> Result<(), ConfigurationError>,
    {
        self.push_group(Condition::unless(predicate), builder)
    }

    /// Declares binding keys initialized from the attributes.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid or duplicated keys; no key is added then.
    pub fn declare_binding<I, K>(&mut self, keys: I) -> Result<&mut Self, ConfigurationError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut added: Vec<String> = Vec::new();

        for key in keys {
            let key = key.into();
            validate_identifier("binding", &key)?;
            if self.fragment.bindings.contains(&key) || added.contains(&key) {
                return Err(ConfigurationError::DuplicateBinding { key });
            }
            added.push(key);
        }

        self.fragment.bindings.extend(added);
        Ok(self)
    }

    /// Declares a rescue handler. The first matching handler wins.
    ///
    /// # Errors
    ///
    /// Never fails today; kept fallible like every other declaration.
    pub fn declare_rescue(
        &mut self,
        filter: RescueFilter,
        handler: StepFn<H>,
    ) -> Result<&mut Self, ConfigurationError> {
        self.fragment.rescues.push(RescueEntry { filter, handler });
        Ok(self)
    }

    /// Declares a lifecycle callback.
    ///
    /// # Errors
    ///
    /// Returns an error inside a conditional group, or when a step scope names
    /// an invalid step.
    pub fn declare_callback<F>(
        &mut self,
        phase: Phase,
        scope: CallbackScope,
        handler: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(&mut Scope<'_, H>, &CallbackEvent<'_>) -> Result<(), SteplineError> + Send + Sync + 'static,
    {
        if self.nested {
            return Err(ConfigurationError::NotAllowedInGroup {
                declaration: "callback",
            });
        }
        if let CallbackScope::Step(name) = &scope {
            validate_identifier("step", name)?;
        }

        self.callbacks.push(phase, scope, callback_fn(handler));
        Ok(self)
    }

    /// Declares a callback running before `scope`.
    ///
    /// # Errors
    ///
    /// See [`declare_callback`](Self::declare_callback).
    pub fn before<F>(&mut self, scope: CallbackScope, handler: F) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(&mut Scope<'_, H>, &CallbackEvent<'_>) -> Result<(), SteplineError> + Send + Sync + 'static,
    {
        self.declare_callback(Phase::Before, scope, handler)
    }

    /// Declares a callback running after `scope`.
    ///
    /// # Errors
    ///
    /// See [`declare_callback`](Self::declare_callback).
    pub fn after<F>(&mut self, scope: CallbackScope, handler: F) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(&mut Scope<'_, H>, &CallbackEvent<'_>) -> Result<(), SteplineError> + Send + Sync + 'static,
    {
        self.declare_callback(Phase::After, scope, handler)
    }

    /// Declares two steps of which exactly one runs: the first when
    /// `predicate` holds, the second otherwise. Both share `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if `options` already carries a condition, or if either
    /// step is malformed; nothing is added then.
    pub fn declare_if_else(
        &mut self,
        predicate: Predicate<H>,
        targets: (impl Into<StepTarget<H>>, impl Into<StepTarget<H>>),
        options: StepOptions<H>,
    ) -> Result<&mut Self, ConfigurationError> {
        let (if_target, else_target) = (targets.0.into(), targets.1.into());

        if options.has_condition() {
            return Err(ConfigurationError::conflicting_condition(
                if_target.display_name(),
            ));
        }

        let if_step = Self::build_step(if_target, options.clone().when(predicate.clone()))?;
        let else_step = Self::build_step(else_target, options.unless(predicate))?;

        self.fragment.entries.push(Entry::Step(if_step));
        self.fragment.entries.push(Entry::Step(else_step));
        Ok(self)
    }

    /// Registers a host method under its full name, e.g. `"step_create_user"`.
    ///
    /// # Errors
    ///
    /// Returns an error inside a conditional group, for an invalid name, or
    /// when the name is already registered.
    pub fn declare_method(
        &mut self,
        name: impl Into<String>,
        body: StepFn<H>,
    ) -> Result<&mut Self, ConfigurationError> {
        if self.nested {
            return Err(ConfigurationError::NotAllowedInGroup {
                declaration: "method",
            });
        }

        let name = name.into();
        validate_identifier("method", &name)?;
        if self.methods.contains_key(&name) {
            return Err(ConfigurationError::DuplicateMethod { name });
        }

        self.methods.insert(name, body);
        Ok(self)
    }

    /// Returns the definition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counts steps declared so far, including nested ones.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.fragment.step_count()
    }

    /// Freezes the declarations into a definition.
    #[must_use]
    pub fn finish(self) -> PipelineDefinition<H> {
        PipelineDefinition {
            name: self.name,
            root: self.fragment,
            callbacks: self.callbacks,
            methods: self.methods,
        }
    }

    fn push_group<F>(&mut self, condition: Condition<H>, builder: F) -> Result<&mut Self, ConfigurationError>
    where
        F: FnOnce(&mut Self) -> Result<(), ConfigurationError>,
    {
        let mut nested = Self::nested(&self.name);
        builder(&mut nested)?;

        self.fragment.entries.push(Entry::Group(ConditionGroup {
            condition,
            fragment: nested.fragment,
        }));
        Ok(self)
    }

    fn build_step(target: StepTarget<H>, options: StepOptions<H>) -> Result<StepEntry<H>, ConfigurationError> {
        let step_name = target.display_name().to_string();
        let dispatch = target.into_dispatch()?;

        let StepOptions {
            set,
            when,
            unless,
            prefix,
        } = options;

        let condition = match (when, unless) {
            (Some(_), Some(_)) => return Err(ConfigurationError::conflicting_condition(step_name)),
            (Some(predicate), None) => Some(Condition::when(predicate)),
            (None, Some(predicate)) => Some(Condition::unless(predicate)),
            (None, None) => None,
        };

        if let Some(key) = &set {
            validate_identifier("binding", key)?;
        }

        let prefix = prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        validate_identifier("prefix", &prefix)?;

        Ok(StepEntry {
            dispatch,
            binding: set,
            condition,
            prefix,
        })
    }
}

impl<H> fmt::Debug for StepRegistrar<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistrar")
            .field("name", &self.name)
            .field("steps", &self.step_count())
            .field("nested", &self.nested)
            .finish_non_exhaustive()
    }
}

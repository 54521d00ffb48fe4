//! Callable wrappers that record whether they want the attributes.

use crate::context::{Attributes, Scope};
use crate::errors::SteplineError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type BareFn<H, R> = dyn Fn(&mut Scope<'_, H>) -> Result<R, SteplineError> + Send + Sync;
type AttributesFn<H, R> =
    dyn Fn(&mut Scope<'_, H>, &Attributes) -> Result<R, SteplineError> + Send + Sync;

enum Body<H, R> {
    Bare(Arc<BareFn<H, R>>),
    WithAttributes(Arc<AttributesFn<H, R>>),
}

/// A step body, method or handler.
///
/// Whether the callable receives the attribute bundle is decided once, when it
/// is constructed, and never guessed at call time.
pub struct Callable<H, R = Value> {
    body: Body<H, R>,
}

/// A callable producing a step result.
pub type StepFn<H> = Callable<H, Value>;

impl<H, R> Callable<H, R> {
    /// Creates a callable that only receives the scope.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Scope<'_, H>) -> Result<R, SteplineError> + Send + Sync + 'static,
    {
        Self {
            body: Body::Bare(Arc::new(f)),
        }
    }

    /// Creates a callable that receives the scope and the attributes.
    pub fn with_attributes<F>(f: F) -> Self
    where
        F: Fn(&mut Scope<'_, H>, &Attributes) -> Result<R, SteplineError> + Send + Sync + 'static,
    {
        Self {
            body: Body::WithAttributes(Arc::new(f)),
        }
    }

    /// Returns true if the callable is invoked with the attributes.
    #[must_use]
    pub const fn wants_attributes(&self) -> bool {
        matches!(self.body, Body::WithAttributes(_))
    }

    /// Invokes the callable, passing the attributes only if it asked for them.
    ///
    /// # Errors
    ///
    /// Returns whatever the wrapped function returns.
    pub fn call(&self, scope: &mut Scope<'_, H>, attributes: &Attributes) -> Result<R, SteplineError> {
        match &self.body {
            Body::Bare(f) => f(scope),
            Body::WithAttributes(f) => f(scope, attributes),
        }
    }
}

impl<H, R> Clone for Callable<H, R> {
    fn clone(&self) -> Self {
        let body = match &self.body {
            Body::Bare(f) => Body::Bare(Arc::clone(f)),
            Body::WithAttributes(f) => Body::WithAttributes(Arc::clone(f)),
        };
        Self { body }
    }
}

impl<H, R> fmt::Debug for Callable<H, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("wants_attributes", &self.wants_attributes())
            .finish()
    }
}

/// A boolean callable gating a step or a condition group.
pub struct Predicate<H>(Callable<H, bool>);

impl<H> Predicate<H> {
    /// Creates a predicate over the scope.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Scope<'_, H>) -> bool + Send + Sync + 'static,
    {
        Self(Callable::new(move |scope| Ok(f(scope))))
    }

    /// Creates a predicate over the scope and the attributes.
    pub fn with_attributes<F>(f: F) -> Self
    where
        F: Fn(&Scope<'_, H>, &Attributes) -> bool + Send + Sync + 'static,
    {
        Self(Callable::with_attributes(move |scope, attributes| {
            Ok(f(scope, attributes))
        }))
    }

    /// Wraps a callable that may fail while deciding.
    pub fn fallible(callable: Callable<H, bool>) -> Self {
        Self(callable)
    }

    /// Returns true if the predicate is invoked with the attributes.
    #[must_use]
    pub const fn wants_attributes(&self) -> bool {
        self.0.wants_attributes()
    }

    /// Evaluates the predicate.
    ///
    /// # Errors
    ///
    /// Returns an error raised by a fallible predicate.
    pub fn test(&self, scope: &mut Scope<'_, H>, attributes: &Attributes) -> Result<bool, SteplineError> {
        self.0.call(scope, attributes)
    }
}

impl<H> Clone for Predicate<H> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<H> fmt::Debug for Predicate<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.0).finish()
    }
}

/// A normalized step condition.
///
/// `when` passes the predicate through, `unless` stores its negation.
pub struct Condition<H> {
    predicate: Predicate<H>,
    negated: bool,
}

impl<H> Condition<H> {
    /// Proceeds when the predicate holds.
    #[must_use]
    pub fn when(predicate: Predicate<H>) -> Self {
        Self {
            predicate,
            negated: false,
        }
    }

    /// Proceeds when the predicate does not hold.
    #[must_use]
    pub fn unless(predicate: Predicate<H>) -> Self {
        Self {
            predicate,
            negated: true,
        }
    }

    /// Returns true for an `unless` condition.
    #[must_use]
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    /// Evaluates the condition.
    ///
    /// # Errors
    ///
    /// Returns an error raised by the predicate.
    pub fn evaluate(&self, scope: &mut Scope<'_, H>, attributes: &Attributes) -> Result<bool, SteplineError> {
        Ok(self.predicate.test(scope, attributes)? != self.negated)
    }
}

impl<H> Clone for Condition<H> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            negated: self.negated,
        }
    }
}

impl<H> fmt::Debug for Condition<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("negated", &self.negated)
            .finish_non_exhaustive()
    }
}

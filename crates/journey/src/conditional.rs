//! Conditions used by `cancel_if`, `skip_if` and step run-conditions.
//!
//! A [`Conditional`] wraps one of several condition shapes and evaluates it
//! against a journey every time it is asked. Nothing is cached: predicates
//! observe the journey as it is at the moment of evaluation.

use std::fmt;
use std::sync::Arc;

use stepper_core::{StepperError, StepperResult};

use crate::definition::JourneyMethods;
use crate::types::Journey;

pub type PredicateFn = Arc<dyn Fn(&Journey) -> bool + Send + Sync>;

/// The supported condition shapes.
#[derive(Clone)]
pub enum Condition {
    /// `Some(b)` evaluates to `b`, `None` (nil) to false.
    Literal(Option<bool>),
    /// A zero-argument predicate looked up by name on the journey type.
    Predicate(String),
    Callable(PredicateFn),
    /// Satisfied when every member is.
    All(Vec<Conditional>),
    Nested(Box<Conditional>),
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Condition::Predicate(name) => f.debug_tuple("Predicate").field(name).finish(),
            Condition::Callable(_) => f.write_str("Callable(..)"),
            Condition::All(items) => f.debug_tuple("All").field(items).finish(),
            Condition::Nested(inner) => f.debug_tuple("Nested").field(inner).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conditional {
    condition: Condition,
    negate: bool,
}

impl Conditional {
    /// Wraps a condition, validating its shape.
    pub fn new(condition: Condition, negate: bool) -> StepperResult<Self> {
        let conditional = Self { condition, negate };
        conditional.validate()?;
        Ok(conditional)
    }

    pub fn literal(value: bool) -> Self {
        Self {
            condition: Condition::Literal(Some(value)),
            negate: false,
        }
    }

    pub fn nil() -> Self {
        Self {
            condition: Condition::Literal(None),
            negate: false,
        }
    }

    /// Refers to a predicate by name. An unknown name fails at evaluation
    /// time with `StepperError::UnknownPredicate`.
    pub fn predicate(name: impl Into<String>) -> Self {
        Self {
            condition: Condition::Predicate(name.into()),
            negate: false,
        }
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&Journey) -> bool + Send + Sync + 'static,
    {
        Self {
            condition: Condition::Callable(Arc::new(f)),
            negate: false,
        }
    }

    pub fn all(conditions: impl IntoIterator<Item = Conditional>) -> Self {
        Self {
            condition: Condition::All(conditions.into_iter().collect()),
            negate: false,
        }
    }

    pub fn nested(inner: Conditional) -> Self {
        Self {
            condition: Condition::Nested(Box::new(inner)),
            negate: false,
        }
    }

    /// Same condition with its result flipped.
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Builds a conditional from untyped configuration data: booleans and
    /// null are literals, strings name predicates, arrays are conjunctions.
    pub fn from_value(value: &serde_json::Value) -> StepperResult<Self> {
        use serde_json::Value;

        let conditional = match value {
            Value::Null => Self::nil(),
            Value::Bool(b) => Self::literal(*b),
            Value::String(name) => Self::predicate(name.clone()),
            Value::Array(items) => Self::all(
                items
                    .iter()
                    .map(Self::from_value)
                    .collect::<StepperResult<Vec<_>>>()?,
            ),
            other => {
                return Err(StepperError::InvalidCondition(format!(
                    "condition must be a boolean, null, predicate name or array, but was {other}"
                )))
            }
        };
        conditional.validate()?;
        Ok(conditional)
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn validate(&self) -> StepperResult<()> {
        match &self.condition {
            Condition::Predicate(name) if name.trim().is_empty() => Err(
                StepperError::InvalidCondition("predicate name must not be empty".to_string()),
            ),
            Condition::All(items) => items.iter().try_for_each(Conditional::validate),
            Condition::Nested(inner) => inner.validate(),
            _ => Ok(()),
        }
    }

    pub fn satisfied_by(
        &self,
        journey: &Journey,
        methods: &dyn JourneyMethods,
    ) -> StepperResult<bool> {
        let result = match &self.condition {
            Condition::Literal(value) => value.unwrap_or(false),
            Condition::Predicate(name) => methods.predicate(name, journey).ok_or_else(|| {
                StepperError::UnknownPredicate {
                    journey_type: journey.journey_type.clone(),
                    name: name.clone(),
                }
            })?,
            Condition::Callable(f) => f(journey),
            Condition::All(items) => {
                let mut all = true;
                for item in items {
                    if !item.satisfied_by(journey, methods)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            Condition::Nested(inner) => inner.satisfied_by(journey, methods)?,
        };

        Ok(result != self.negate)
    }
}

impl From<bool> for Conditional {
    fn from(value: bool) -> Self {
        Self::literal(value)
    }
}

impl Default for Conditional {
    fn default() -> Self {
        Self::literal(false)
    }
}

//! Journey types.
//!
//! A [`JourneyDefinition`] is the immutable configuration of one journey
//! type: its ordered steps, the journey-level `cancel_if`/`skip_if`
//! conditions and the stuck-journey policy. Definitions are assembled with a
//! [`JourneyDefinitionBuilder`]; a derived type starts from
//! [`JourneyDefinition::extend`] and inherits everything its parent declared.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use stepper_core::{StepperError, StepperResult};

use crate::conditional::Conditional;
use crate::context::StepContext;
use crate::step::{StepBody, StepDefinition, StepResult, StepSpec};
use crate::types::Journey;

/// Named capabilities of a journey type: step methods, predicates and
/// lifecycle hooks. Every method has a no-op default.
pub trait JourneyMethods: Send + Sync {
    /// Body for a step declared without an inline closure. `None` means the
    /// type has no such method.
    fn perform_step(&self, _name: &str, _ctx: &mut StepContext<'_>) -> Option<StepResult> {
        None
    }

    /// Zero-argument predicate used by named conditions.
    fn predicate(&self, _name: &str, _journey: &Journey) -> Option<bool> {
        None
    }

    /// Called inside the row lock, right after the journey became
    /// `performing`.
    fn after_locking_for_step(&self, _journey: &Journey, _step: Option<&str>) {}

    fn before_step_starts(&self, _journey: &Journey, _step: &str) {}

    /// Called once a perform attempt is over, whatever its outcome.
    fn after_step_completes(&self, _journey: &Journey, _step: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoMethods;

impl JourneyMethods for NoMethods {}

/// Remedy applied by recovery to a journey stuck in `performing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckPolicy {
    #[default]
    Reattempt,
    Cancel,
}

#[derive(Clone)]
pub struct JourneyDefinition {
    name: String,
    steps: Vec<Arc<StepDefinition>>,
    cancel_conditions: Vec<Conditional>,
    skip_conditions: Vec<Conditional>,
    when_stuck: StuckPolicy,
    methods: Arc<dyn JourneyMethods>,
}

impl fmt::Debug for JourneyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JourneyDefinition")
            .field("name", &self.name)
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("cancel_conditions", &self.cancel_conditions.len())
            .field("skip_conditions", &self.skip_conditions.len())
            .field("when_stuck", &self.when_stuck)
            .finish()
    }
}

impl JourneyDefinition {
    pub fn builder(name: impl Into<String>) -> JourneyDefinitionBuilder {
        JourneyDefinitionBuilder {
            name: name.into(),
            inherited: Vec::new(),
            specs: Vec::new(),
            cancel_conditions: Vec::new(),
            skip_conditions: Vec::new(),
            when_stuck: StuckPolicy::default(),
            methods: Arc::new(NoMethods),
        }
    }

    /// Starts a new journey type that inherits the steps, conditions, stuck
    /// policy and methods of this one.
    pub fn extend(&self, name: impl Into<String>) -> JourneyDefinitionBuilder {
        JourneyDefinitionBuilder {
            name: name.into(),
            inherited: self.steps.iter().map(|s| s.as_ref().clone()).collect(),
            specs: Vec::new(),
            cancel_conditions: self.cancel_conditions.clone(),
            skip_conditions: self.skip_conditions.clone(),
            when_stuck: self.when_stuck,
            methods: Arc::clone(&self.methods),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Arc<StepDefinition>] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&Arc<StepDefinition>> {
        self.steps.iter().find(|s| s.name() == name)
    }

    pub fn first_step(&self) -> Option<&Arc<StepDefinition>> {
        self.steps.first()
    }

    pub fn step_after(&self, step: &StepDefinition) -> Option<&Arc<StepDefinition>> {
        self.steps.get(step.seq() + 1)
    }

    pub fn cancel_conditions(&self) -> &[Conditional] {
        &self.cancel_conditions
    }

    pub fn skip_conditions(&self) -> &[Conditional] {
        &self.skip_conditions
    }

    pub fn when_stuck(&self) -> StuckPolicy {
        self.when_stuck
    }

    pub fn methods(&self) -> &dyn JourneyMethods {
        self.methods.as_ref()
    }

    /// Sum of the waits of every step after `step`. With `None`, or a name
    /// that is not part of this type, every step counts.
    pub fn time_remaining_after(&self, step: Option<&str>) -> Duration {
        let after_seq = step.and_then(|name| self.step(name)).map(|s| s.seq());
        self.steps
            .iter()
            .filter(|s| after_seq.map_or(true, |seq| s.seq() > seq))
            .fold(Duration::zero(), |total, s| total + s.wait())
    }
}

pub struct JourneyDefinitionBuilder {
    name: String,
    inherited: Vec<StepDefinition>,
    specs: Vec<StepSpec>,
    cancel_conditions: Vec<Conditional>,
    skip_conditions: Vec<Conditional>,
    when_stuck: StuckPolicy,
    methods: Arc<dyn JourneyMethods>,
}

impl JourneyDefinitionBuilder {
    pub fn step(mut self, spec: StepSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Adds a journey-level cancel condition. Conditions accumulate.
    pub fn cancel_if(mut self, condition: impl Into<Conditional>) -> Self {
        self.cancel_conditions.push(condition.into());
        self
    }

    /// Adds a journey-level skip condition. Conditions accumulate.
    pub fn skip_if(mut self, condition: impl Into<Conditional>) -> Self {
        self.skip_conditions.push(condition.into());
        self
    }

    pub fn when_stuck(mut self, policy: StuckPolicy) -> Self {
        self.when_stuck = policy;
        self
    }

    pub fn methods(mut self, methods: impl JourneyMethods + 'static) -> Self {
        self.methods = Arc::new(methods);
        self
    }

    pub fn shared_methods(mut self, methods: Arc<dyn JourneyMethods>) -> Self {
        self.methods = methods;
        self
    }

    pub fn build(self) -> StepperResult<JourneyDefinition> {
        if self.name.trim().is_empty() {
            return Err(StepperError::StepConfiguration(
                "journey type name must not be empty".to_string(),
            ));
        }

        let mut steps = self.inherited;
        for spec in self.specs {
            let step = resolve_step(&steps, spec)?;
            let index = insertion_point(&steps, &step)?;
            steps.insert(index, step.definition);
        }
        for (seq, step) in steps.iter_mut().enumerate() {
            step.seq = seq;
        }

        for condition in self.cancel_conditions.iter().chain(&self.skip_conditions) {
            condition.validate()?;
        }

        Ok(JourneyDefinition {
            name: self.name,
            steps: steps.into_iter().map(Arc::new).collect(),
            cancel_conditions: self.cancel_conditions,
            skip_conditions: self.skip_conditions,
            when_stuck: self.when_stuck,
            methods: self.methods,
        })
    }
}

struct ResolvedStep {
    definition: StepDefinition,
    before_step: Option<String>,
    after_step: Option<String>,
}

fn resolve_step(existing: &[StepDefinition], spec: StepSpec) -> StepperResult<ResolvedStep> {
    let accumulated = existing
        .iter()
        .fold(Duration::zero(), |total, s| total + s.wait());

    let wait = match (spec.wait, spec.after) {
        (Some(_), Some(_)) => {
            return Err(StepperError::StepConfiguration(
                "Either wait: or after: can be specified, but not both".to_string(),
            ))
        }
        (Some(wait), None) => wait,
        (None, Some(after)) => after - accumulated,
        (None, None) => Duration::zero(),
    };
    if wait < Duration::zero() {
        return Err(StepperError::StepConfiguration(format!(
            "wait: cannot be negative, but computed was {}s",
            wait.num_seconds()
        )));
    }

    let name = spec
        .name
        .clone()
        .unwrap_or_else(|| format!("step_{}", existing.len() + 1));
    if name.trim().is_empty() {
        return Err(StepperError::StepConfiguration(
            "step name must not be empty".to_string(),
        ));
    }
    if existing.iter().any(|s| s.name() == name) {
        return Err(StepperError::StepConfiguration(format!(
            "Step named {name:?} already defined"
        )));
    }

    let skip_if = spec.resolve_skip_if()?;
    skip_if.validate()?;

    let body = match spec.body {
        Some(f) => StepBody::Inline(f),
        None => StepBody::NamedMethod(name.clone()),
    };

    Ok(ResolvedStep {
        definition: StepDefinition {
            name,
            seq: existing.len(),
            wait,
            on_exception: spec.on_exception,
            skip_if,
            body,
        },
        before_step: spec.before_step,
        after_step: spec.after_step,
    })
}

fn insertion_point(existing: &[StepDefinition], step: &ResolvedStep) -> StepperResult<usize> {
    let find = |name: &str, option: &str| {
        existing
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| {
                StepperError::StepConfiguration(format!(
                    "Step named {name:?} not found for {option}"
                ))
            })
    };

    let index = match (&step.before_step, &step.after_step) {
        (Some(_), Some(_)) => {
            return Err(StepperError::StepConfiguration(
                "Either before_step: or after_step: can be specified, but not both".to_string(),
            ))
        }
        (Some(before), None) => find(before, "before_step")?,
        (None, Some(after)) => find(after, "after_step")? + 1,
        (None, None) => existing.len(),
    };
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::OnException;

    fn names(definition: &JourneyDefinition) -> Vec<&str> {
        definition.steps().iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_steps_in_declaration_order() {
        let definition = JourneyDefinition::builder("drip")
            .step(StepSpec::named("a").wait(Duration::hours(10)))
            .step(StepSpec::new().wait(Duration::minutes(5)))
            .step(StepSpec::named("c").on_exception(OnException::Reattempt))
            .build()
            .unwrap();

        assert_eq!(names(&definition), vec!["a", "step_2", "c"]);
        let seqs: Vec<_> = definition.steps().iter().map(|s| s.seq()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(definition.step("c").unwrap().on_exception(), OnException::Reattempt);
        assert!(matches!(
            definition.step("a").unwrap().body(),
            StepBody::NamedMethod(n) if n == "a"
        ));

        let first = definition.first_step().unwrap();
        assert_eq!(definition.step_after(first).unwrap().name(), "step_2");
        assert!(definition.step_after(definition.step("c").unwrap()).is_none());
    }

    #[test]
    fn test_after_is_converted_to_wait() {
        let definition = JourneyDefinition::builder("drip")
            .step(StepSpec::named("a").wait(Duration::days(1)))
            .step(StepSpec::named("b").after(Duration::days(3)))
            .step(StepSpec::named("c").after(Duration::days(3)))
            .build()
            .unwrap();

        assert_eq!(definition.step("b").unwrap().wait(), Duration::days(2));
        assert_eq!(definition.step("c").unwrap().wait(), Duration::zero());

        let negative = JourneyDefinition::builder("drip")
            .step(StepSpec::named("a").wait(Duration::days(2)))
            .step(StepSpec::named("b").after(Duration::days(1)))
            .build();
        assert!(matches!(negative, Err(StepperError::StepConfiguration(_))));
    }

    #[test]
    fn test_configuration_errors() {
        let both = JourneyDefinition::builder("j")
            .step(StepSpec::named("a").wait(Duration::seconds(1)).after(Duration::seconds(2)))
            .build();
        assert!(both.is_err());

        let negative = JourneyDefinition::builder("j")
            .step(StepSpec::named("a").wait(Duration::seconds(-1)))
            .build();
        assert!(negative.is_err());

        let duplicate = JourneyDefinition::builder("j")
            .step(StepSpec::named("a"))
            .step(StepSpec::named("a"))
            .build();
        assert!(duplicate.is_err());

        let bad_condition = JourneyDefinition::builder("j")
            .skip_if(Conditional::predicate(""))
            .build();
        assert!(bad_condition.is_err());
    }

    #[test]
    fn test_relative_insertion() {
        let definition = JourneyDefinition::builder("j")
            .step(StepSpec::named("a"))
            .step(StepSpec::named("c"))
            .step(StepSpec::named("b").before_step("c"))
            .step(StepSpec::named("d").after_step("c"))
            .step(StepSpec::named("start").before_step("a"))
            .build()
            .unwrap();
        assert_eq!(names(&definition), vec!["start", "a", "b", "c", "d"]);
        assert_eq!(definition.step("d").unwrap().seq(), 4);

        let missing = JourneyDefinition::builder("j")
            .step(StepSpec::named("a").after_step("nope"))
            .build()
            .unwrap_err();
        assert!(missing.to_string().contains("\"nope\" not found for after_step"));

        let both = JourneyDefinition::builder("j")
            .step(StepSpec::named("a"))
            .step(StepSpec::named("b").before_step("a").after_step("a"))
            .build();
        assert!(both.is_err());
    }

    #[test]
    fn test_extend_inherits_and_appends() {
        let parent = JourneyDefinition::builder("parent")
            .step(StepSpec::named("a"))
            .cancel_if(false)
            .when_stuck(StuckPolicy::Cancel)
            .build()
            .unwrap();

        let child = parent
            .extend("child")
            .step(StepSpec::named("b"))
            .step(StepSpec::named("pre").before_step("a"))
            .cancel_if(Conditional::predicate("gone"))
            .build()
            .unwrap();

        assert_eq!(names(&parent), vec!["a"]);
        assert_eq!(names(&child), vec!["pre", "a", "b"]);
        assert_eq!(parent.cancel_conditions().len(), 1);
        assert_eq!(child.cancel_conditions().len(), 2);
        assert_eq!(child.when_stuck(), StuckPolicy::Cancel);
    }

    #[test]
    fn test_time_remaining_after() {
        let definition = JourneyDefinition::builder("j")
            .step(StepSpec::named("a").wait(Duration::hours(1)))
            .step(StepSpec::named("b").wait(Duration::hours(2)))
            .step(StepSpec::named("c").wait(Duration::hours(3)))
            .build()
            .unwrap();

        assert_eq!(definition.time_remaining_after(None), Duration::hours(6));
        assert_eq!(definition.time_remaining_after(Some("a")), Duration::hours(5));
        assert_eq!(definition.time_remaining_after(Some("c")), Duration::zero());
    }
}

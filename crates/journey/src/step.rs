//! Step definitions: one immutable stage of a journey type.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stepper_core::{StepperError, StepperResult};

use crate::conditional::Conditional;
use crate::context::StepContext;
use crate::definition::JourneyMethods;
use crate::types::Journey;

/// What a step body returns. Errors are business exceptions and are handled
/// according to the step's [`OnException`] policy.
pub type StepResult = anyhow::Result<Flow>;

pub type StepFn = Arc<dyn Fn(&mut StepContext<'_>) -> StepResult + Send + Sync>;

/// Outcome requested by a step body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The body fell through; advance to the following step.
    Continue,
    Cancel,
    Pause,
    /// Run the same step again after the given wait, or the step's own wait.
    Reattempt(Option<Duration>),
    Skip,
    /// End the journey without running the remaining steps.
    Finish,
}

/// What happens to the journey when a step body returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnException {
    Reattempt,
    Cancel,
    #[default]
    Pause,
    Skip,
    /// Leave the journey `performing` so stuck recovery picks it up.
    None,
}

impl OnException {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnException::Reattempt => "reattempt",
            OnException::Cancel => "cancel",
            OnException::Pause => "pause",
            OnException::Skip => "skip",
            OnException::None => "none",
        }
    }

    /// The flow applied on failure, if any.
    pub fn as_flow(&self) -> Option<Flow> {
        match self {
            OnException::Reattempt => Some(Flow::Reattempt(Option::None)),
            OnException::Cancel => Some(Flow::Cancel),
            OnException::Pause => Some(Flow::Pause),
            OnException::Skip => Some(Flow::Skip),
            OnException::None => Option::None,
        }
    }
}

impl FromStr for OnException {
    type Err = StepperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reattempt" => Ok(OnException::Reattempt),
            "cancel" => Ok(OnException::Cancel),
            "pause" => Ok(OnException::Pause),
            "skip" => Ok(OnException::Skip),
            "none" => Ok(OnException::None),
            other => Err(StepperError::StepConfiguration(format!(
                "on_exception: must be one of reattempt, cancel, pause, skip or none, but was {other:?}"
            ))),
        }
    }
}

impl fmt::Display for OnException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the code for a step lives.
#[derive(Clone)]
pub enum StepBody {
    Inline(StepFn),
    /// Resolved through [`JourneyMethods::perform_step`] at call time.
    NamedMethod(String),
}

impl fmt::Debug for StepBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepBody::Inline(_) => f.write_str("Inline(..)"),
            StepBody::NamedMethod(name) => f.debug_tuple("NamedMethod").field(name).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub(crate) name: String,
    pub(crate) seq: usize,
    pub(crate) wait: Duration,
    pub(crate) on_exception: OnException,
    pub(crate) skip_if: Conditional,
    pub(crate) body: StepBody,
}

impl StepDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero-based position within the journey type.
    pub fn seq(&self) -> usize {
        self.seq
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn on_exception(&self) -> OnException {
        self.on_exception
    }

    pub fn skip_if(&self) -> &Conditional {
        &self.skip_if
    }

    pub fn body(&self) -> &StepBody {
        &self.body
    }

    /// Whether the body should be bypassed for this journey right now.
    pub fn should_skip(
        &self,
        journey: &Journey,
        methods: &dyn JourneyMethods,
    ) -> StepperResult<bool> {
        let skip = self.skip_if.satisfied_by(journey, methods)?;
        if skip {
            debug!(journey_id = %journey.id, step = %self.name, "Step condition not met, skipping body");
        }
        Ok(skip)
    }

    /// Runs the body. A named body without an implementation fails with
    /// [`StepperError::MissingImplementation`].
    pub fn invoke(&self, ctx: &mut StepContext<'_>, methods: &dyn JourneyMethods) -> StepResult {
        match &self.body {
            StepBody::Inline(f) => f(ctx),
            StepBody::NamedMethod(name) => match methods.perform_step(name, ctx) {
                Some(result) => result,
                None => Err(StepperError::MissingImplementation {
                    journey_type: ctx.journey().journey_type.clone(),
                    step: name.clone(),
                }
                .into()),
            },
        }
    }
}

/// Declarative description of a step, turned into a [`StepDefinition`] when
/// the journey definition is built.
#[derive(Clone, Default)]
pub struct StepSpec {
    pub(crate) name: Option<String>,
    pub(crate) wait: Option<Duration>,
    pub(crate) after: Option<Duration>,
    pub(crate) on_exception: OnException,
    pub(crate) skip_if: Option<Conditional>,
    pub(crate) run_if: Option<Conditional>,
    pub(crate) before_step: Option<String>,
    pub(crate) after_step: Option<String>,
    pub(crate) body: Option<StepFn>,
}

impl StepSpec {
    /// An anonymous step; it is named after its position.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Delay relative to the previous step.
    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Delay relative to the start of the journey.
    pub fn after(mut self, after: Duration) -> Self {
        self.after = Some(after);
        self
    }

    pub fn on_exception(mut self, policy: OnException) -> Self {
        self.on_exception = policy;
        self
    }

    pub fn skip_if(mut self, condition: impl Into<Conditional>) -> Self {
        self.skip_if = Some(condition.into());
        self
    }

    /// The body runs only while `condition` holds.
    pub fn run_if(mut self, condition: impl Into<Conditional>) -> Self {
        self.run_if = Some(condition.into());
        self
    }

    pub fn before_step(mut self, name: impl Into<String>) -> Self {
        self.before_step = Some(name.into());
        self
    }

    pub fn after_step(mut self, name: impl Into<String>) -> Self {
        self.after_step = Some(name.into());
        self
    }

    pub fn run<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut StepContext<'_>) -> StepResult + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(f));
        self
    }

    /// Combined skip condition, `run_if` being the negated form.
    pub(crate) fn resolve_skip_if(&self) -> StepperResult<Conditional> {
        match (&self.skip_if, &self.run_if) {
            (Some(_), Some(_)) => Err(StepperError::StepConfiguration(
                "Either skip_if: or run_if: can be specified, but not both".to_string(),
            )),
            (Some(skip_if), None) => Ok(skip_if.clone()),
            (None, Some(run_if)) => Ok(run_if.clone().negated()),
            (None, None) => Ok(Conditional::default()),
        }
    }
}

impl fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("wait", &self.wait)
            .field("after", &self.after)
            .field("on_exception", &self.on_exception)
            .field("inline", &self.body.is_some())
            .finish()
    }
}

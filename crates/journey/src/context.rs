use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use stepper_core::{Clock, HeroRef, StepperResult};

use crate::step::{Flow, StepDefinition, StepResult};
use crate::store::JourneyStore;
use crate::types::Journey;

/// What a step body sees while it runs: a working copy of the journey, the
/// step being performed and the flow-control calls.
///
/// Attribute changes stay local until [`StepContext::save`] is called. A body
/// that returns with unsaved changes fails the step with
/// `StepperError::JourneyNotPersisted`.
pub struct StepContext<'a> {
    journey: Journey,
    saved_attributes: Map<String, Value>,
    step: &'a StepDefinition,
    store: &'a dyn JourneyStore,
    clock: &'a dyn Clock,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        journey: Journey,
        step: &'a StepDefinition,
        store: &'a dyn JourneyStore,
        clock: &'a dyn Clock,
    ) -> Self {
        let saved_attributes = journey.attributes.clone();
        Self {
            journey,
            saved_attributes,
            step,
            store,
            clock,
        }
    }

    pub fn journey(&self) -> &Journey {
        &self.journey
    }

    pub fn hero(&self) -> Option<&HeroRef> {
        self.journey.hero.as_ref()
    }

    pub fn step(&self) -> &StepDefinition {
        self.step
    }

    pub fn step_name(&self) -> &str {
        self.step.name()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.journey.attributes.get(key)
    }

    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.journey.attributes
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.journey.attributes.insert(key.into(), value.into());
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.journey.attributes.remove(key)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.journey.attributes != self.saved_attributes
    }

    /// Persists the working attributes. Only the attributes and `updated_at`
    /// are written; the engine owns every other column.
    pub fn save(&mut self) -> StepperResult<()> {
        let now = self.clock.now();
        let attributes = self.journey.attributes.clone();
        let saved = self.store.with_lock(self.journey.id, &mut |row| {
            row.attributes = attributes.clone();
            row.updated_at = now;
            Ok(())
        })?;
        self.saved_attributes = saved.attributes.clone();
        self.journey.updated_at = saved.updated_at;
        self.journey.state = saved.state;
        Ok(())
    }

    pub fn cancel(&self) -> StepResult {
        Ok(Flow::Cancel)
    }

    pub fn pause(&self) -> StepResult {
        Ok(Flow::Pause)
    }

    pub fn skip(&self) -> StepResult {
        Ok(Flow::Skip)
    }

    pub fn finish(&self) -> StepResult {
        Ok(Flow::Finish)
    }

    /// Runs this step again after the step's configured wait.
    pub fn reattempt(&self) -> StepResult {
        Ok(Flow::Reattempt(None))
    }

    pub fn reattempt_in(&self, wait: Duration) -> StepResult {
        Ok(Flow::Reattempt(Some(wait)))
    }

    pub(crate) fn discard_changes(&mut self) {
        self.journey.attributes = self.saved_attributes.clone();
    }
}

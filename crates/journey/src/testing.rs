//! Helpers for exercising journeys in tests without a queue.

use chrono::Duration;
use uuid::Uuid;

use stepper_core::{Clock, FakeClock, StepperError, StepperResult};

use crate::engine::JourneyEngine;
use crate::types::Journey;

/// Upper bound on the number of perform attempts in [`speedrun_journey`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaximumSteps {
    /// Ten attempts per step of the journey type.
    #[default]
    Reasonable,
    Unlimited,
    Exactly(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedrunOptions {
    /// Move the clock to each step's due time. When false the due time is
    /// pulled back to now instead.
    pub time_travel: bool,
    pub maximum_steps: MaximumSteps,
}

impl Default for SpeedrunOptions {
    fn default() -> Self {
        Self {
            time_travel: true,
            maximum_steps: MaximumSteps::default(),
        }
    }
}

/// Performs the journey's steps one after another until it is finished or
/// canceled. Fails if it is still active after the allowed number of attempts.
pub fn speedrun_journey(
    engine: &JourneyEngine,
    clock: &FakeClock,
    id: Uuid,
    options: SpeedrunOptions,
) -> StepperResult<Journey> {
    let mut journey = engine.fetch(id)?;
    let definition = engine.definition_for(&journey)?;
    let attempts = match options.maximum_steps {
        MaximumSteps::Reasonable => definition.steps().len() * 10,
        MaximumSteps::Unlimited => 0xFFFF,
        MaximumSteps::Exactly(n) => n,
    };

    for _ in 0..attempts {
        if journey.state.is_terminal() {
            break;
        }
        if options.time_travel {
            if let Some(due) = journey.next_step_to_be_performed_at {
                let target = due + Duration::seconds(1);
                if target > clock.now() {
                    clock.set(target);
                }
            }
        } else {
            engine.update(id, |row, now| {
                row.next_step_to_be_performed_at = Some(now);
                Ok(())
            })?;
        }
        journey = engine.perform_next_step(id, None)?;
    }

    let journey = engine.fetch(id)?;
    if journey.state.is_terminal() {
        Ok(journey)
    } else {
        Err(StepperError::InvalidState(format!(
            "journey {id} did not finish or cancel after performing {attempts} steps, it is {}",
            journey.state
        )))
    }
}

/// Points the journey at `step_name`, due now, and performs it.
pub fn immediately_perform_single_step(
    engine: &JourneyEngine,
    id: Uuid,
    step_name: &str,
) -> StepperResult<Journey> {
    engine.update(id, |row, now| {
        row.next_step_name = Some(step_name.to_string());
        row.next_step_to_be_performed_at = Some(now);
        Ok(())
    })?;
    engine.perform_next_step(id, None)
}

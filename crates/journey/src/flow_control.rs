//! Flow control from outside a step body.
//!
//! Inside a body the same outcomes are requested by returning a [`Flow`]
//! (see [`StepContext`]); these methods act on a journey that no step is
//! currently running for, or that a worker is running right now. In the
//! latter case the worker notices at completion that the journey is no
//! longer `performing` and leaves it alone.
//!
//! [`Flow`]: crate::step::Flow
//! [`StepContext`]: crate::context::StepContext

use tracing::info;
use uuid::Uuid;

use stepper_core::{JourneyEventType, StepperError, StepperResult};

use crate::engine::{advance_past_current, JourneyEngine};
use crate::types::{generate_idempotency_key, Journey, JourneyState};

fn invalid(action: &str, expected: &str, row: &Journey) -> StepperError {
    StepperError::InvalidState(format!(
        "cannot {action} journey {}: it must be {expected}, but was {}",
        row.id, row.state
    ))
}

impl JourneyEngine {
    pub fn cancel(&self, id: Uuid) -> StepperResult<Journey> {
        let (journey, changed) = self.update(id, |row, _| match row.state {
            JourneyState::Canceled => Ok(false),
            JourneyState::Finished => Err(invalid("cancel", "active", row)),
            _ => {
                row.state = JourneyState::Canceled;
                Ok(true)
            }
        })?;
        if changed {
            info!(journey_id = %id, "Canceled journey");
            self.emit(JourneyEventType::Canceled, &journey, None);
        }
        Ok(journey)
    }

    /// Suspends a `ready` or `performing` journey. Wake-ups are ignored
    /// until [`JourneyEngine::resume`].
    pub fn pause(&self, id: Uuid) -> StepperResult<Journey> {
        let (journey, changed) = self.update(id, |row, _| match row.state {
            JourneyState::Paused => Ok(false),
            JourneyState::Ready | JourneyState::Performing => {
                row.state = JourneyState::Paused;
                Ok(true)
            }
            _ => Err(invalid("pause", "ready or performing", row)),
        })?;
        if changed {
            info!(journey_id = %id, "Paused journey");
            self.emit(JourneyEventType::Paused, &journey, None);
        }
        Ok(journey)
    }

    /// Makes a paused journey `ready` again with a fresh idempotency key and
    /// schedules its next step. Tasks enqueued before the pause become stale.
    pub fn resume(&self, id: Uuid) -> StepperResult<Journey> {
        let (journey, _) = self.update(id, |row, _| {
            if !row.is_paused() {
                return Err(invalid("resume", "paused", row));
            }
            row.state = JourneyState::Ready;
            row.idempotency_key = Some(generate_idempotency_key());
            Ok(())
        })?;
        info!(journey_id = %id, step = ?journey.next_step_name, "Resumed journey");
        self.emit(JourneyEventType::Resumed, &journey, journey.next_step_name.as_deref());
        self.after_transition(&journey)?;
        Ok(journey)
    }

    /// Skips the scheduled step of a `ready` journey without running it,
    /// moving on to the following step or finishing.
    pub fn skip(&self, id: Uuid) -> StepperResult<Journey> {
        let snapshot = self.fetch(id)?;
        let definition = self.definition_for(&snapshot)?;

        let (journey, skipped) = self.update(id, |row, now| {
            if !row.is_ready() {
                return Err(invalid("skip", "ready", row));
            }
            let skipped = row.next_step_name.clone();
            advance_past_current(row, &definition, now);
            Ok(skipped)
        })?;
        info!(
            journey_id = %id,
            skipped = ?skipped,
            next = ?journey.next_step_name,
            "Skipped step"
        );
        self.emit(JourneyEventType::StepSkipped, &journey, skipped.as_deref());
        self.emit_state(&journey, skipped.as_deref());
        self.after_transition(&journey)?;
        Ok(journey)
    }
}

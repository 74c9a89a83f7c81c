//! Repair of journeys left in `performing` by a worker that died mid-step.

use chrono::Duration;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use stepper_core::{JourneyEventType, StepperResult};

use crate::definition::StuckPolicy;
use crate::engine::{assign_next_step, mark_finished, JourneyEngine};
use crate::types::{Journey, JourneyState};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub recovered: usize,
    pub failed: usize,
}

impl JourneyEngine {
    /// Applies the journey type's stuck policy to one journey. Does nothing
    /// unless the journey is still `performing` once locked.
    pub fn recover(&self, id: Uuid) -> StepperResult<Journey> {
        let snapshot = self.fetch(id)?;
        let definition = self.definition_for(&snapshot)?;
        let policy = definition.when_stuck();

        let (journey, recovered) = self.update(id, |row, now| {
            if !row.is_performing() {
                return Ok(false);
            }
            match policy {
                StuckPolicy::Cancel => row.state = JourneyState::Canceled,
                StuckPolicy::Reattempt => {
                    let Some(name) = row.next_step_name.clone() else {
                        mark_finished(row);
                        return Ok(true);
                    };
                    match definition.step(&name).cloned() {
                        Some(step) => assign_next_step(row, &step, Duration::zero(), now),
                        None => {
                            warn!(journey_id = %row.id, step = %name, "No definition for stuck step, pausing journey");
                            row.state = JourneyState::Paused;
                        }
                    }
                }
            }
            Ok(true)
        })?;

        if recovered {
            metrics::counter!("stepper.journeys.recovered").increment(1);
            info!(
                journey_id = %id,
                policy = ?policy,
                state = %journey.state,
                "Recovered stuck journey"
            );
            self.emit(
                JourneyEventType::Recovered,
                &journey,
                journey.next_step_name.as_deref(),
            );
            self.after_transition(&journey)?;
        }
        Ok(journey)
    }

    /// Recovers every journey that has been `performing` for longer than
    /// `stuck_for`. A failure on one journey does not stop the others.
    pub fn recover_stuck_journeys(&self, stuck_for: Duration) -> StepperResult<RecoveryReport> {
        let cutoff = self.clock().now() - stuck_for;
        let stuck = self.store().stuck_since(cutoff)?;

        let mut report = RecoveryReport::default();
        for journey in stuck {
            match self.recover(journey.id) {
                Ok(_) => report.recovered += 1,
                Err(e) => {
                    error!(journey_id = %journey.id, error = %e, "Failed to recover stuck journey");
                    report.failed += 1;
                }
            }
        }
        if report.recovered > 0 || report.failed > 0 {
            info!(recovered = report.recovered, failed = report.failed, "Stuck journey recovery done");
        }
        Ok(report)
    }
}

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info};

use stepper_core::config::{HousekeepingConfig, RecoveryConfig};
use stepper_core::{JourneyEventType, StepperError, StepperResult};

use crate::engine::JourneyEngine;
use crate::recovery::RecoveryReport;

/// Periodic maintenance settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HousekeepingPolicy {
    pub stuck_after: Duration,
    /// `None` keeps completed journeys forever.
    pub delete_completed_after: Option<Duration>,
}

impl HousekeepingPolicy {
    pub fn from_config(
        recovery: &RecoveryConfig,
        housekeeping: &HousekeepingConfig,
    ) -> StepperResult<Self> {
        Ok(Self {
            stuck_after: recovery
                .stuck_after()
                .map_err(|e| StepperError::Config(e.to_string()))?,
            delete_completed_after: housekeeping
                .delete_completed_after()
                .map_err(|e| StepperError::Config(e.to_string()))?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HousekeepingReport {
    pub recovery: RecoveryReport,
    pub deleted: usize,
}

impl JourneyEngine {
    /// Deletes `finished` and `canceled` journeys last updated more than
    /// `completed_for` ago. `None` disables the cleanup.
    pub fn delete_completed_journeys(&self, completed_for: Option<Duration>) -> StepperResult<usize> {
        let Some(completed_for) = completed_for else {
            debug!("Completed journey cleanup is disabled");
            return Ok(0);
        };

        let cutoff = self.clock().now() - completed_for;
        let completed = self.store().terminal_updated_before(cutoff)?;
        if completed.is_empty() {
            return Ok(0);
        }

        let ids: Vec<_> = completed.iter().map(|j| j.id).collect();
        let deleted = self.store().delete(&ids)?;
        metrics::counter!("stepper.journeys.deleted").increment(deleted as u64);
        info!(deleted, cutoff = %cutoff, "Deleted completed journeys");
        for journey in &completed {
            self.emit(JourneyEventType::Deleted, journey, None);
        }
        Ok(deleted)
    }

    /// Stuck-journey recovery followed by cleanup of completed journeys.
    pub fn run_housekeeping(&self, policy: &HousekeepingPolicy) -> StepperResult<HousekeepingReport> {
        let recovery = self.recover_stuck_journeys(policy.stuck_after)?;
        let deleted = self.delete_completed_journeys(policy.delete_completed_after)?;
        Ok(HousekeepingReport { recovery, deleted })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stepper_core::event_bus::capture_sink;
    use stepper_core::FakeClock;

    use super::*;
    use crate::definition::JourneyDefinition;
    use crate::queue::InMemoryTaskQueue;
    use crate::scheduler::ForwardScheduler;
    use crate::store::InMemoryJourneyStore;
    use crate::types::NewJourney;

    #[test]
    fn test_deletes_only_old_completed_journeys() {
        let clock = Arc::new(FakeClock::starting_now());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let scheduler = Arc::new(ForwardScheduler::new(queue, clock.clone()));
        let sink = capture_sink();
        let engine = JourneyEngine::new(Arc::new(InMemoryJourneyStore::new()), scheduler)
            .with_clock(clock.clone())
            .with_event_sink(sink.clone());
        engine
            .register(JourneyDefinition::builder("empty").build().unwrap())
            .unwrap();

        let old = engine.create("empty", NewJourney::default()).unwrap();
        clock.advance(Duration::days(20));
        let recent = engine.create("empty", NewJourney::default()).unwrap();
        clock.advance(Duration::days(15));

        assert_eq!(engine.delete_completed_journeys(None).unwrap(), 0);

        let policy = HousekeepingPolicy {
            stuck_after: Duration::days(2),
            delete_completed_after: Some(Duration::days(30)),
        };
        let report = engine.run_housekeeping(&policy).unwrap();
        assert_eq!(report.deleted, 1);
        assert!(engine.find(old.id).unwrap().is_none());
        assert!(engine.find(recent.id).unwrap().is_some());
        assert_eq!(sink.count_type(JourneyEventType::Deleted), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = HousekeepingPolicy::from_config(
            &RecoveryConfig::default(),
            &HousekeepingConfig {
                delete_completed_after_secs: 0,
                ..HousekeepingConfig::default()
            },
        )
        .unwrap();
        assert_eq!(policy.stuck_after, Duration::days(2));
        assert_eq!(policy.delete_completed_after, None);

        let overflowing = RecoveryConfig {
            stuck_after_secs: u64::MAX,
            ..RecoveryConfig::default()
        };
        assert!(matches!(
            HousekeepingPolicy::from_config(&overflowing, &HousekeepingConfig::default()),
            Err(StepperError::Config(_))
        ));
    }
}

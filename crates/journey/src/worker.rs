use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::JourneyEngine;
use crate::queue::InMemoryTaskQueue;

/// Pulls due perform-step tasks off an [`InMemoryTaskQueue`] and hands them
/// to the engine. Several workers may share one queue.
#[derive(Debug, Clone)]
pub struct Worker {
    engine: JourneyEngine,
    queue: Arc<InMemoryTaskQueue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// Tasks handed to the engine, including ones that turned out stale.
    pub processed: usize,
    /// Tasks whose journey no longer exists.
    pub dropped: usize,
    pub failed: usize,
}

impl WorkerReport {
    fn merge(&mut self, other: &WorkerReport) {
        self.processed += other.processed;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }
}

impl Worker {
    pub fn new(engine: JourneyEngine, queue: Arc<InMemoryTaskQueue>) -> Self {
        Self { engine, queue }
    }

    pub fn engine(&self) -> &JourneyEngine {
        &self.engine
    }

    /// Performs every task whose `run_at` has passed.
    pub fn run_due(&self) -> WorkerReport {
        let now = self.engine.clock().now();
        let mut report = WorkerReport::default();

        for scheduled in self.queue.take_due(now) {
            let task = &scheduled.task;
            match self.engine.perform_task(task) {
                Ok(Some(journey)) => {
                    debug!(journey_id = %task.journey_id, state = %journey.state, "Processed task");
                    report.processed += 1;
                }
                Ok(None) => report.dropped += 1,
                Err(e) => {
                    warn!(
                        journey_id = %task.journey_id,
                        journey_type = %task.journey_type,
                        error = %e,
                        "Perform-step task failed"
                    );
                    report.processed += 1;
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Runs rounds of [`Worker::run_due`] until one finds nothing to do, at
    /// most `max_rounds` times. Steps without a wait run back to back.
    pub fn drain(&self, max_rounds: usize) -> WorkerReport {
        let mut total = WorkerReport::default();
        for _ in 0..max_rounds {
            let round = self.run_due();
            if round == WorkerReport::default() {
                break;
            }
            total.merge(&round);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::JourneyDefinition;
    use crate::scheduler::ForwardScheduler;
    use crate::step::StepSpec;
    use crate::store::InMemoryJourneyStore;
    use crate::types::NewJourney;
    use chrono::Duration;
    use stepper_core::FakeClock;

    #[test]
    fn test_drain_runs_immediate_steps() {
        let clock = Arc::new(FakeClock::starting_now());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let scheduler = Arc::new(ForwardScheduler::new(queue.clone(), clock.clone()));
        let engine = JourneyEngine::new(Arc::new(InMemoryJourneyStore::new()), scheduler)
            .with_clock(clock.clone());
        engine
            .register(
                JourneyDefinition::builder("quick")
                    .step(StepSpec::named("a").run(|ctx| ctx.skip()))
                    .step(StepSpec::named("b").run(|ctx| ctx.skip()))
                    .step(StepSpec::named("c").wait(Duration::hours(1)).run(|ctx| ctx.skip()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let journey = engine.create("quick", NewJourney::default()).unwrap();

        let worker = Worker::new(engine.clone(), queue.clone());
        let report = worker.drain(10);
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 0);

        let journey = engine.find(journey.id).unwrap().unwrap();
        assert_eq!(journey.next_step_name.as_deref(), Some("c"));
        assert_eq!(queue.len(), 1);

        clock.advance(Duration::hours(1));
        assert_eq!(worker.run_due().processed, 1);
        assert!(engine.find(journey.id).unwrap().unwrap().is_finished());
    }
}

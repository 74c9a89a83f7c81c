//! Scheduling strategies: how a journey's next wake-up reaches the task queue.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use stepper_core::{Clock, StepperError, StepperResult};

use crate::queue::TaskQueue;
use crate::store::JourneyStore;
use crate::types::Journey;

pub trait Scheduler: Send + Sync {
    /// Makes sure a wake-up for the journey's next step is delivered no
    /// earlier than, and close to, `next_step_to_be_performed_at`.
    fn schedule(&self, journey: &Journey) -> StepperResult<()>;
}

/// Enqueues one task per call, delayed until the step is due.
pub struct ForwardScheduler {
    queue: Arc<dyn TaskQueue>,
    clock: Arc<dyn Clock>,
}

impl ForwardScheduler {
    pub fn new(queue: Arc<dyn TaskQueue>, clock: Arc<dyn Clock>) -> Self {
        Self { queue, clock }
    }
}

impl Scheduler for ForwardScheduler {
    fn schedule(&self, journey: &Journey) -> StepperResult<()> {
        let now = self.clock.now();
        let run_at = journey
            .next_step_to_be_performed_at
            .map_or(now, |due| due.max(now));

        self.queue.enqueue(journey.perform_step_task(), run_at)?;
        metrics::counter!("stepper.tasks.enqueued").increment(1);
        debug!(
            journey_id = %journey.id,
            step = ?journey.next_step_name,
            run_at = %run_at,
            "Enqueued perform-step task"
        );
        Ok(())
    }
}

/// Only enqueues tasks due within the next cycle; a periodic call to
/// [`CyclicScheduler::run_scheduling_cycle`] picks up everything else.
pub struct CyclicScheduler {
    forward: ForwardScheduler,
    store: Arc<dyn JourneyStore>,
    cycle_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl CyclicScheduler {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn JourneyStore>,
        cycle_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> StepperResult<Self> {
        if cycle_duration <= Duration::zero() {
            return Err(StepperError::Config(
                "cycle_duration must be positive".to_string(),
            ));
        }
        Ok(Self {
            forward: ForwardScheduler::new(queue, Arc::clone(&clock)),
            store,
            cycle_duration,
            clock,
        })
    }

    pub fn cycle_duration(&self) -> Duration {
        self.cycle_duration
    }

    /// Enqueues every `ready` journey due before the end of the coming
    /// cycle, including ones already overdue. Returns how many were enqueued.
    pub fn run_scheduling_cycle(&self) -> StepperResult<usize> {
        let horizon = self.clock.now() + self.cycle_duration;
        let due = self.store.ready_due_before(horizon)?;
        for journey in &due {
            self.forward.schedule(journey)?;
        }
        info!(enqueued = due.len(), "Scheduling cycle complete");
        Ok(due.len())
    }
}

impl Scheduler for CyclicScheduler {
    fn schedule(&self, journey: &Journey) -> StepperResult<()> {
        let now = self.clock.now();
        let within_cycle = journey
            .next_step_to_be_performed_at
            .map_or(true, |due| due - now <= self.cycle_duration);

        if within_cycle {
            self.forward.schedule(journey)
        } else {
            debug!(journey_id = %journey.id, "Deferring to a later scheduling cycle");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryTaskQueue;
    use crate::store::InMemoryJourneyStore;
    use crate::types::NewJourney;
    use stepper_core::FakeClock;

    fn due_in(clock: &FakeClock, wait: Duration) -> Journey {
        let mut journey = Journey::new("drip", NewJourney::default(), clock.now());
        journey.next_step_name = Some("a".into());
        journey.next_step_to_be_performed_at = Some(clock.now() + wait);
        journey.idempotency_key = Some("key".into());
        journey
    }

    #[test]
    fn test_forward_clamps_to_now() {
        let clock = Arc::new(FakeClock::starting_now());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let scheduler = ForwardScheduler::new(queue.clone(), clock.clone());

        let overdue = due_in(&clock, Duration::hours(-1));
        scheduler.schedule(&overdue).unwrap();
        let later = due_in(&clock, Duration::hours(2));
        scheduler.schedule(&later).unwrap();

        let pending = queue.pending();
        assert_eq!(pending[0].run_at, clock.now());
        assert_eq!(pending[1].run_at, clock.now() + Duration::hours(2));
        assert_eq!(pending[1].task.idempotency_key.as_deref(), Some("key"));
    }

    #[test]
    fn test_cyclic_only_enqueues_within_cycle() {
        let clock = Arc::new(FakeClock::starting_now());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let store = Arc::new(InMemoryJourneyStore::new());
        let scheduler =
            CyclicScheduler::new(queue.clone(), store, Duration::seconds(30), clock.clone())
                .unwrap();

        scheduler.schedule(&due_in(&clock, Duration::seconds(40))).unwrap();
        assert!(queue.is_empty());
        scheduler.schedule(&due_in(&clock, Duration::seconds(20))).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_cycle_scans_store() {
        let clock = Arc::new(FakeClock::starting_now());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let store = Arc::new(InMemoryJourneyStore::new());
        let scheduler = CyclicScheduler::new(
            queue.clone(),
            store.clone(),
            Duration::seconds(30),
            clock.clone(),
        )
        .unwrap();

        let overdue = due_in(&clock, Duration::minutes(-10));
        let soon = due_in(&clock, Duration::seconds(20));
        let later = due_in(&clock, Duration::seconds(40));
        for journey in [&overdue, &soon, &later] {
            store.insert(journey).unwrap();
        }

        assert_eq!(scheduler.run_scheduling_cycle().unwrap(), 2);
        let ids: Vec<_> = queue.pending().iter().map(|t| t.task.journey_id).collect();
        assert_eq!(ids, vec![overdue.id, soon.id]);
    }

    #[test]
    fn test_zero_cycle_is_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::starting_now());
        let result = CyclicScheduler::new(
            Arc::new(InMemoryTaskQueue::new()),
            Arc::new(InMemoryJourneyStore::new()),
            Duration::zero(),
            clock,
        );
        assert!(result.is_err());
    }
}

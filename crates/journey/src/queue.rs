use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use stepper_core::StepperResult;

use crate::types::PerformStepTask;

/// The external task queue: delivers each task at least once, no earlier
/// than `run_at`.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: PerformStepTask, run_at: DateTime<Utc>) -> StepperResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub task: PerformStepTask,
    pub run_at: DateTime<Utc>,
}

/// Process-local queue. Tasks are handed out once their `run_at` has passed.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Pending tasks ordered by `run_at`, in enqueue order for equal times.
    pub fn pending(&self) -> Vec<ScheduledTask> {
        let mut tasks = self.tasks.lock().clone();
        tasks.sort_by_key(|t| t.run_at);
        tasks
    }

    /// Removes and returns every task due at `now`, earliest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut tasks = self.tasks.lock();
        let (mut due, waiting): (Vec<_>, Vec<_>) =
            tasks.drain(..).partition(|t| t.run_at <= now);
        *tasks = waiting;
        due.sort_by_key(|t| t.run_at);
        due
    }

    pub fn tasks_for(&self, journey_id: Uuid) -> Vec<ScheduledTask> {
        self.pending()
            .into_iter()
            .filter(|t| t.task.journey_id == journey_id)
            .collect()
    }

    pub fn clear(&self) {
        self.tasks.lock().clear();
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn enqueue(&self, task: PerformStepTask, run_at: DateTime<Utc>) -> StepperResult<()> {
        self.tasks.lock().push(ScheduledTask { task, run_at });
        Ok(())
    }
}

//! Shared fixtures for the journey scenario tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;

use stepper_core::event_bus::{capture_sink, CaptureSink};
use stepper_core::{Clock, FakeClock};
use stepper_journey::{
    CyclicScheduler, ForwardScheduler, InMemoryJourneyStore, InMemoryTaskQueue, JourneyEngine,
    Worker, WorkerReport,
};

pub struct Harness {
    pub engine: JourneyEngine,
    pub queue: Arc<InMemoryTaskQueue>,
    pub store: Arc<InMemoryJourneyStore>,
    pub clock: Arc<FakeClock>,
    pub sink: Arc<CaptureSink>,
}

impl Harness {
    /// Engine with a forward scheduler.
    pub fn new() -> Self {
        let clock = Arc::new(FakeClock::starting_now());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let scheduler = Arc::new(ForwardScheduler::new(queue.clone(), clock.clone()));
        Self::assemble(scheduler, queue, Arc::new(InMemoryJourneyStore::new()), clock)
    }

    /// Engine with a cyclic scheduler; the scheduler is returned so tests can
    /// run cycles.
    pub fn cyclic(cycle: Duration) -> (Self, Arc<CyclicScheduler>) {
        let clock = Arc::new(FakeClock::starting_now());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let store = Arc::new(InMemoryJourneyStore::new());
        let scheduler = Arc::new(
            CyclicScheduler::new(queue.clone(), store.clone(), cycle, clock.clone()).unwrap(),
        );
        let harness = Self::assemble(scheduler.clone(), queue, store, clock);
        (harness, scheduler)
    }

    fn assemble(
        scheduler: Arc<dyn stepper_journey::Scheduler>,
        queue: Arc<InMemoryTaskQueue>,
        store: Arc<InMemoryJourneyStore>,
        clock: Arc<FakeClock>,
    ) -> Self {
        let sink = capture_sink();
        let engine = JourneyEngine::new(store.clone(), scheduler)
            .with_clock(clock.clone())
            .with_event_sink(sink.clone());
        Self {
            engine,
            queue,
            store,
            clock,
            sink,
        }
    }

    pub fn worker(&self) -> Worker {
        Worker::new(self.engine.clone(), self.queue.clone())
    }

    pub fn run_due(&self) -> WorkerReport {
        self.worker().run_due()
    }

    pub fn drain(&self) -> WorkerReport {
        self.worker().drain(32)
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

/// Records side effects performed by step bodies and hooks.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

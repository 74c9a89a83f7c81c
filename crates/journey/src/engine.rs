use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use stepper_core::event_bus::{journey_event, noop_sink, EventSink};
use stepper_core::{Clock, JourneyEventType, StepperError, StepperResult, SystemClock};

use crate::context::StepContext;
use crate::definition::JourneyDefinition;
use crate::scheduler::Scheduler;
use crate::step::{Flow, StepDefinition};
use crate::store::{locked, JourneyStore};
use crate::types::{generate_idempotency_key, Journey, JourneyState, NewJourney, PerformStepTask};

/// Drives journeys through their steps.
///
/// The engine owns the registry of journey types and is the only writer of
/// journey state. Every decision to run a step is taken under the journey's
/// row lock, which makes duplicate and concurrent wake-ups harmless.
#[derive(Clone)]
pub struct JourneyEngine {
    definitions: Arc<DashMap<String, Arc<JourneyDefinition>>>,
    store: Arc<dyn JourneyStore>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for JourneyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JourneyEngine")
            .field("definitions", &self.definitions.len())
            .finish()
    }
}

impl JourneyEngine {
    pub fn new(store: Arc<dyn JourneyStore>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            definitions: Arc::new(DashMap::new()),
            store,
            scheduler,
            clock: Arc::new(SystemClock),
            event_sink: noop_sink(),
        }
    }

    /// Use a different time source. The scheduler should share it.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach an event sink for journey lifecycle events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn register(&self, definition: JourneyDefinition) -> StepperResult<()> {
        match self.definitions.entry(definition.name().to_string()) {
            Entry::Occupied(existing) => {
                Err(StepperError::DuplicateJourneyType(existing.key().clone()))
            }
            Entry::Vacant(vacant) => {
                info!(
                    journey_type = %definition.name(),
                    steps = definition.steps().len(),
                    "Registered journey type"
                );
                vacant.insert(Arc::new(definition));
                Ok(())
            }
        }
    }

    pub fn definition(&self, journey_type: &str) -> Option<Arc<JourneyDefinition>> {
        self.definitions.get(journey_type).map(|d| Arc::clone(d.value()))
    }

    pub(crate) fn definition_for(&self, journey: &Journey) -> StepperResult<Arc<JourneyDefinition>> {
        self.definition(&journey.journey_type)
            .ok_or_else(|| StepperError::UnknownJourneyType(journey.journey_type.clone()))
    }

    pub fn find(&self, id: Uuid) -> StepperResult<Option<Journey>> {
        self.store.find(&id)
    }

    pub(crate) fn fetch(&self, id: Uuid) -> StepperResult<Journey> {
        self.store.find(&id)?.ok_or(StepperError::JourneyNotFound(id))
    }

    pub fn store(&self) -> &Arc<dyn JourneyStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Begins a journey. The first step is scheduled right away; a journey
    /// type without steps is finished on creation.
    pub fn create(&self, journey_type: &str, params: NewJourney) -> StepperResult<Journey> {
        let definition = self
            .definition(journey_type)
            .ok_or_else(|| StepperError::UnknownJourneyType(journey_type.to_string()))?;

        let now = self.clock.now();
        let mut journey = Journey::new(journey_type, params, now);
        match definition.first_step() {
            Some(step) => assign_next_step(&mut journey, step, step.wait(), now),
            None => mark_finished(&mut journey),
        }

        self.store.insert(&journey)?;
        info!(
            journey_id = %journey.id,
            journey_type = %journey.journey_type,
            hero = ?journey.hero,
            "Created journey"
        );
        self.emit(JourneyEventType::Created, &journey, None);

        if journey.is_ready() {
            self.scheduler.schedule(&journey)?;
        } else {
            self.emit(JourneyEventType::Finished, &journey, None);
        }
        Ok(journey)
    }

    /// Entry point for queue wake-ups. See [`JourneyEngine::perform_next_step`].
    /// A journey that no longer exists is not an error.
    pub fn perform_task(&self, task: &PerformStepTask) -> StepperResult<Option<Journey>> {
        match self.perform_next_step(task.journey_id, task.idempotency_key.as_deref()) {
            Err(StepperError::JourneyNotFound(id)) => {
                debug!(journey_id = %id, "Journey is gone, dropping task");
                Ok(None)
            }
            other => other.map(Some),
        }
    }

    /// Performs the journey's next step if, under the row lock, the journey
    /// is still `ready`, still points at the same step and `idempotency_key`
    /// (when given) still matches. Otherwise returns the journey untouched.
    ///
    /// Errors from the step body are returned after the journey's new state
    /// has been written, wrapped in [`StepperError::StepFailed`].
    pub fn perform_next_step(
        &self,
        id: Uuid,
        idempotency_key: Option<&str>,
    ) -> StepperResult<Journey> {
        let snapshot = self.fetch(id)?;
        let expected_step = snapshot.next_step_name.clone();
        let definition = self.definition_for(&snapshot)?;
        let methods = definition.methods();

        let (journey, acquired) = self.update(id, |row, _| {
            if !row.is_ready() || row.next_step_name != expected_step {
                return Ok(false);
            }
            if let Some(key) = idempotency_key {
                if row.idempotency_key.as_deref() != Some(key) {
                    return Ok(false);
                }
            }
            row.state = JourneyState::Performing;
            methods.after_locking_for_step(row, row.next_step_name.as_deref());
            Ok(true)
        })?;

        if !acquired {
            debug!(
                journey_id = %id,
                state = %journey.state,
                step = ?journey.next_step_name,
                "Journey already moved on, skipping wake-up"
            );
            return Ok(journey);
        }

        let step_name = journey.next_step_name.clone();
        let result = self.perform_acquired(&definition, journey);

        if let Some(step_name) = &step_name {
            match &result {
                Ok(journey) => methods.after_step_completes(journey, step_name),
                Err(_) => {
                    if let Ok(Some(journey)) = self.store.find(&id) {
                        methods.after_step_completes(&journey, step_name);
                    }
                }
            }
        }
        result
    }

    /// Continues a journey this worker has just moved to `performing`.
    fn perform_acquired(
        &self,
        definition: &JourneyDefinition,
        journey: Journey,
    ) -> StepperResult<Journey> {
        let id = journey.id;
        let methods = definition.methods();

        for condition in definition.cancel_conditions() {
            if condition.satisfied_by(&journey, methods)? {
                info!(journey_id = %id, "cancel_if condition met, canceling journey");
                let journey = self.update_performing(id, |row, _| {
                    row.state = JourneyState::Canceled;
                })?;
                self.emit_state(&journey, journey.previous_step_name.as_deref());
                return Ok(journey);
            }
        }

        for condition in definition.skip_conditions() {
            if condition.satisfied_by(&journey, methods)? {
                let skipped = journey.next_step_name.clone();
                info!(journey_id = %id, step = ?skipped, "skip_if condition met, skipping step");
                let journey = self.update_performing(id, |row, now| {
                    advance_past_current(row, definition, now);
                })?;
                self.emit(JourneyEventType::StepSkipped, &journey, skipped.as_deref());
                self.emit_state(&journey, skipped.as_deref());
                self.after_transition(&journey)?;
                return Ok(journey);
            }
        }

        let Some(step_name) = journey.next_step_name.clone() else {
            debug!(journey_id = %id, "No next step, finishing journey");
            let journey = self.update_performing(id, |row, _| mark_finished(row))?;
            self.emit_state(&journey, None);
            return Ok(journey);
        };

        methods.before_step_starts(&journey, &step_name);

        let Some(step) = definition.step(&step_name).cloned() else {
            warn!(
                journey_id = %id,
                step = %step_name,
                "No definition for step, pausing journey"
            );
            let journey = self.update_performing(id, |row, _| {
                row.state = JourneyState::Paused;
            })?;
            self.emit_state(&journey, Some(&step_name));
            return Ok(journey);
        };

        let now = self.clock.now();
        if journey.next_step_to_be_performed_at.is_some_and(|at| at > now) {
            warn!(journey_id = %id, step = %step_name, "Tried to perform step prematurely");
            let journey = self.update_performing(id, |row, _| {
                row.state = JourneyState::Ready;
            })?;
            if journey.is_ready() {
                self.scheduler.schedule(&journey)?;
                self.emit(JourneyEventType::Rescheduled, &journey, Some(&step_name));
            }
            return Ok(journey);
        }

        let (journey, _) = self.update(id, |row, _| {
            row.steps_entered += 1;
            Ok(())
        })?;
        metrics::counter!("stepper.steps.entered").increment(1);
        debug!(journey_id = %id, step = %step_name, "Entering step");
        self.emit(JourneyEventType::StepEntered, &journey, Some(&step_name));

        self.run_step(definition, &step, journey)
    }

    fn run_step(
        &self,
        definition: &JourneyDefinition,
        step: &StepDefinition,
        journey: Journey,
    ) -> StepperResult<Journey> {
        let id = journey.id;
        let methods = definition.methods();

        let outcome = if step.should_skip(&journey, methods)? {
            self.emit(JourneyEventType::StepSkipped, &journey, Some(step.name()));
            Ok(Flow::Continue)
        } else {
            let mut ctx = StepContext::new(journey, step, self.store.as_ref(), self.clock.as_ref());
            let outcome = step.invoke(&mut ctx, methods);
            if outcome.is_ok() && ctx.has_unsaved_changes() {
                error!(journey_id = %id, step = %step.name(), "Step changed the journey without saving it");
                metrics::counter!("stepper.steps.failed").increment(1);
                return Err(StepperError::JourneyNotPersisted {
                    journey_id: id,
                    step: step.name().to_string(),
                });
            }
            if outcome.is_err() {
                ctx.discard_changes();
            }
            outcome
        };

        let succeeded = outcome.is_ok();
        let flow = match &outcome {
            Ok(flow) => Some(*flow),
            Err(err) if is_missing_implementation(err) => Some(Flow::Pause),
            Err(_) => step.on_exception().as_flow(),
        };

        let (journey, _) = self.update(id, |row, now| {
            if succeeded {
                row.steps_completed += 1;
            }
            match flow {
                Some(flow) if row.is_performing() => apply_flow(row, flow, definition, step, now),
                Some(_) => debug!(
                    journey_id = %row.id,
                    state = %row.state,
                    "Journey changed state while the step ran, leaving it as is"
                ),
                None => {}
            }
            Ok(())
        })?;

        match outcome {
            Ok(flow) => {
                metrics::counter!("stepper.steps.completed").increment(1);
                info!(
                    journey_id = %id,
                    step = %step.name(),
                    flow = ?flow,
                    state = %journey.state,
                    "Completed step"
                );
                self.emit(JourneyEventType::StepCompleted, &journey, Some(step.name()));
                self.emit_flow(&journey, step.name(), flow);
                self.after_transition(&journey)?;
                Ok(journey)
            }
            Err(err) => {
                metrics::counter!("stepper.steps.failed").increment(1);
                error!(
                    journey_id = %id,
                    step = %step.name(),
                    policy = %step.on_exception(),
                    state = %journey.state,
                    error = %err,
                    "Step failed"
                );
                self.emit(JourneyEventType::StepFailed, &journey, Some(step.name()));
                if let Some(flow) = flow {
                    self.emit_flow(&journey, step.name(), flow);
                }
                self.after_transition(&journey)?;
                match err.downcast::<StepperError>() {
                    Ok(missing @ StepperError::MissingImplementation { .. }) => Err(missing),
                    Ok(other) => Err(StepperError::StepFailed {
                        journey_id: id,
                        step: step.name().to_string(),
                        source: other.into(),
                    }),
                    Err(source) => Err(StepperError::StepFailed {
                        journey_id: id,
                        step: step.name().to_string(),
                        source,
                    }),
                }
            }
        }
    }

    /// Applies `f` under the row lock and bumps `updated_at` when the row
    /// changed.
    pub(crate) fn update<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Journey, DateTime<Utc>) -> StepperResult<R>,
    ) -> StepperResult<(Journey, R)> {
        let now = self.clock.now();
        locked(self.store.as_ref(), id, |row| {
            let before = row.clone();
            let output = f(row, now)?;
            if *row != before {
                row.updated_at = now;
            }
            Ok(output)
        })
    }

    /// Like [`JourneyEngine::update`], but only touches a journey that is
    /// still `performing`; anything else changed it first and wins.
    pub(crate) fn update_performing(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Journey, DateTime<Utc>),
    ) -> StepperResult<Journey> {
        self.update(id, |row, now| {
            if row.is_performing() {
                f(row, now);
            }
            Ok(())
        })
        .map(|(journey, _)| journey)
    }

    /// Schedules the journey when it is waiting for a step.
    pub(crate) fn after_transition(&self, journey: &Journey) -> StepperResult<()> {
        if journey.is_ready() {
            self.scheduler.schedule(journey)?;
        }
        Ok(())
    }

    pub(crate) fn emit(&self, event_type: JourneyEventType, journey: &Journey, step: Option<&str>) {
        self.event_sink.emit(journey_event(
            event_type,
            journey.id,
            journey.journey_type.as_str(),
            step,
            self.clock.now(),
        ));
    }

    /// Emits the event matching a terminal or paused state, if any.
    pub(crate) fn emit_state(&self, journey: &Journey, step: Option<&str>) {
        let event_type = match journey.state {
            JourneyState::Canceled => JourneyEventType::Canceled,
            JourneyState::Finished => JourneyEventType::Finished,
            JourneyState::Paused => JourneyEventType::Paused,
            JourneyState::Ready | JourneyState::Performing => return,
        };
        self.emit(event_type, journey, step);
    }

    fn emit_flow(&self, journey: &Journey, step: &str, flow: Flow) {
        match flow {
            Flow::Reattempt(_) if journey.is_ready() => {
                self.emit(JourneyEventType::Rescheduled, journey, Some(step))
            }
            _ => self.emit_state(journey, Some(step)),
        }
    }
}

fn is_missing_implementation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<StepperError>(),
        Some(StepperError::MissingImplementation { .. })
    )
}

/// Points the journey at `step`, due `wait` from `now`, with a fresh
/// idempotency key.
pub(crate) fn assign_next_step(
    row: &mut Journey,
    step: &StepDefinition,
    wait: Duration,
    now: DateTime<Utc>,
) {
    row.previous_step_name = row.next_step_name.take();
    row.next_step_name = Some(step.name().to_string());
    row.next_step_to_be_performed_at = Some(now + wait);
    row.idempotency_key = Some(generate_idempotency_key());
    row.state = JourneyState::Ready;
}

pub(crate) fn mark_finished(row: &mut Journey) {
    if let Some(current) = row.next_step_name.take() {
        row.previous_step_name = Some(current);
    }
    row.state = JourneyState::Finished;
}

/// Moves past the currently assigned step without running it. A step name
/// unknown to the definition pauses the journey, the same as performing it
/// would.
pub(crate) fn advance_past_current(
    row: &mut Journey,
    definition: &JourneyDefinition,
    now: DateTime<Utc>,
) {
    let Some(name) = row.next_step_name.as_deref() else {
        mark_finished(row);
        return;
    };
    let Some(current) = definition.step(name) else {
        warn!(journey_id = %row.id, step = %name, "No definition for step, pausing journey");
        row.state = JourneyState::Paused;
        return;
    };
    match definition.step_after(current).cloned() {
        Some(next) => assign_next_step(row, &next, next.wait(), now),
        None => mark_finished(row),
    }
}

fn apply_flow(
    row: &mut Journey,
    flow: Flow,
    definition: &JourneyDefinition,
    step: &StepDefinition,
    now: DateTime<Utc>,
) {
    match flow {
        Flow::Cancel => row.state = JourneyState::Canceled,
        Flow::Pause => row.state = JourneyState::Paused,
        Flow::Reattempt(wait) => {
            assign_next_step(row, step, wait.unwrap_or_else(|| step.wait()), now)
        }
        Flow::Skip | Flow::Continue => match definition.step_after(step) {
            Some(next) => assign_next_step(row, next, next.wait(), now),
            None => mark_finished(row),
        },
        Flow::Finish => mark_finished(row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryTaskQueue;
    use crate::scheduler::ForwardScheduler;
    use crate::step::StepSpec;
    use crate::store::InMemoryJourneyStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    use stepper_core::event_bus::capture_sink;
    use stepper_core::{FakeClock, HeroRef};

    fn engine() -> (JourneyEngine, Arc<InMemoryTaskQueue>, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::starting_now());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let store = Arc::new(InMemoryJourneyStore::new());
        let scheduler = Arc::new(ForwardScheduler::new(queue.clone(), clock.clone()));
        let engine = JourneyEngine::new(store, scheduler).with_clock(clock.clone());
        (engine, queue, clock)
    }

    fn two_steps() -> JourneyDefinition {
        JourneyDefinition::builder("two")
            .step(StepSpec::named("one").run(|_| Ok(Flow::Continue)))
            .step(
                StepSpec::named("two")
                    .wait(Duration::hours(1))
                    .run(|_| Ok(Flow::Continue)),
            )
            .build()
            .unwrap()
    }

    /// Delegates to an in-memory store; `find` fails once `fail_reads` is set.
    struct FlakyReads {
        inner: InMemoryJourneyStore,
        fail_reads: Arc<AtomicBool>,
    }

    impl JourneyStore for FlakyReads {
        fn insert(&self, journey: &Journey) -> StepperResult<()> {
            self.inner.insert(journey)
        }

        fn find(&self, id: &Uuid) -> StepperResult<Option<Journey>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StepperError::Storage("connection reset".to_string()));
            }
            self.inner.find(id)
        }

        fn with_lock(
            &self,
            id: Uuid,
            f: &mut dyn FnMut(&mut Journey) -> StepperResult<()>,
        ) -> StepperResult<Journey> {
            self.inner.with_lock(id, f)
        }

        fn ready_due_before(&self, cutoff: DateTime<Utc>) -> StepperResult<Vec<Journey>> {
            self.inner.ready_due_before(cutoff)
        }

        fn stuck_since(&self, cutoff: DateTime<Utc>) -> StepperResult<Vec<Journey>> {
            self.inner.stuck_since(cutoff)
        }

        fn terminal_updated_before(&self, cutoff: DateTime<Utc>) -> StepperResult<Vec<Journey>> {
            self.inner.terminal_updated_before(cutoff)
        }

        fn delete(&self, ids: &[Uuid]) -> StepperResult<usize> {
            self.inner.delete(ids)
        }

        fn for_hero(
            &self,
            journey_type: Option<&str>,
            hero: &HeroRef,
        ) -> StepperResult<Vec<Journey>> {
            self.inner.for_hero(journey_type, hero)
        }
    }

    #[test]
    fn test_step_error_survives_a_failing_read_after_the_step() {
        let clock = Arc::new(FakeClock::starting_now());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let fail_reads = Arc::new(AtomicBool::new(false));
        let store = Arc::new(FlakyReads {
            inner: InMemoryJourneyStore::new(),
            fail_reads: fail_reads.clone(),
        });
        let scheduler = Arc::new(ForwardScheduler::new(queue, clock.clone()));
        let engine = JourneyEngine::new(store.clone(), scheduler).with_clock(clock);

        let trigger = fail_reads.clone();
        engine
            .register(
                JourneyDefinition::builder("flaky")
                    .step(StepSpec::named("explode").run(move |_| {
                        trigger.store(true, Ordering::SeqCst);
                        Err(anyhow::anyhow!("boom"))
                    }))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let journey = engine.create("flaky", NewJourney::default()).unwrap();
        let err = engine.perform_next_step(journey.id, None).unwrap_err();
        assert!(matches!(err, StepperError::StepFailed { ref step, .. } if step == "explode"));

        fail_reads.store(false, Ordering::SeqCst);
        assert!(store.find(&journey.id).unwrap().unwrap().is_paused());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let (engine, _, _) = engine();
        engine.register(two_steps()).unwrap();
        assert!(matches!(
            engine.register(two_steps()),
            Err(StepperError::DuplicateJourneyType(_))
        ));
        assert!(engine.definition("two").is_some());
        assert!(matches!(
            engine.create("nope", NewJourney::default()),
            Err(StepperError::UnknownJourneyType(_))
        ));
    }

    #[test]
    fn test_create_schedules_first_step() {
        let (engine, queue, clock) = engine();
        engine.register(two_steps()).unwrap();

        let journey = engine.create("two", NewJourney::default()).unwrap();
        assert!(journey.is_ready());
        assert_eq!(journey.next_step_name.as_deref(), Some("one"));
        assert_eq!(journey.next_step_to_be_performed_at, Some(clock.now()));

        let pending = queue.tasks_for(journey.id);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task.idempotency_key, journey.idempotency_key);
    }

    #[test]
    fn test_create_without_steps_finishes() {
        let (engine, queue, _) = engine();
        engine
            .register(JourneyDefinition::builder("empty").build().unwrap())
            .unwrap();

        let journey = engine
            .create("empty", NewJourney::for_hero(HeroRef::new("User", 1)))
            .unwrap();
        assert!(journey.is_finished());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_perform_advances_and_emits_events() {
        let (engine, queue, clock) = engine();
        let sink = capture_sink();
        let engine = engine.with_event_sink(sink.clone());
        engine.register(two_steps()).unwrap();

        let journey = engine.create("two", NewJourney::default()).unwrap();
        let first_key = journey.idempotency_key.clone();
        let journey = engine
            .perform_next_step(journey.id, first_key.as_deref())
            .unwrap();

        assert!(journey.is_ready());
        assert_eq!(journey.previous_step_name.as_deref(), Some("one"));
        assert_eq!(journey.next_step_name.as_deref(), Some("two"));
        assert_eq!(
            journey.next_step_to_be_performed_at,
            Some(clock.now() + Duration::hours(1))
        );
        assert_ne!(journey.idempotency_key, first_key);
        assert_eq!((journey.steps_entered, journey.steps_completed), (1, 1));
        assert_eq!(queue.len(), 2);

        assert_eq!(sink.count_type(JourneyEventType::Created), 1);
        assert_eq!(sink.count_type(JourneyEventType::StepEntered), 1);
        assert_eq!(sink.count_type(JourneyEventType::StepCompleted), 1);
    }

    #[test]
    fn test_stale_key_is_a_no_op() {
        let (engine, _, _) = engine();
        engine.register(two_steps()).unwrap();

        let journey = engine.create("two", NewJourney::default()).unwrap();
        let untouched = engine
            .perform_next_step(journey.id, Some("not-the-key"))
            .unwrap();
        assert_eq!(untouched, journey);
    }

    #[test]
    fn test_perform_task_ignores_deleted_journeys() {
        let (engine, _, _) = engine();
        let task = PerformStepTask {
            journey_id: Uuid::new_v4(),
            journey_type: "two".into(),
            idempotency_key: None,
        };
        assert_eq!(engine.perform_task(&task).unwrap(), None);
    }

    #[test]
    fn test_apply_flow_finish_clears_next_step() {
        let definition = two_steps();
        let step = definition.step("one").unwrap().clone();
        let now = Utc::now();
        let mut row = Journey::new("two", NewJourney::default(), now);
        assign_next_step(&mut row, &step, Duration::zero(), now);
        row.state = JourneyState::Performing;

        apply_flow(&mut row, Flow::Finish, &definition, &step, now);
        assert!(row.is_finished());
        assert_eq!(row.next_step_name, None);
        assert_eq!(row.previous_step_name.as_deref(), Some("one"));
    }
}

//! Durable, linear, multi-step journeys.
//!
//! A journey type is an ordered list of steps, each with a wait. A journey is
//! one persisted run of that list for an optional hero. Progress is driven
//! by at-least-once wake-ups from a task queue; the engine's row-lock and
//! idempotency-key discipline turns those into exactly-once step progression.

pub mod conditional;
pub mod context;
pub mod definition;
pub mod engine;
pub mod flow_control;
pub mod housekeeping;
pub mod queue;
pub mod recovery;
pub mod scheduler;
pub mod step;
pub mod store;
pub mod testing;
pub mod types;
pub mod worker;

pub use conditional::{Condition, Conditional};
pub use context::StepContext;
pub use definition::{JourneyDefinition, JourneyDefinitionBuilder, JourneyMethods, NoMethods, StuckPolicy};
pub use engine::JourneyEngine;
pub use housekeeping::{HousekeepingPolicy, HousekeepingReport};
pub use queue::{InMemoryTaskQueue, ScheduledTask, TaskQueue};
pub use recovery::RecoveryReport;
pub use scheduler::{CyclicScheduler, ForwardScheduler, Scheduler};
pub use step::{Flow, OnException, StepBody, StepDefinition, StepResult, StepSpec};
pub use store::{InMemoryJourneyStore, JourneyStore};
pub use types::{HeroRef, Journey, JourneyState, NewJourney, PerformStepTask};
pub use worker::{Worker, WorkerReport};

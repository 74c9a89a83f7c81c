use thiserror::Error;
use uuid::Uuid;

pub type StepperResult<T> = Result<T, StepperError>;

#[derive(Error, Debug)]
pub enum StepperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Step configuration error: {0}")]
    StepConfiguration(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Journey {0} not found")]
    JourneyNotFound(Uuid),

    #[error("Unknown journey type: {0}")]
    UnknownJourneyType(String),

    #[error("Journey type {0} is already registered")]
    DuplicateJourneyType(String),

    #[error("Journey type {journey_type} has no predicate named {name:?}")]
    UnknownPredicate { journey_type: String, name: String },

    #[error("An active {journey_type} journey already exists for hero {hero}")]
    DuplicateActiveJourney { journey_type: String, hero: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(
        "Journey {journey_id} had its attributes changed but was not saved inside step {step:?}; \
         call save() before returning from the step"
    )]
    JourneyNotPersisted { journey_id: Uuid, step: String },

    #[error("Journey type {journey_type} has no implementation for step {step:?}")]
    MissingImplementation { journey_type: String, step: String },

    #[error("Step {step:?} of journey {journey_id} failed: {source}")]
    StepFailed {
        journey_id: Uuid,
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

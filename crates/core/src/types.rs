use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a persisted journey.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyState {
    /// Waiting for the next step to become due.
    #[default]
    Ready,
    /// Suspended; wake-ups are ignored until resumed.
    Paused,
    /// A worker is running the step body.
    Performing,
    Canceled,
    Finished,
}

impl JourneyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyState::Ready => "ready",
            JourneyState::Paused => "paused",
            JourneyState::Performing => "performing",
            JourneyState::Canceled => "canceled",
            JourneyState::Finished => "finished",
        }
    }

    /// `canceled` and `finished` never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JourneyState::Canceled | JourneyState::Finished)
    }

    /// States covered by the one-journey-per-hero constraint.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JourneyState::Ready | JourneyState::Performing | JourneyState::Paused
        )
    }
}

impl fmt::Display for JourneyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weak reference to the subject a journey runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeroRef {
    pub hero_type: String,
    pub hero_id: String,
}

impl HeroRef {
    pub fn new(hero_type: impl Into<String>, hero_id: impl ToString) -> Self {
        Self {
            hero_type: hero_type.into(),
            hero_id: hero_id.to_string(),
        }
    }
}

impl fmt::Display for HeroRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hero_type, self.hero_id)
    }
}

/// Lifecycle event emitted by the journey engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyEvent {
    pub event_id: Uuid,
    pub event_type: JourneyEventType,
    pub journey_id: Uuid,
    pub journey_type: String,
    pub step_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JourneyEventType {
    Created,
    StepEntered,
    StepCompleted,
    StepFailed,
    StepSkipped,
    Rescheduled,
    Paused,
    Resumed,
    Canceled,
    Finished,
    Recovered,
    Deleted,
}

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use stepper_core::types::{HeroRef, JourneyState};

const IDEMPOTENCY_KEY_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const IDEMPOTENCY_KEY_LEN: usize = 16;

/// A persisted journey: one row per workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    pub id: Uuid,
    pub journey_type: String,
    pub state: JourneyState,
    pub hero: Option<HeroRef>,
    pub allow_multiple: bool,
    pub previous_step_name: Option<String>,
    pub next_step_name: Option<String>,
    pub next_step_to_be_performed_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    pub steps_entered: u64,
    pub steps_completed: u64,
    /// Application data owned by the step bodies.
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Journey {
    pub(crate) fn new(journey_type: &str, params: NewJourney, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            journey_type: journey_type.to_string(),
            state: JourneyState::Ready,
            hero: params.hero,
            allow_multiple: params.allow_multiple,
            previous_step_name: None,
            next_step_name: None,
            next_step_to_be_performed_at: None,
            idempotency_key: None,
            steps_entered: 0,
            steps_completed: 0,
            attributes: params.attributes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == JourneyState::Ready
    }

    pub fn is_performing(&self) -> bool {
        self.state == JourneyState::Performing
    }

    pub fn is_paused(&self) -> bool {
        self.state == JourneyState::Paused
    }

    pub fn is_canceled(&self) -> bool {
        self.state == JourneyState::Canceled
    }

    pub fn is_finished(&self) -> bool {
        self.state == JourneyState::Finished
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// Whether this row takes part in the one-active-journey-per-hero rule.
    pub fn holds_hero_slot(&self) -> bool {
        self.hero.is_some() && !self.allow_multiple && self.state.is_active()
    }

    /// Task that wakes this journey up for its currently scheduled step.
    pub fn perform_step_task(&self) -> PerformStepTask {
        PerformStepTask {
            journey_id: self.id,
            journey_type: self.journey_type.clone(),
            idempotency_key: self.idempotency_key.clone(),
        }
    }
}

/// Parameters for beginning a journey.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJourney {
    pub hero: Option<HeroRef>,
    pub allow_multiple: bool,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl NewJourney {
    pub fn for_hero(hero: HeroRef) -> Self {
        Self {
            hero: Some(hero),
            ..Self::default()
        }
    }

    pub fn allow_multiple(mut self, allow: bool) -> Self {
        self.allow_multiple = allow;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Default for NewJourney {
    fn default() -> Self {
        Self {
            hero: None,
            allow_multiple: false,
            attributes: serde_json::Map::new(),
        }
    }
}

/// Payload of a queue wake-up asking a journey to perform its next step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformStepTask {
    pub journey_id: Uuid,
    pub journey_type: String,
    pub idempotency_key: Option<String>,
}

/// Fresh random base36 token tying a wake-up to one step occurrence.
pub fn generate_idempotency_key() -> String {
    let mut rng = rand::thread_rng();
    (0..IDEMPOTENCY_KEY_LEN)
        .map(|_| IDEMPOTENCY_KEY_ALPHABET[rng.gen_range(0..IDEMPOTENCY_KEY_ALPHABET.len())] as char)
        .collect()
}

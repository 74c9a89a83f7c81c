use chrono::Duration;
use config::ConfigError;
use serde::Deserialize;

/// Root engine configuration. Loaded from environment variables with the
/// prefix `STEPPER__` (for example `STEPPER__SCHEDULER__KIND=cyclic`).
#[derive(Debug, Clone, Deserialize)]
pub struct StepperConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Which scheduling strategy hands wake-ups to the task queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// One task per schedule call, delayed until the step is due.
    #[default]
    Forward,
    /// Tasks are only enqueued for steps due within the next cycle.
    Cyclic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub kind: SchedulerKind,
    /// Period of the scheduling cycle; only used by the cyclic scheduler.
    #[serde(default = "default_cycle_duration_secs")]
    pub cycle_duration_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    /// Journeys in `performing` for longer than this are considered stuck.
    #[serde(default = "default_stuck_after_secs")]
    pub stuck_after_secs: u64,
    #[serde(default = "default_recovery_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HousekeepingConfig {
    /// Retention for finished and canceled journeys. `0` keeps them forever.
    #[serde(default = "default_delete_completed_after_secs")]
    pub delete_completed_after_secs: u64,
    #[serde(default = "default_housekeeping_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_cycle_duration_secs() -> u64 {
    30 * 60
}
fn default_stuck_after_secs() -> u64 {
    2 * 24 * 60 * 60
}
fn default_recovery_interval_secs() -> u64 {
    30 * 60
}
fn default_delete_completed_after_secs() -> u64 {
    30 * 24 * 60 * 60
}
fn default_housekeeping_interval_secs() -> u64 {
    30 * 60
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_concurrency() -> usize {
    4
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::default(),
            cycle_duration_secs: default_cycle_duration_secs(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stuck_after_secs: default_stuck_after_secs(),
            interval_secs: default_recovery_interval_secs(),
        }
    }
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            delete_completed_after_secs: default_delete_completed_after_secs(),
            interval_secs: default_housekeeping_interval_secs(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            scheduler: SchedulerConfig::default(),
            recovery: RecoveryConfig::default(),
            housekeeping: HousekeepingConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Converts a seconds setting to a `Duration`, rejecting zero and values
/// chrono cannot represent.
fn seconds_setting(key: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Message(format!("{key} must be greater than zero")));
    }
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| ConfigError::Message(format!("{key} is out of range: {secs}")))
}

impl SchedulerConfig {
    pub fn cycle_duration(&self) -> Result<Duration, ConfigError> {
        seconds_setting("scheduler.cycle_duration_secs", self.cycle_duration_secs)
    }
}

impl RecoveryConfig {
    pub fn stuck_after(&self) -> Result<Duration, ConfigError> {
        seconds_setting("recovery.stuck_after_secs", self.stuck_after_secs)
    }
}

impl HousekeepingConfig {
    /// `None` when cleanup of completed journeys is disabled.
    pub fn delete_completed_after(&self) -> Result<Option<Duration>, ConfigError> {
        match self.delete_completed_after_secs {
            0 => Ok(None),
            secs => seconds_setting("housekeeping.delete_completed_after_secs", secs)
                .map(Some),
        }
    }
}

impl StepperConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("STEPPER")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects durations and intervals that are zero or too large to use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.cycle_duration()?;
        self.recovery.stuck_after()?;
        self.housekeeping.delete_completed_after()?;
        seconds_setting("recovery.interval_secs", self.recovery.interval_secs)?;
        seconds_setting("housekeeping.interval_secs", self.housekeeping.interval_secs)?;
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "worker.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Message(
                "worker.concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StepperConfig::default();
        assert_eq!(config.scheduler.kind, SchedulerKind::Forward);
        assert_eq!(config.scheduler.cycle_duration().unwrap(), Duration::minutes(30));
        assert_eq!(config.recovery.stuck_after().unwrap(), Duration::days(2));
        assert_eq!(
            config.housekeeping.delete_completed_after().unwrap(),
            Some(Duration::days(30))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retention_disables_cleanup() {
        let housekeeping = HousekeepingConfig {
            delete_completed_after_secs: 0,
            ..HousekeepingConfig::default()
        };
        assert_eq!(housekeeping.delete_completed_after().unwrap(), None);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: StepperConfig = serde_json::from_str(
            r#"{"scheduler": {"kind": "cyclic", "cycle_duration_secs": 30}}"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.kind, SchedulerKind::Cyclic);
        assert_eq!(config.scheduler.cycle_duration().unwrap(), Duration::seconds(30));
        assert_eq!(config.worker.concurrency, 4);
    }

    #[test]
    fn test_out_of_range_durations_are_rejected() {
        let huge = RecoveryConfig {
            stuck_after_secs: 10_000_000_000_000_000,
            ..RecoveryConfig::default()
        };
        assert!(huge.stuck_after().is_err());

        // Would wrap to a negative duration with a plain cast.
        let wrapping = RecoveryConfig {
            stuck_after_secs: u64::MAX,
            ..RecoveryConfig::default()
        };
        assert!(wrapping.stuck_after().is_err());

        let retention = HousekeepingConfig {
            delete_completed_after_secs: u64::MAX,
            ..HousekeepingConfig::default()
        };
        assert!(retention.delete_completed_after().is_err());

        let mut config = StepperConfig::default();
        config.recovery = wrapping;
        assert!(matches!(config.validate(), Err(ConfigError::Message(_))));
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        let mut config = StepperConfig::default();
        config.scheduler.cycle_duration_secs = 0;
        assert!(config.validate().is_err());

        let mut config = StepperConfig::default();
        config.recovery.stuck_after_secs = 0;
        assert!(config.validate().is_err());

        let mut config = StepperConfig::default();
        config.worker.concurrency = 0;
        assert!(config.validate().is_err());
    }
}

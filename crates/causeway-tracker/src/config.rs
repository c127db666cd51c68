//! Tracker configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bounds and switches for a [`PhaseTracker`](crate::tracker::PhaseTracker).
///
/// Missing fields take their defaults when loading from JSON:
///
/// ```
/// use causeway_tracker::config::TrackerConfig;
///
/// let config = TrackerConfig::from_json(r#"{ "max_drain_passes": 8 }"#).unwrap();
/// assert_eq!(config.max_drain_passes, 8);
/// assert_eq!(config.max_stack_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Upper bound on fixed-point drain passes for one pipeline run.
    pub max_drain_passes: u32,
    /// Pushes beyond this depth fail with `StackOverflow`.
    pub max_stack_depth: usize,
    /// Upper bound on neighbor updates applied by one immediate (uncaptured)
    /// block write.
    pub max_cascade_updates: usize,
    /// After each event post, check the stack is back at its prior depth.
    pub verify_listener_depth: bool,
    /// Record pipeline outcomes in the cause journal.
    pub journal_enabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_drain_passes: 512,
            max_stack_depth: 64,
            max_cascade_updates: 65_536,
            verify_listener_depth: true,
            journal_enabled: true,
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_drain_passes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_drain_passes",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.max_stack_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_stack_depth",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.max_cascade_updates == 0 {
            return Err(ConfigError::Invalid {
                field: "max_cascade_updates",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

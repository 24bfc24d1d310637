use serde::{Deserialize, Serialize};

use crate::directory::RECYCLE_ENTITY_COUNT;
use crate::error::ConfigError;

/// Tunables for a [`World`](crate::World). Usually read from the `[world]` table of a settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Destroyed entities that must queue up before an index is handed out again.
    pub recycle_threshold: usize,
    /// Maximum number of undelivered events an event queue holds.
    pub event_queue_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            recycle_threshold: RECYCLE_ENTITY_COUNT,
            event_queue_capacity: 1000,
        }
    }
}

impl WorldConfig {
    /// Parse a config from TOML. Missing keys take their default values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WorldConfig::default();
        assert_eq!(config.recycle_threshold, 2048);
        assert_eq!(config.event_queue_capacity, 1000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = WorldConfig::from_toml_str("recycle_threshold = 16").unwrap();
        assert_eq!(config.recycle_threshold, 16);
        assert_eq!(config.event_queue_capacity, 1000);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            WorldConfig::from_toml_str("recycle_threshold = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            WorldConfig::from_toml_str("event_queue_capacity = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = WorldConfig {
            recycle_threshold: 4,
            event_queue_capacity: 8,
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(WorldConfig::from_toml_str(&text).unwrap(), config);
    }
}

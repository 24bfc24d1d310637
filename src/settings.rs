//! Demo settings
//!
//! Settings are read from the path given on the command line, or from
//! `~/.config/lumen/settings.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use lumen_ecs::{ConfigError, WorldConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// All demo settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    pub world: WorldConfig,
    pub simulation: SimulationSettings,
}

impl DemoSettings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lumen"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.toml"))
    }

    /// Load settings from `path`, or from the user config dir when `None`.
    /// Falls back to defaults on any failure.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let Some(path) = Self::settings_path() else {
                    warn!("Could not determine config directory");
                    return Self::default();
                };
                if !path.exists() {
                    info!("No settings file found, using defaults");
                    return Self::default();
                }
                path
            }
        };

        match fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse settings: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read settings file {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content)?;
        settings.world.validate()?;
        settings.simulation.validate()?;
        Ok(settings)
    }
}

/// Simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Entities spawned before the first frame
    pub initial_entities: usize,
    /// Number of frames to simulate
    pub frames: u32,
    /// Simulated seconds per frame
    pub frame_dt: f32,
    /// Upper bound of a spawned entity's lifetime in seconds
    pub max_lifetime: f32,
    /// RNG seed; random when absent
    pub seed: Option<u64>,
    /// Run each frame's systems on separate threads
    pub parallel: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            initial_entities: 256,
            frames: 240,
            frame_dt: 1.0 / 60.0,
            max_lifetime: 2.0,
            seed: None,
            parallel: true,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_dt <= 0.0 {
            return Err(ConfigError::Invalid("frame_dt must be positive".to_string()));
        }
        if self.max_lifetime <= 0.0 {
            return Err(ConfigError::Invalid("max_lifetime must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(DemoSettings::from_toml_str("").unwrap(), DemoSettings::default());
    }

    #[test]
    fn parses_both_tables() {
        let settings = DemoSettings::from_toml_str(
            r#"
            [world]
            recycle_threshold = 64

            [simulation]
            initial_entities = 10
            seed = 7
            parallel = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.world.recycle_threshold, 64);
        assert_eq!(settings.world.event_queue_capacity, 1000);
        assert_eq!(settings.simulation.initial_entities, 10);
        assert_eq!(settings.simulation.seed, Some(7));
        assert!(!settings.simulation.parallel);
        assert_eq!(settings.simulation.frames, 240);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            DemoSettings::from_toml_str("[simulation]\nframe_dt = 0.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DemoSettings::from_toml_str("[world]\nevent_queue_capacity = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = DemoSettings::load(Some(Path::new("/nonexistent/lumen/settings.toml")));
        assert_eq!(settings, DemoSettings::default());
    }
}

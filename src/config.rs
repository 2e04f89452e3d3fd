//! Engine configuration
//!
//! Loaded from `kine.toml` in the working directory, or from the file named
//! by the `KINE_CONFIG` environment variable. Every section is optional.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kine_core::TimeConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable naming an alternative config file
pub const CONFIG_ENV_VAR: &str = "KINE_CONFIG";

/// Config file used when the environment variable is unset
pub const DEFAULT_CONFIG_PATH: &str = "kine.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// All engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub time: TimeConfig,
    pub scheduler: SchedulerConfig,
    pub demo: DemoConfig,
}

impl EngineConfig {
    /// Path the config is read from: `$KINE_CONFIG` or `kine.toml`
    pub fn config_path() -> PathBuf {
        env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Self>(content)?.sanitized())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the config, or return defaults if it is missing or broken
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::from_file(path) {
            Ok(config) => {
                info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Replace values the engine cannot run with by their defaults
    fn sanitized(mut self) -> Self {
        let defaults = TimeConfig::default();
        if !(self.time.fixed_timestep > 0.0) {
            warn!(
                "fixed_timestep must be positive (got {}), using {}",
                self.time.fixed_timestep, defaults.fixed_timestep
            );
            self.time.fixed_timestep = defaults.fixed_timestep;
        }
        if !(self.time.max_delta_time > 0.0) {
            warn!(
                "max_delta_time must be positive (got {}), using {}",
                self.time.max_delta_time, defaults.max_delta_time
            );
            self.time.max_delta_time = defaults.max_delta_time;
        }
        if self.time.time_scale < 0.0 {
            warn!("time_scale cannot be negative (got {}), using 0", self.time.time_scale);
            self.time.time_scale = 0.0;
        }
        self
    }
}

/// System scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum fixed-rate steps per frame; 0 disables the cap
    pub max_fixed_steps: u32,
}

impl SchedulerConfig {
    pub fn step_cap(&self) -> Option<u32> {
        (self.max_fixed_steps > 0).then_some(self.max_fixed_steps)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_fixed_steps: 8 }
    }
}

/// Settings for the headless demo binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of frames to simulate
    pub frames: u32,
    /// Raw delta fed to the engine every frame (in seconds)
    pub frame_dt: f32,
    /// Seed for pipe placement
    pub seed: u64,
    /// Frames between simulated flaps; 0 never flaps
    pub flap_interval: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            frame_dt: 1.0 / 60.0,
            seed: 7,
            flap_interval: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.scheduler.step_cap(), Some(8));
    }

    #[test]
    fn partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [time]
            fixed_timestep = 0.02

            [scheduler]
            max_fixed_steps = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.time.fixed_timestep, 0.02);
        assert_eq!(config.time.max_delta_time, TimeConfig::default().max_delta_time);
        assert_eq!(config.scheduler.step_cap(), None);
        assert_eq!(config.demo, DemoConfig::default());
    }

    #[test]
    fn invalid_timestep_falls_back() {
        let config = EngineConfig::from_toml_str("[time]\nfixed_timestep = 0.0\n").unwrap();
        assert_eq!(config.time.fixed_timestep, TimeConfig::default().fixed_timestep);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = EngineConfig::from_toml_str("[time\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = EngineConfig::load_from("definitely/not/here/kine.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn save_then_load() {
        let path = env::temp_dir().join(format!("kine-config-{}.toml", std::process::id()));
        let mut config = EngineConfig::default();
        config.demo.frames = 42;
        config.scheduler.max_fixed_steps = 3;
        config.save(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }
}

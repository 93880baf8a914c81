//! Session configuration
//!
//! Stored as TOML under `<config dir>/padbridge/config.toml`. Every section
//! has defaults, so a missing or partial file degrades to the defaults
//! instead of preventing startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::state::ControllerKind;

const CONFIG_DIR: &str = "padbridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub controller: ControllerConfig,
    pub gamepad: GamepadConfig,
    pub dispatch: DispatchConfig,
    pub console: ConsoleConfig,
    pub transport: TransportConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            controller: ControllerConfig::default(),
            gamepad: GamepadConfig::default(),
            dispatch: DispatchConfig::default(),
            console: ConsoleConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ControllerConfig {
    pub kind: ControllerKind,
    /// How long a console button push keeps the buttons pressed
    pub push_hold_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kind: ControllerKind::ProController,
            push_hold_ms: 100,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct GamepadConfig {
    /// Only forward events of the n-th connected gamepad; all pads when unset
    pub gamepad_index: Option<usize>,
    pub joystick_deadzone: f32,
    pub queue_capacity: usize,
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            gamepad_index: None,
            joystick_deadzone: 0.0,
            queue_capacity: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct DispatchConfig {
    pub rate_hz: u32,
    pub stats_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_hz: 120,
            stats_interval_secs: 30,
        }
    }
}

impl DispatchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(1) / self.rate_hz.max(1)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ConsoleConfig {
    pub prompt: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt: "cmd >> ".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Log,
    Mqtt,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub mqtt: MqttConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "padbridge".to_string(),
            topic: "padbridge/state".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 5,
            connect_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Falls back to the home directory when there is no config directory
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Parses the file at `path`; callers run [`AppConfig::validate`] once
    /// all overrides are applied
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads the config at `path`, writing the defaults there first if missing
    pub fn ensure_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No config found, writing defaults to {}", path.display());
            let config = AppConfig::default();
            config.save(path)?;
            return Ok(config);
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.dispatch.rate_hz) {
            return Err(ConfigError::Invalid(format!(
                "dispatch.rate_hz must be within 1..=1000, got {}",
                self.dispatch.rate_hz
            )));
        }
        if self.gamepad.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "gamepad.queue_capacity must be greater than zero".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.gamepad.joystick_deadzone) {
            return Err(ConfigError::Invalid(format!(
                "gamepad.joystick_deadzone must be within [0, 1), got {}",
                self.gamepad.joystick_deadzone
            )));
        }
        if self.transport.kind == TransportKind::Mqtt {
            let mqtt = &self.transport.mqtt;
            if mqtt.port == 0 || mqtt.topic.is_empty() {
                return Err(ConfigError::Invalid(
                    "transport.mqtt needs a non-zero port and a topic".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_dispatch_at_120_hz() {
        let config = AppConfig::default();
        assert_eq!(config.dispatch.period(), Duration::from_secs(1) / 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [controller]
            kind = "joycon_r"

            [transport]
            kind = "mqtt"
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.kind, ControllerKind::JoyconR);
        assert_eq!(config.controller.push_hold_ms, 100);
        assert_eq!(config.transport.kind, TransportKind::Mqtt);
        assert_eq!(config.transport.mqtt.port, 1883);
        assert_eq!(config.console.prompt, "cmd >> ");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = AppConfig::default();
        config.dispatch.rate_hz = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.gamepad.joystick_deadzone = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn ensure_default_writes_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let written = AppConfig::ensure_default(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::ensure_default(&path).unwrap();
        assert_eq!(loaded.dispatch.rate_hz, written.dispatch.rate_hz);
        assert_eq!(loaded.transport.kind, TransportKind::Log);
    }

    #[test]
    fn load_leaves_validation_to_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[dispatch]\nrate_hz = 0\n").unwrap();

        let mut config = AppConfig::load(&path).unwrap();
        assert!(config.validate().is_err());
        config.dispatch.rate_hz = 60;
        assert!(config.validate().is_ok());
    }
}

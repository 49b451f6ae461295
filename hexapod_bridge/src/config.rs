//! # Bridge Configuration
//!
//! Process settings for the bridge, read from a TOML file. Servo calibration
//! is not stored here; it lives in the JSON calibration file named by
//! `calibration_file`.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! calibration_file = "servo_config.json"
//!
//! [serial]
//! candidates = ["/dev/ttyUSB0", "/dev/ttyACM0"]
//! baud = 115200
//! settle_ms = 2000
//!
//! [network]
//! listen = "0.0.0.0"
//!
//! [motion]
//! settle_delay_ms = 300
//! stand_on_startup = true
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

// src/config.rs - Bridge configuration
use crate::hardware::LinkSettings;
use crate::motion::MotionSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_calibration_file")]
    pub calibration_file: String,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub motion: MotionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calibration_file: default_calibration_file(),
            serial: SerialConfig::default(),
            network: NetworkConfig::default(),
            motion: MotionConfig::default(),
        }
    }
}

/// Serial link to the motor controller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Device paths tried in order; the first that opens is used.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Upper bound on waiting for an acknowledgement line.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Time the controller needs to boot after the port is opened.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Append OS-enumerated ports after the configured candidates.
    #[serde(default)]
    pub scan_available: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            baud: default_baud(),
            read_timeout_ms: default_read_timeout_ms(),
            settle_ms: default_settle_ms(),
            scan_available: false,
        }
    }
}

impl SerialConfig {
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            candidates: self.candidates.clone(),
            baud: self.baud,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            settle: Duration::from_millis(self.settle_ms),
            scan_available: self.scan_available,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Command port. Defaults to the `port` of the calibration file.
    #[serde(default)]
    pub port: Option<u16>,
    /// Port responses are sent to on the operator's address. Defaults to
    /// the command port plus one.
    #[serde(default)]
    pub response_port: Option<u16>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: None,
            response_port: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Pause between leg groups of the stand sequence.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Wait for an acknowledgement line after each stand group.
    #[serde(default)]
    pub stand_ack: bool,
    #[serde(default = "default_stand_on_startup")]
    pub stand_on_startup: bool,
    /// Time given to the standby pose before the link is closed on shutdown.
    #[serde(default = "default_shutdown_delay_ms")]
    pub shutdown_delay_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            stand_ack: false,
            stand_on_startup: default_stand_on_startup(),
            shutdown_delay_ms: default_shutdown_delay_ms(),
        }
    }
}

impl MotionConfig {
    pub fn motion_settings(&self) -> MotionSettings {
        MotionSettings {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            stand_ack: self.stand_ack,
        }
    }
}

// Default value functions
fn default_calibration_file() -> String { "servo_config.json".to_string() }
fn default_baud() -> u32 { 115200 }
fn default_read_timeout_ms() -> u64 { 100 }
fn default_settle_ms() -> u64 { 2000 }
fn default_listen() -> String { "0.0.0.0".to_string() }
fn default_settle_delay_ms() -> u64 { 300 }
fn default_stand_on_startup() -> bool { true }
fn default_shutdown_delay_ms() -> u64 { 1000 }

#[cfg(windows)]
fn default_candidates() -> Vec<String> {
    ["COM3", "COM4", "COM5", "COM6"].iter().map(|p| p.to_string()).collect()
}

#[cfg(not(windows))]
fn default_candidates() -> Vec<String> {
    ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyACM0", "/dev/ttyACM1", "/dev/serial0"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_or_default(path: &str) -> Result<Config, ConfigError> {
    if !std::path::Path::new(path).exists() {
        tracing::warn!("Config file '{}' not found, using defaults", path);
        return Ok(Config::default());
    }
    load_config(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.calibration_file, "servo_config.json");
        assert_eq!(config.serial.baud, 115200);
        assert_eq!(config.serial.read_timeout_ms, 100);
        assert!(!config.serial.candidates.is_empty());
        assert_eq!(config.network.listen, "0.0.0.0");
        assert_eq!(config.motion.settle_delay_ms, 300);
        assert!(config.motion.stand_on_startup);
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bridge.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[serial]\ncandidates = ['/dev/ttyS9']\nbaud = 57600").unwrap();
        writeln!(file, "[motion]\nsettle_delay_ms = 150").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.serial.candidates, vec!["/dev/ttyS9".to_string()]);
        assert_eq!(config.serial.baud, 57600);
        assert_eq!(config.motion.settle_delay_ms, 150);
        // Defaults for missing fields
        assert_eq!(config.serial.settle_ms, 2000);
        assert_eq!(config.network.port, None);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_bridge.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
        assert!(load_or_default("nonexistent_bridge.toml").is_ok());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_or_default(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_settings_conversion() {
        let mut config = Config::default();
        config.serial.settle_ms = 0;
        config.motion.settle_delay_ms = 250;
        let link = config.serial.link_settings();
        assert_eq!(link.settle, Duration::ZERO);
        assert_eq!(link.read_timeout, Duration::from_millis(100));
        assert_eq!(config.motion.motion_settings().settle_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_stand_ack_uses_read_timeout() {
        let config: Config =
            toml::from_str("[serial]\nread_timeout_ms = 40\n\n[motion]\nstand_ack = true\n").unwrap();
        assert!(config.motion.motion_settings().stand_ack);
        assert_eq!(config.serial.link_settings().read_timeout, Duration::from_millis(40));
    }
}

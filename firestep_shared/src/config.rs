//! Shared configuration for the device channel and the simulated device.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [device]
//! serial_path = "/dev/ttyACM0"
//! baud_rate = 19200
//! max_history = 50
//! launch_timeout_ms = 3000
//!
//! [kinematics]
//! microsteps = 16
//! steps_per_revolution = 200
//! teeth = 16
//! # travel = { x = 0.01, y = 0.01, z = 0.01 }
//! # module = "mto-xyz"
//! ```
//!
//! `baud_rate` and `launch_timeout_ms` are handed to the transport as-is;
//! the command queue itself does not interpret them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::kinematics::{Envelope, GeometryKind, Mechanics};
use crate::position::{Axis, Travel};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub kinematics: KinematicsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device.validate()?;
        self.kinematics.validate()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default = "default_serial_path")]
    pub serial_path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial_path: default_serial_path(),
            baud_rate: default_baud_rate(),
            max_history: default_max_history(),
            launch_timeout_ms: default_launch_timeout_ms(),
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial_path.trim().is_empty() {
            return Err(ConfigError::Invalid("device.serial_path must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("device.baud_rate must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KinematicsConfig {
    /// Full kinematics module; mutually exclusive with `travel`.
    #[serde(default)]
    pub module: Option<GeometryKind>,
    /// Explicit fixed-ratio travel per axis, overriding the mechanics.
    #[serde(default)]
    pub travel: Option<Travel>,
    #[serde(default = "default_microsteps")]
    pub microsteps: u32,
    #[serde(default = "default_steps_per_revolution")]
    pub steps_per_revolution: u32,
    #[serde(default = "default_teeth")]
    pub teeth: u32,
    #[serde(default)]
    pub envelope: Envelope,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            module: None,
            travel: None,
            microsteps: default_microsteps(),
            steps_per_revolution: default_steps_per_revolution(),
            teeth: default_teeth(),
            envelope: Envelope::default(),
        }
    }
}

impl KinematicsConfig {
    pub fn mechanics(&self) -> Mechanics {
        Mechanics {
            microsteps: self.microsteps,
            steps_per_revolution: self.steps_per_revolution,
            teeth: self.teeth,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module.is_some() && self.travel.is_some() {
            return Err(ConfigError::Invalid(
                "kinematics.module and kinematics.travel are mutually exclusive".to_string(),
            ));
        }
        if self.microsteps == 0 || self.steps_per_revolution == 0 || self.teeth == 0 {
            return Err(ConfigError::Invalid(
                "kinematics microsteps, steps_per_revolution and teeth must be positive".to_string(),
            ));
        }
        if let Some(travel) = self.travel {
            for axis in Axis::ALL {
                let value = travel.get(axis);
                if !value.is_finite() || value == 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "kinematics.travel.{axis} must be finite and non-zero, got {value}"
                    )));
                }
            }
        }
        for axis in Axis::ALL {
            let [min, max] = self.envelope.limits(axis);
            if min.is_nan() || max.is_nan() || min >= max {
                return Err(ConfigError::Invalid(format!(
                    "kinematics.envelope.{axis} must satisfy min < max, got [{min}, {max}]"
                )));
            }
        }
        Ok(())
    }
}

fn default_serial_path() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_baud_rate() -> u32 {
    19200
}

fn default_max_history() -> usize {
    50
}

fn default_launch_timeout_ms() -> u64 {
    3000
}

fn default_microsteps() -> u32 {
    16
}

fn default_steps_per_revolution() -> u32 {
    200
}

fn default_teeth() -> u32 {
    16
}

/// Load and validate a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}

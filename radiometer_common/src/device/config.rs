//! Per-device configuration tables.
//!
//! Every subsystem table carries a [`DeviceConfig`] (driver name, endpoint
//! and acquisition settings) flattened next to its own fields.
//!
//! # TOML Example
//!
//! ```toml
//! [chopper]
//! driver = "dummy"
//! endpoint = { serial = { dev = "/dev/chopper", baudrate = 115200 } }
//! positions = ["cold", "antenna", "hot", "antenna"]
//!
//! [[backends.spectrometer]]
//! name = "AFFTS"
//! driver = "dummy"
//! integration_time_us = 5000000
//! boards = [{ channels = 8192, f_min_mhz = 0.0, f_max_mhz = 1500.0 }]
//! ```

use crate::device::driver::DeviceError;
use crate::device::types::{ChopperPos, Endpoint};
use serde::{Deserialize, Serialize};

/// Default driver name.
fn default_driver() -> String {
    "dummy".to_string()
}

/// Default integration time: 1 s.
fn default_integration_time_us() -> u32 {
    1_000_000
}

/// Driver selection and hardware settings for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Registered driver name.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Hardware endpoint.
    #[serde(default)]
    pub endpoint: Endpoint,

    /// Spectrometer boards (ignored by other device kinds).
    #[serde(default)]
    pub boards: Vec<BoardConfig>,

    /// Integration time per acquisition [µs].
    #[serde(default = "default_integration_time_us")]
    pub integration_time_us: u32,

    /// Blank time between acquisitions [µs].
    #[serde(default)]
    pub blank_time_us: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            endpoint: Endpoint::None,
            boards: Vec::new(),
            integration_time_us: default_integration_time_us(),
            blank_time_us: 0,
        }
    }
}

impl DeviceConfig {
    /// Validate the device table.
    ///
    /// # Errors
    /// Returns `DeviceError::ConfigError` for an empty driver name or a
    /// zero integration time.
    pub fn validate(&self, label: &str) -> Result<(), DeviceError> {
        if self.driver.is_empty() {
            return Err(DeviceError::ConfigError(format!(
                "{label}: driver name cannot be empty"
            )));
        }
        if self.integration_time_us == 0 {
            return Err(DeviceError::ConfigError(format!(
                "{label}: integration_time_us must be greater than 0"
            )));
        }
        Ok(())
    }
}

/// One spectrometer board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Number of channels.
    pub channels: usize,
    /// Lower frequency limit [MHz].
    pub f_min_mhz: f64,
    /// Upper frequency limit [MHz].
    pub f_max_mhz: f64,
}

impl BoardConfig {
    /// Channel centre frequencies [MHz], evenly spaced over the band.
    pub fn frequencies(&self) -> Vec<f64> {
        if self.channels == 0 {
            return Vec::new();
        }
        let step = (self.f_max_mhz - self.f_min_mhz) / self.channels as f64;
        (0..self.channels)
            .map(|i| self.f_min_mhz + step * (i as f64 + 0.5))
            .collect()
    }

    /// Validate the board table.
    pub fn validate(&self, label: &str, index: usize) -> Result<(), DeviceError> {
        if self.channels == 0 {
            return Err(DeviceError::ConfigError(format!(
                "{label}: board {index} has no channels"
            )));
        }
        if !(self.f_min_mhz < self.f_max_mhz) {
            return Err(DeviceError::ConfigError(format!(
                "{label}: board {index} needs f_min_mhz < f_max_mhz ({} >= {})",
                self.f_min_mhz, self.f_max_mhz
            )));
        }
        Ok(())
    }
}

/// Chopper table: device settings plus the per-cycle target list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChopperConfig {
    /// Device settings.
    #[serde(flatten)]
    pub device: DeviceConfig,
    /// Target for each cycle position.
    pub positions: Vec<ChopperPos>,
}

/// Wobbler table: device settings plus the per-cycle step list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WobblerConfig {
    /// Device settings.
    #[serde(flatten)]
    pub device: DeviceConfig,
    /// Position [steps] for each cycle position.
    pub positions: Vec<i32>,
}

/// One named spectrometer backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrometerConfig {
    /// Backend name (used in logs and data columns).
    pub name: String,
    /// Device settings.
    #[serde(flatten)]
    pub device: DeviceConfig,
}

impl SpectrometerConfig {
    /// Validate name, device table and boards.
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.name.is_empty() {
            return Err(DeviceError::ConfigError(
                "spectrometer name cannot be empty".to_string(),
            ));
        }
        let label = format!("spectrometer '{}'", self.name);
        self.device.validate(&label)?;
        if self.device.boards.is_empty() {
            return Err(DeviceError::ConfigError(format!(
                "{label}: at least one board is required"
            )));
        }
        for (i, board) in self.device.boards.iter().enumerate() {
            board.validate(&label, i)?;
        }
        Ok(())
    }
}

/// Backend list with an optional declared count.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Declared number of backends; must match the list when given.
    #[serde(default)]
    pub size: Option<usize>,
    /// Spectrometer backends.
    #[serde(default)]
    pub spectrometer: Vec<SpectrometerConfig>,
}

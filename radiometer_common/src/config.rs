//! Configuration loading and the instrument schema.
//!
//! One TOML file describes the whole instrument: a `[shared]` table, the
//! operation settings, the output location and one table per subsystem.
//!
//! # Usage
//!
//! ```rust,no_run
//! use radiometer_common::config::{ConfigError, RadiometerConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = RadiometerConfig::load_validated(Path::new("radiometer.toml"))?;
//!     println!("cycle length {}", config.cycle_length());
//!     Ok(())
//! }
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "info"
//! service_name = "waspam"
//!
//! [operation]
//! manual = true
//! poll_interval_ms = 100
//!
//! [save]
//! path = "data"
//! basename = "WASPAM"
//!
//! [chopper]
//! positions = ["cold", "antenna", "hot", "antenna"]
//!
//! [wobbler]
//! positions = [3000, 3000, 7000, 7000]
//!
//! [housekeeping]
//! [frontend]
//!
//! [backends]
//! size = 1
//!
//! [[backends.spectrometer]]
//! name = "AFFTS"
//! boards = [{ channels = 1000, f_min_mhz = 0.0, f_max_mhz = 1500.0 }]
//! ```

use crate::consts::{DEFAULT_BASENAME, DEFAULT_NUM_TO_AVG, DEFAULT_POLL_INTERVAL_MS, MAX_CYCLE_LENGTH};
use crate::device::config::{BackendsConfig, ChopperConfig, DeviceConfig, WobblerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Development detail, including every cycle step.
    Debug,
    /// Lifecycle transitions.
    #[default]
    Info,
    /// Recoverable device faults.
    Warn,
    /// Failures.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Fields shared by every binary in the workspace.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "waspam"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instrument instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Filter directive for `log_level`, or `None` when `--verbose` or
    /// `RUST_LOG` already chose the verbosity.
    pub fn log_directive(&self, verbose: bool, env_filter_set: bool) -> Option<&'static str> {
        (!verbose && !env_filter_set).then(|| self.log_level.as_directive())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_path_buf())
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| {
            warn!("Cannot parse {}: {}", path.display(), e);
            ConfigError::ParseError(e.to_string())
        })
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Instrument schema ──────────────────────────────────────────────

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_num_to_avg() -> usize {
    DEFAULT_NUM_TO_AVG
}

fn default_basename() -> String {
    DEFAULT_BASENAME.to_string()
}

fn default_save_path() -> PathBuf {
    PathBuf::from(".")
}

/// Operation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Operator-driven session; development drivers refuse to start otherwise.
    #[serde(default)]
    pub manual: bool,

    /// Orchestrator and exchanger poll interval [ms].
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of calibrated spectra in the running average.
    #[serde(default = "default_num_to_avg")]
    pub num_to_avg: usize,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            manual: false,
            poll_interval_ms: default_poll_interval_ms(),
            num_to_avg: default_num_to_avg(),
        }
    }
}

impl OperationConfig {
    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Output file location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Output directory; relative paths resolve against the config file.
    #[serde(default = "default_save_path")]
    pub path: PathBuf,

    /// File base name (`<basename>.<day>.<n>.tsv`).
    #[serde(default = "default_basename")]
    pub basename: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            path: default_save_path(),
            basename: default_basename(),
        }
    }
}

/// Complete instrument configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiometerConfig {
    /// Shared settings.
    pub shared: SharedConfig,
    /// Operation settings.
    #[serde(default)]
    pub operation: OperationConfig,
    /// Output location.
    #[serde(default)]
    pub save: SaveConfig,
    /// Calibration-target chopper.
    pub chopper: ChopperConfig,
    /// Path-length wobbler.
    pub wobbler: WobblerConfig,
    /// Housekeeping unit.
    #[serde(default)]
    pub housekeeping: DeviceConfig,
    /// Receiver frontend.
    #[serde(default)]
    pub frontend: DeviceConfig,
    /// Spectrometer backends.
    #[serde(default)]
    pub backends: BackendsConfig,
}

impl RadiometerConfig {
    /// Load, resolve relative paths against the file's directory and validate.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        if let Err(e) = config.validate() {
            warn!("Configuration {} rejected: {}", path.display(), e);
            return Err(e);
        }
        info!(
            "Loaded configuration '{}' from {}",
            config.shared.service_name,
            path.display()
        );
        Ok(config)
    }

    /// Number of positions in one full cycle.
    pub fn cycle_length(&self) -> usize {
        self.chopper.positions.len()
    }

    /// Make a relative output directory absolute with respect to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.save.path.is_relative() {
            self.save.path = base.join(&self.save.path);
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - the chopper and wobbler tables differ in length or are empty
    /// - the cycle is longer than `MAX_CYCLE_LENGTH`
    /// - `backends.size` disagrees with the number of spectrometers
    /// - no spectrometer is configured, or names repeat
    /// - any device table is invalid
    /// - the poll interval is zero or the basename is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let n_chop = self.chopper.positions.len();
        let n_wob = self.wobbler.positions.len();
        if n_chop == 0 {
            return Err(ConfigError::ValidationError(
                "chopper.positions cannot be empty".to_string(),
            ));
        }
        if n_chop != n_wob {
            return Err(ConfigError::ValidationError(format!(
                "Need the same number of positions: chopper has {n_chop}, wobbler has {n_wob}"
            )));
        }
        if n_chop > MAX_CYCLE_LENGTH {
            return Err(ConfigError::ValidationError(format!(
                "Too many cycle positions: {n_chop} (max {MAX_CYCLE_LENGTH})"
            )));
        }

        let n_spec = self.backends.spectrometer.len();
        if let Some(size) = self.backends.size {
            if size != n_spec {
                return Err(ConfigError::ValidationError(format!(
                    "Bad backend count: declared {size}, configured {n_spec}"
                )));
            }
        }
        if n_spec == 0 {
            return Err(ConfigError::ValidationError(
                "At least one spectrometer backend is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for spec in &self.backends.spectrometer {
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate backend name: {}",
                    spec.name
                )));
            }
            spec.validate().map_err(validation)?;
        }

        self.chopper.device.validate("chopper").map_err(validation)?;
        self.wobbler.device.validate("wobbler").map_err(validation)?;
        self.housekeeping
            .validate("housekeeping")
            .map_err(validation)?;
        self.frontend.validate("frontend").map_err(validation)?;

        if self.operation.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.operation.num_to_avg == 0 {
            return Err(ConfigError::ValidationError(
                "num_to_avg must be greater than 0".to_string(),
            ));
        }
        if self.save.basename.is_empty() {
            return Err(ConfigError::ValidationError(
                "save.basename cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn validation(e: crate::device::driver::DeviceError) -> ConfigError {
    ConfigError::ValidationError(e.to_string())
}

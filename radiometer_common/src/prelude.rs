//! Prelude module for common re-exports.
//!
//! ```rust
//! use radiometer_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, OperationConfig, RadiometerConfig, SaveConfig, SharedConfig,
};
pub use crate::device::config::{
    BackendsConfig, BoardConfig, ChopperConfig, DeviceConfig, SpectrometerConfig, WobblerConfig,
};

// ─── Devices ────────────────────────────────────────────────────────
pub use crate::device::driver::{DeviceDriver, DeviceError, DriverFactory};
pub use crate::device::types::{ChopperPos, DeviceCommand, DeviceKind, Endpoint, Reading};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{COLD_LOAD_KEY, HOT_LOAD_KEY};

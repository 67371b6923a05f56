//! Device driver trait and error types.
//!
//! This module defines:
//! - `DeviceDriver` trait - Interface every subsystem driver implements
//! - `DeviceError` enum - Error types for device operations
//! - `DriverFactory` type alias - Factory function type

use crate::device::config::DeviceConfig;
use crate::device::types::{DeviceCommand, DeviceKind, Endpoint, Reading};
use thiserror::Error;

/// Error types for device operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Command not understood by this kind of device
    #[error("Unsupported command for {kind}: {command}")]
    UnsupportedCommand {
        /// Device kind that rejected the command
        kind: DeviceKind,
        /// Debug rendering of the command
        command: String,
    },

    /// Operation attempted before `startup()`/`init()` succeeded
    #[error("Device not ready: {0}")]
    NotReady(String),

    /// Closing the hardware connection failed
    #[error("Close failed: {0}")]
    CloseFailed(String),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn(&DeviceConfig) -> Box<dyn DeviceDriver>;

/// Trait defining the interface for subsystem drivers.
///
/// Controllers manage drivers exclusively through this trait; the
/// orchestrator never inspects which concrete driver it holds.
///
/// # Lifecycle
///
/// 1. `startup()` - Bind to the endpoint (open port / socket)
/// 2. `init()` - Bring the device into a runnable state
/// 3. `run()` / `get_data()` - Called once per measurement cycle
/// 4. `close()` - Release the hardware; safe after a partial startup
///
/// # Error Reporting
///
/// Every fallible call returns `Result`. In addition the driver latches its
/// last fault so that `has_error()` / `error_string()` keep reporting it until
/// `delete_error()` is called.
pub trait DeviceDriver: Send {
    /// Returns the driver's unique identifier (e.g., "dummy").
    fn name(&self) -> &'static str;

    /// Returns the subsystem this driver implements.
    fn kind(&self) -> DeviceKind;

    /// Bind to the hardware endpoint.
    fn startup(&mut self, endpoint: &Endpoint) -> Result<(), DeviceError>;

    /// Initialize the device. `manual` marks an operator-driven session.
    ///
    /// # Errors
    /// Return `DeviceError::InitFailed` if the device cannot be brought up.
    fn init(&mut self, manual: bool) -> Result<(), DeviceError>;

    /// Execute one command.
    fn run(&mut self, command: &DeviceCommand) -> Result<(), DeviceError>;

    /// Fetch the result of the last `run()`.
    ///
    /// `slot` is the cycle position for devices that keep per-position
    /// buffers (spectrometers); other devices ignore it.
    fn get_data(&mut self, slot: Option<usize>) -> Result<Reading, DeviceError>;

    /// Release the hardware.
    fn close(&mut self) -> Result<(), DeviceError>;

    /// True while a fault is latched.
    fn has_error(&self) -> bool;

    /// Description of the latched fault (empty when none).
    fn error_string(&self) -> String;

    /// Clear the latched fault.
    fn delete_error(&mut self);

    /// Block until a non-blocking move has settled (wobbler).
    /// Default: returns immediately.
    fn wait(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Whether the device wants calibration-load temperatures each cycle.
    /// Default: false
    fn needs_load_temperatures(&self) -> bool {
        false
    }

    /// Provide the current calibration-load temperatures [K].
    /// Default: no-op
    fn set_load_temperatures(&mut self, _cold_k: f64, _hot_k: f64) {}
}

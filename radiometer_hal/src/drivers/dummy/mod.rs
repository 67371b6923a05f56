//! Development drivers.
//!
//! Software stand-ins for every subsystem so the instrument can be run and
//! tested without hardware. They only accept operator-driven sessions:
//! `init(false)` latches "Must be manual, is dummy".
//!
//! | Kind | Behaviour |
//! |------|-----------|
//! | chopper | `MoveChopper` blocks for the move delay |
//! | wobbler | starts at step 4000, `wait()` blocks for the move delay |
//! | housekeeping | fixed cold/hot load temperatures |
//! | frontend | echoes the calibration-load temperatures it is given |
//! | spectrometer | sinusoid spectra per board, drifting each fetch |

mod chopper;
mod frontend;
mod housekeeping;
mod spectrometer;
mod wobbler;

pub use chopper::DummyChopper;
pub use frontend::DummyFrontend;
pub use housekeeping::DummyHousekeeping;
pub use spectrometer::DummySpectrometer;
pub use wobbler::DummyWobbler;

use radiometer_common::device::config::DeviceConfig;
use radiometer_common::device::driver::{DeviceDriver, DeviceError};
use radiometer_common::device::types::{DeviceCommand, DeviceKind, Endpoint};
use std::time::Duration;
use tracing::{debug, warn};

/// Driver name all development drivers register under.
pub const DUMMY_DRIVER_NAME: &str = "dummy";

/// Time a dummy chopper move, wobbler settle or acquisition takes.
pub const DUMMY_MOVE_DELAY: Duration = Duration::from_millis(100);

/// Message latched when a dummy is initialized outside an operator session.
pub const MUST_BE_MANUAL: &str = "Must be manual, is dummy";

/// Factory for the dummy chopper.
pub fn create_chopper(_config: &DeviceConfig) -> Box<dyn DeviceDriver> {
    Box::new(DummyChopper::new(DUMMY_MOVE_DELAY))
}

/// Factory for the dummy wobbler.
pub fn create_wobbler(_config: &DeviceConfig) -> Box<dyn DeviceDriver> {
    Box::new(DummyWobbler::new(DUMMY_MOVE_DELAY))
}

/// Factory for the dummy housekeeping unit.
pub fn create_housekeeping(_config: &DeviceConfig) -> Box<dyn DeviceDriver> {
    Box::new(DummyHousekeeping::new())
}

/// Factory for the dummy frontend.
pub fn create_frontend(_config: &DeviceConfig) -> Box<dyn DeviceDriver> {
    Box::new(DummyFrontend::new())
}

/// Factory for the dummy spectrometer; board layout comes from `config`.
pub fn create_spectrometer(config: &DeviceConfig) -> Box<dyn DeviceDriver> {
    Box::new(DummySpectrometer::from_config(config, DUMMY_MOVE_DELAY))
}

/// Lifecycle state and fault latch shared by the dummy drivers.
#[derive(Debug)]
pub(crate) struct DummyCore {
    kind: DeviceKind,
    bound: bool,
    initialized: bool,
    fault: Option<String>,
}

impl DummyCore {
    pub(crate) fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            bound: false,
            initialized: false,
            fault: None,
        }
    }

    pub(crate) fn startup(&mut self, endpoint: &Endpoint) -> Result<(), DeviceError> {
        debug!("Dummy {} bound to {}", self.kind, endpoint);
        self.bound = true;
        Ok(())
    }

    pub(crate) fn init(&mut self, manual: bool) -> Result<(), DeviceError> {
        if !self.bound {
            return Err(self.fail(DeviceError::NotReady(format!(
                "{} initialized before startup",
                self.kind
            ))));
        }
        if !manual {
            return Err(self.fail(DeviceError::InitFailed(MUST_BE_MANUAL.to_string())));
        }
        self.initialized = true;
        Ok(())
    }

    /// Fail unless `init()` has succeeded.
    pub(crate) fn ready(&mut self) -> Result<(), DeviceError> {
        if self.initialized {
            Ok(())
        } else {
            Err(self.fail(DeviceError::NotReady(format!(
                "{} is not initialized",
                self.kind
            ))))
        }
    }

    pub(crate) fn unsupported(&mut self, command: &DeviceCommand) -> DeviceError {
        self.fail(DeviceError::UnsupportedCommand {
            kind: self.kind,
            command: format!("{command:?}"),
        })
    }

    /// Latch `err` and hand it back for returning.
    pub(crate) fn fail(&mut self, err: DeviceError) -> DeviceError {
        warn!("Dummy {}: {}", self.kind, err);
        self.fault = Some(err.to_string());
        err
    }

    pub(crate) fn close(&mut self) {
        if self.bound {
            debug!("Dummy {} closed", self.kind);
        }
        self.bound = false;
        self.initialized = false;
    }

    pub(crate) fn has_error(&self) -> bool {
        self.fault.is_some()
    }

    pub(crate) fn error_string(&self) -> String {
        self.fault.clone().unwrap_or_default()
    }

    pub(crate) fn delete_error(&mut self) {
        self.fault = None;
    }
}

//! Dummy housekeeping unit.

use super::DummyCore;
use radiometer_common::consts::{COLD_LOAD_KEY, HOT_LOAD_KEY};
use radiometer_common::device::driver::{DeviceDriver, DeviceError};
use radiometer_common::device::types::{DeviceCommand, DeviceKind, Endpoint, Reading};
use std::collections::BTreeMap;

/// Cold load temperature reported by the dummy [K].
pub const DUMMY_COLD_LOAD_K: f64 = 18.0;

/// Hot load temperature reported by the dummy [K].
pub const DUMMY_HOT_LOAD_K: f64 = 297.0;

/// Housekeeping unit reporting fixed load temperatures.
pub struct DummyHousekeeping {
    core: DummyCore,
    acquired: bool,
}

impl DummyHousekeeping {
    /// Create an unbound housekeeping unit.
    pub fn new() -> Self {
        Self {
            core: DummyCore::new(DeviceKind::Housekeeping),
            acquired: false,
        }
    }
}

impl Default for DummyHousekeeping {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDriver for DummyHousekeeping {
    fn name(&self) -> &'static str {
        super::DUMMY_DRIVER_NAME
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Housekeeping
    }

    fn startup(&mut self, endpoint: &Endpoint) -> Result<(), DeviceError> {
        self.core.startup(endpoint)
    }

    fn init(&mut self, manual: bool) -> Result<(), DeviceError> {
        self.core.init(manual)
    }

    fn run(&mut self, command: &DeviceCommand) -> Result<(), DeviceError> {
        self.core.ready()?;
        match command {
            DeviceCommand::Acquire => {
                self.acquired = true;
                Ok(())
            }
            other => Err(self.core.unsupported(other)),
        }
    }

    fn get_data(&mut self, _slot: Option<usize>) -> Result<Reading, DeviceError> {
        self.core.ready()?;
        if !self.acquired {
            return Err(self
                .core
                .fail(DeviceError::NotReady("no acquisition started".to_string())));
        }
        self.acquired = false;
        let mut map = BTreeMap::new();
        map.insert(COLD_LOAD_KEY.to_string(), DUMMY_COLD_LOAD_K);
        map.insert(HOT_LOAD_KEY.to_string(), DUMMY_HOT_LOAD_K);
        Ok(Reading::Scalars(map))
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.core.close();
        Ok(())
    }

    fn has_error(&self) -> bool {
        self.core.has_error()
    }

    fn error_string(&self) -> String {
        self.core.error_string()
    }

    fn delete_error(&mut self) {
        self.core.delete_error();
    }
}

//! Dummy frontend.

use super::DummyCore;
use radiometer_common::device::driver::{DeviceDriver, DeviceError};
use radiometer_common::device::types::{DeviceCommand, DeviceKind, Endpoint, Reading};
use std::collections::BTreeMap;

/// Placeholder key reported when the frontend has no telemetry.
pub const NODATA_KEY: &str = "NODATA";

/// Frontend without telemetry.
///
/// With [`DummyFrontend::with_calibration_loads`] it asks for the load
/// temperatures each cycle and reports them back.
pub struct DummyFrontend {
    core: DummyCore,
    calibration_loads: bool,
    loads: Option<(f64, f64)>,
}

impl DummyFrontend {
    /// Frontend reporting only the `NODATA` placeholder.
    pub fn new() -> Self {
        Self {
            core: DummyCore::new(DeviceKind::Frontend),
            calibration_loads: false,
            loads: None,
        }
    }

    /// Frontend that houses its own calibration loads.
    pub fn with_calibration_loads() -> Self {
        Self {
            calibration_loads: true,
            ..Self::new()
        }
    }
}

impl Default for DummyFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDriver for DummyFrontend {
    fn name(&self) -> &'static str {
        super::DUMMY_DRIVER_NAME
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Frontend
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
            DeviceCommand::Acquire => Ok(()),
            other => Err(self.core.unsupported(other)),
        }
    }

    fn get_data(&mut self, _slot: Option<usize>) -> Result<Reading, DeviceError> {
        self.core.ready()?;
        let mut map = BTreeMap::new();
        match self.loads {
            Some((cold, hot)) => {
                map.insert("Frontend Cold Load".to_string(), cold);
                map.insert("Frontend Hot Load".to_string(), hot);
            }
            None => {
                map.insert(NODATA_KEY.to_string(), -1.0);
            }
        }
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

    fn needs_load_temperatures(&self) -> bool {
        self.calibration_loads
    }

    fn set_load_temperatures(&mut self, cold_k: f64, hot_k: f64) {
        if self.calibration_loads {
            self.loads = Some((cold_k, hot_k));
        }
    }
}

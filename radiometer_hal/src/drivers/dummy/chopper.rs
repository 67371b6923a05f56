//! Dummy chopper.

use super::DummyCore;
use radiometer_common::device::driver::{DeviceDriver, DeviceError};
use radiometer_common::device::types::{ChopperPos, DeviceCommand, DeviceKind, Endpoint, Reading};
use std::time::Duration;

/// Chopper that "moves" by sleeping.
pub struct DummyChopper {
    core: DummyCore,
    position: ChopperPos,
    move_delay: Duration,
}

impl DummyChopper {
    /// Create a chopper parked at the cold load.
    pub fn new(move_delay: Duration) -> Self {
        Self {
            core: DummyCore::new(DeviceKind::Chopper),
            position: ChopperPos::Cold,
            move_delay,
        }
    }
}

impl DeviceDriver for DummyChopper {
    fn name(&self) -> &'static str {
        super::DUMMY_DRIVER_NAME
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Chopper
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
            DeviceCommand::MoveChopper(target) => {
                std::thread::sleep(self.move_delay);
                self.position = *target;
                Ok(())
            }
            other => Err(self.core.unsupported(other)),
        }
    }

    fn get_data(&mut self, _slot: Option<usize>) -> Result<Reading, DeviceError> {
        self.core.ready()?;
        Ok(Reading::Chopper(self.position))
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

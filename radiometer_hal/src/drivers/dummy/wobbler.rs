//! Dummy wobbler.
//!
//! `MoveWobbler` only records the target; the position changes when
//! `wait()` returns, like a stepper that settles in the background.

use super::DummyCore;
use radiometer_common::device::driver::{DeviceDriver, DeviceError};
use radiometer_common::device::types::{DeviceCommand, DeviceKind, Endpoint, Reading};
use std::time::Duration;

/// Power-on step position.
pub const DUMMY_WOBBLER_HOME: i32 = 4000;

/// Wobbler whose settle time is a sleep.
pub struct DummyWobbler {
    core: DummyCore,
    position: i32,
    target: Option<i32>,
    settle_delay: Duration,
}

impl DummyWobbler {
    /// Create a wobbler at its home position.
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            core: DummyCore::new(DeviceKind::Wobbler),
            position: DUMMY_WOBBLER_HOME,
            target: None,
            settle_delay,
        }
    }
}

impl DeviceDriver for DummyWobbler {
    fn name(&self) -> &'static str {
        super::DUMMY_DRIVER_NAME
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Wobbler
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
            DeviceCommand::MoveWobbler(steps) => {
                self.target = Some(*steps);
                Ok(())
            }
            other => Err(self.core.unsupported(other)),
        }
    }

    fn wait(&mut self) -> Result<(), DeviceError> {
        self.core.ready()?;
        if let Some(target) = self.target.take() {
            std::thread::sleep(self.settle_delay);
            self.position = target;
        }
        Ok(())
    }

    fn get_data(&mut self, _slot: Option<usize>) -> Result<Reading, DeviceError> {
        self.core.ready()?;
        Ok(Reading::Wobbler(self.position))
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.target = None;
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

//! Dummy FFT spectrometer.
//!
//! Even boards carry `5 + cos(x)`, odd boards `5 + sin(x)` over two periods;
//! every fetch shifts `x` by 0.05 rad so live plots visibly move.

use super::DummyCore;
use radiometer_common::device::config::DeviceConfig;
use radiometer_common::device::driver::{DeviceDriver, DeviceError};
use radiometer_common::device::types::{DeviceCommand, DeviceKind, Endpoint, Reading};
use std::f32::consts::PI;
use std::time::Duration;

/// Board layout used when the configuration lists none.
const DEFAULT_BOARDS: usize = 2;
const DEFAULT_CHANNELS: usize = 1000;

/// Phase advance per fetch [rad].
const DRIFT_PER_FETCH: f32 = 0.05;

/// Spectrometer producing synthetic sinusoid spectra.
pub struct DummySpectrometer {
    core: DummyCore,
    phase: Vec<Vec<f32>>,
    acquiring: bool,
    integration_delay: Duration,
}

impl DummySpectrometer {
    /// Create a spectrometer with `channels[b]` channels on board `b`.
    pub fn new(channels: &[usize], integration_delay: Duration) -> Self {
        let phase = channels
            .iter()
            .map(|&n| {
                (0..n)
                    .map(|i| 4.0 * PI * i as f32 / n as f32)
                    .collect::<Vec<f32>>()
            })
            .collect();
        Self {
            core: DummyCore::new(DeviceKind::Spectrometer),
            phase,
            acquiring: false,
            integration_delay,
        }
    }

    /// Create from the board tables in `config`.
    pub fn from_config(config: &DeviceConfig, integration_delay: Duration) -> Self {
        let channels: Vec<usize> = if config.boards.is_empty() {
            vec![DEFAULT_CHANNELS; DEFAULT_BOARDS]
        } else {
            config.boards.iter().map(|b| b.channels).collect()
        };
        Self::new(&channels, integration_delay)
    }

    fn spectra(&self) -> Vec<Vec<f32>> {
        self.phase
            .iter()
            .enumerate()
            .map(|(board, xs)| {
                xs.iter()
                    .map(|&x| if board % 2 == 0 { 5.0 + x.cos() } else { 5.0 + x.sin() })
                    .collect()
            })
            .collect()
    }
}

impl DeviceDriver for DummySpectrometer {
    fn name(&self) -> &'static str {
        super::DUMMY_DRIVER_NAME
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Spectrometer
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
                self.acquiring = true;
                Ok(())
            }
            other => Err(self.core.unsupported(other)),
        }
    }

    fn get_data(&mut self, _slot: Option<usize>) -> Result<Reading, DeviceError> {
        self.core.ready()?;
        if !self.acquiring {
            return Err(self
                .core
                .fail(DeviceError::NotReady("no acquisition started".to_string())));
        }
        std::thread::sleep(self.integration_delay);
        for board in &mut self.phase {
            for x in board.iter_mut() {
                *x += DRIFT_PER_FETCH;
            }
        }
        self.acquiring = false;
        Ok(Reading::Spectra(self.spectra()))
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.acquiring = false;
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

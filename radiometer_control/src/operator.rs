//! Operator actions, as offered by the presentation layer.
//!
//! Each action checks the instrument state first and is refused with
//! [`ControlError::Operator`] when it does not apply, the same way the
//! control buttons are greyed out on the instrument panel.

use crate::controller::ControllerFlags;
use crate::error::ControlError;
use crate::instrument::Instrument;
use crate::saver::DataSaver;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Operator control surface.
pub struct OperatorPanel {
    instrument: Arc<Instrument>,
    saver: Arc<DataSaver>,
    active_errors: usize,
}

impl OperatorPanel {
    /// Panel over `instrument` and `saver`.
    pub fn new(instrument: Arc<Instrument>, saver: Arc<DataSaver>) -> Self {
        Self {
            instrument,
            saver,
            active_errors: 0,
        }
    }

    /// Bind and initialize every device. Only allowed while none is initialized.
    ///
    /// Returns the number of devices that failed.
    pub fn initialize(&mut self) -> Result<usize, ControlError> {
        if !self.instrument.none_init() {
            return Err(ControlError::Operator(
                "Initialize: some devices are already initialized".to_string(),
            ));
        }
        Ok(self.instrument.init_all())
    }

    /// Close every device. Needs all initialized and none running.
    pub fn close(&mut self) -> Result<(), ControlError> {
        if !self.instrument.all_init() {
            return Err(ControlError::Operator(
                "Close: not all devices are initialized".to_string(),
            ));
        }
        if self.instrument.any_run() {
            return Err(ControlError::Operator(
                "Close: stop the measurement first".to_string(),
            ));
        }
        let report = self.instrument.close_all();
        for failure in report.errors() {
            warn!("{failure}");
        }
        Ok(())
    }

    /// Start (or resume) cycling. Needs all initialized.
    pub fn start(&mut self) -> Result<(), ControlError> {
        if !self.instrument.all_init() {
            return Err(ControlError::Operator(
                "Run: not all devices are initialized".to_string(),
            ));
        }
        info!("Operator: run");
        self.instrument.ready_run_all();
        Ok(())
    }

    /// Pause cycling after the current pass. Needs all initialized.
    pub fn stop(&mut self) -> Result<(), ControlError> {
        if !self.instrument.all_init() {
            return Err(ControlError::Operator(
                "Stop: not all devices are initialized".to_string(),
            ));
        }
        info!("Operator: stop");
        self.instrument.unready_run_all();
        Ok(())
    }

    /// Shut the instrument down.
    pub fn quit(&mut self) {
        info!("Operator: quit");
        self.instrument.quit_all();
    }

    /// Count devices in error.
    ///
    /// The count is latched: once errors are shown it stays fixed until
    /// [`OperatorPanel::acknowledge`], so a fault is counted exactly once.
    pub fn poll_errors(&mut self) -> usize {
        if self.active_errors == 0 {
            self.active_errors = self
                .instrument
                .controllers()
                .filter(|c| c.has_error())
                .count();
        }
        self.active_errors
    }

    /// Latched error count.
    pub fn active_errors(&self) -> usize {
        self.active_errors
    }

    /// `(device, message)` for every device in error.
    pub fn error_messages(&self) -> Vec<(String, String)> {
        self.instrument.error_messages()
    }

    /// Clear every error and the latched count. Does not resume cycling.
    pub fn acknowledge(&mut self) {
        info!("Operator: acknowledged {} error(s)", self.active_errors);
        self.active_errors = 0;
        self.instrument.acknowledge_errors();
    }

    /// Switch the output directory. `dir` must be an existing directory.
    pub fn change_save_dir(&mut self, dir: &Path) -> Result<(), ControlError> {
        if !dir.is_dir() {
            return Err(ControlError::Operator(format!(
                "Not a directory: {}",
                dir.display()
            )));
        }
        self.saver.update_path(dir);
        Ok(())
    }

    /// `(device, flags)` for every device.
    pub fn status(&self) -> Vec<(String, ControllerFlags)> {
        self.instrument
            .controllers()
            .map(|c| (c.name().to_string(), c.flags()))
            .collect()
    }
}

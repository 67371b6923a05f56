//! The instrument: every controller plus the position tables.
//!
//! Built once from configuration through a [`DriverRegistry`] (or directly
//! from drivers in tests) and shared by reference between the
//! orchestrator, the exchanger and the operator panel.

use crate::controller::Controller;
use crate::error::{ControlError, ShutdownReport};
use crate::state::Guards;
use radiometer_common::config::{ConfigError, RadiometerConfig};
use radiometer_common::device::config::DeviceConfig;
use radiometer_common::device::driver::{DeviceDriver, DeviceError};
use radiometer_common::device::types::{ChopperPos, DeviceCommand, DeviceKind};
use radiometer_hal::DriverRegistry;
use std::time::Duration;
use tracing::{error, info, warn};

/// One driver ready to be wrapped in a controller.
pub struct DeviceSlot {
    /// Controller name.
    pub name: String,
    /// Device table.
    pub config: DeviceConfig,
    /// Driver instance.
    pub driver: Box<dyn DeviceDriver>,
}

impl DeviceSlot {
    /// Slot with a default device table.
    pub fn new(name: impl Into<String>, driver: Box<dyn DeviceDriver>) -> Self {
        Self {
            name: name.into(),
            config: DeviceConfig::default(),
            driver,
        }
    }
}

/// Drivers for every subsystem.
pub struct InstrumentDrivers {
    /// Calibration-target chopper.
    pub chopper: DeviceSlot,
    /// Path-length wobbler.
    pub wobbler: DeviceSlot,
    /// Housekeeping unit.
    pub housekeeping: DeviceSlot,
    /// Receiver frontend.
    pub frontend: DeviceSlot,
    /// Spectrometers, in configuration order.
    pub backends: Vec<DeviceSlot>,
}

/// All controllers of one radiometer.
pub struct Instrument {
    chopper: Controller,
    wobbler: Controller,
    housekeeping: Controller,
    frontend: Controller,
    backends: Vec<Controller>,
    chopper_positions: Vec<ChopperPos>,
    wobbler_positions: Vec<i32>,
    manual: bool,
    wakeup_rx: flume::Receiver<()>,
}

impl Instrument {
    /// Validate `config` and create every driver through `registry`.
    pub fn from_config(
        config: &RadiometerConfig,
        registry: &DriverRegistry,
    ) -> Result<Self, ControlError> {
        config.validate()?;

        let slot = |name: &str, kind: DeviceKind, device: &DeviceConfig| {
            registry
                .create_driver(kind, device)
                .map(|driver| DeviceSlot {
                    name: name.to_string(),
                    config: device.clone(),
                    driver,
                })
        };

        let drivers = InstrumentDrivers {
            chopper: slot("Chopper", DeviceKind::Chopper, &config.chopper.device)?,
            wobbler: slot("Wobbler", DeviceKind::Wobbler, &config.wobbler.device)?,
            housekeeping: slot("Housekeeping", DeviceKind::Housekeeping, &config.housekeeping)?,
            frontend: slot("Frontend", DeviceKind::Frontend, &config.frontend)?,
            backends: config
                .backends
                .spectrometer
                .iter()
                .map(|spec| slot(&spec.name, DeviceKind::Spectrometer, &spec.device))
                .collect::<Result<_, DeviceError>>()?,
        };

        Self::from_drivers(
            drivers,
            config.chopper.positions.clone(),
            config.wobbler.positions.clone(),
            config.operation.manual,
        )
    }

    /// Wrap ready-made drivers.
    ///
    /// # Errors
    ///
    /// `ControlError::Config` if the position tables are empty or differ in
    /// length, or if there is no backend.
    pub fn from_drivers(
        drivers: InstrumentDrivers,
        chopper_positions: Vec<ChopperPos>,
        wobbler_positions: Vec<i32>,
        manual: bool,
    ) -> Result<Self, ControlError> {
        if chopper_positions.is_empty() || chopper_positions.len() != wobbler_positions.len() {
            return Err(ConfigError::ValidationError(format!(
                "Need the same number of positions: chopper has {}, wobbler has {}",
                chopper_positions.len(),
                wobbler_positions.len()
            ))
            .into());
        }
        if drivers.backends.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one spectrometer backend is required".to_string(),
            )
            .into());
        }

        // One pending wakeup is enough to re-evaluate the guards.
        let (wakeup_tx, wakeup_rx) = flume::bounded(1);
        let wrap = |slot: DeviceSlot| {
            Controller::new(slot.name, slot.config, slot.driver, wakeup_tx.clone())
        };

        Ok(Self {
            chopper: wrap(drivers.chopper),
            wobbler: wrap(drivers.wobbler),
            housekeeping: wrap(drivers.housekeeping),
            frontend: wrap(drivers.frontend),
            backends: drivers.backends.into_iter().map(wrap).collect(),
            chopper_positions,
            wobbler_positions,
            manual,
            wakeup_rx,
        })
    }

    // ─── Accessors ──────────────────────────────────────────────────

    /// Chopper controller.
    pub fn chopper(&self) -> &Controller {
        &self.chopper
    }

    /// Wobbler controller.
    pub fn wobbler(&self) -> &Controller {
        &self.wobbler
    }

    /// Housekeeping controller.
    pub fn housekeeping(&self) -> &Controller {
        &self.housekeeping
    }

    /// Frontend controller.
    pub fn frontend(&self) -> &Controller {
        &self.frontend
    }

    /// Backend controllers in configuration order.
    pub fn backends(&self) -> &[Controller] {
        &self.backends
    }

    /// Backend by name.
    pub fn backend(&self, name: &str) -> Option<&Controller> {
        self.backends.iter().find(|b| b.name() == name)
    }

    /// Every controller: chopper, wobbler, housekeeping, frontend, backends.
    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        [&self.chopper, &self.wobbler, &self.housekeeping, &self.frontend]
            .into_iter()
            .chain(self.backends.iter())
    }

    /// Controllers whose samples go through the backpressure gate.
    pub fn gated(&self) -> impl Iterator<Item = &Controller> {
        self.backends
            .iter()
            .chain([&self.housekeeping, &self.frontend])
    }

    /// Number of positions in one cycle.
    pub fn cycle_length(&self) -> usize {
        self.chopper_positions.len()
    }

    /// Chopper target for `pos`.
    pub fn chopper_position(&self, pos: usize) -> ChopperPos {
        self.chopper_positions[pos % self.chopper_positions.len()]
    }

    /// Wobbler target for `pos`.
    pub fn wobbler_position(&self, pos: usize) -> i32 {
        self.wobbler_positions[pos % self.wobbler_positions.len()]
    }

    /// Chopper position table.
    pub fn chopper_positions(&self) -> &[ChopperPos] {
        &self.chopper_positions
    }

    /// Operator-driven session.
    pub fn manual(&self) -> bool {
        self.manual
    }

    // ─── Guards ─────────────────────────────────────────────────────

    /// `init` on every controller.
    pub fn all_init(&self) -> bool {
        self.controllers().all(Controller::is_init)
    }

    /// `init` on no controller.
    pub fn none_init(&self) -> bool {
        !self.controllers().any(Controller::is_init)
    }

    /// `run` on every controller.
    pub fn all_run(&self) -> bool {
        self.controllers().all(Controller::is_running)
    }

    /// `run` on any controller.
    pub fn any_run(&self) -> bool {
        self.controllers().any(Controller::is_running)
    }

    /// `has_error()` on any controller.
    pub fn any_error(&self) -> bool {
        self.controllers().any(Controller::has_error)
    }

    /// `quit` on any controller.
    pub fn any_quit(&self) -> bool {
        self.controllers().any(Controller::quit_requested)
    }

    /// Some gated controller still holds an unconsumed sample.
    pub fn pending_newdata(&self) -> bool {
        self.gated().any(Controller::has_newdata)
    }

    /// Sample every guard at once.
    pub fn guards(&self) -> Guards {
        Guards {
            all_init: self.all_init(),
            all_run: self.all_run(),
            any_error: self.any_error(),
            any_quit: self.any_quit(),
        }
    }

    /// `(controller, message)` for every controller in error.
    pub fn error_messages(&self) -> Vec<(String, String)> {
        self.controllers()
            .filter(|c| c.has_error())
            .map(|c| (c.name().to_string(), c.error_string()))
            .collect()
    }

    /// Block until an operator action or `timeout`. True when woken.
    pub fn wait_for_wakeup(&self, timeout: Duration) -> bool {
        self.wakeup_rx.recv_timeout(timeout).is_ok()
    }

    // ─── Instrument-wide operations ─────────────────────────────────

    /// Bind and initialize every device.
    ///
    /// Order: housekeeping, frontend, wobbler (then homed to the first
    /// position), chopper, backends. Each success sets `init`; a failure is
    /// left on the controller's `error` flag and the rest still run.
    /// Returns the number of failed devices.
    pub fn init_all(&self) -> usize {
        info!("Initializing instrument ({} backends)", self.backends.len());
        let mut failures = 0;

        for ctrl in [&self.housekeeping, &self.frontend] {
            failures += usize::from(!self.bring_up(ctrl));
        }

        let home = self.wobbler_position(0);
        let wobbler_ok = self.bring_up_with(&self.wobbler, || {
            self.wobbler
                .run_command(&DeviceCommand::MoveWobbler(home))
                .and_then(|()| self.wobbler.wait())
        });
        failures += usize::from(!wobbler_ok);

        failures += usize::from(!self.bring_up(&self.chopper));
        for backend in &self.backends {
            failures += usize::from(!self.bring_up(backend));
        }

        if failures == 0 {
            info!("All devices initialized");
        } else {
            warn!("{failures} device(s) failed to initialize");
        }
        failures
    }

    fn bring_up(&self, ctrl: &Controller) -> bool {
        self.bring_up_with(ctrl, || Ok(()))
    }

    fn bring_up_with(
        &self,
        ctrl: &Controller,
        after: impl FnOnce() -> Result<(), DeviceError>,
    ) -> bool {
        let result = ctrl
            .startup()
            .and_then(|()| ctrl.initialize(self.manual))
            .and_then(|()| after());
        match result {
            Ok(()) => {
                ctrl.set_init(true);
                info!("{} initialized", ctrl.name());
                true
            }
            Err(e) => {
                error!("{} failed to initialize: {}", ctrl.name(), e);
                false
            }
        }
    }

    /// Close every device; each failure is recorded and the rest still close.
    pub fn close_all(&self) -> ShutdownReport {
        let mut report = ShutdownReport::new();
        for ctrl in self.controllers() {
            ctrl.set_run(false);
            if let Err(e) = ctrl.close() {
                error!("{} failed to close: {}", ctrl.name(), e);
                report.push(ctrl.name(), e);
            }
        }
        if report.is_clean() {
            info!("All devices closed");
        }
        report
    }

    /// Set `run` on every controller.
    pub fn ready_run_all(&self) {
        for ctrl in self.controllers() {
            ctrl.set_run(true);
        }
    }

    /// Clear `run` on every controller.
    pub fn unready_run_all(&self) {
        for ctrl in self.controllers() {
            ctrl.set_run(false);
        }
    }

    /// Set `quit` on every controller.
    pub fn quit_all(&self) {
        for ctrl in self.controllers() {
            ctrl.request_quit();
        }
    }

    /// Clear `error` on every controller and its driver.
    pub fn acknowledge_errors(&self) {
        for ctrl in self.controllers() {
            ctrl.delete_error();
        }
    }

    /// Clear `operating` and `waiting` after an aborted cycle.
    pub fn clear_activity(&self) {
        for ctrl in self.controllers() {
            ctrl.set_operating(false);
            ctrl.set_waiting(false);
        }
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("controllers", &self.controllers().collect::<Vec<_>>())
            .field("chopper_positions", &self.chopper_positions)
            .field("wobbler_positions", &self.wobbler_positions)
            .field("manual", &self.manual)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[shared]
service_name = "instrument-test"

[operation]
manual = true

[chopper]
positions = ["cold", "antenna", "hot", "antenna"]

[wobbler]
positions = [3000, 3000, 7000, 7000]

[[backends.spectrometer]]
name = "AFFTS"
boards = [{ channels = 16, f_min_mhz = 0.0, f_max_mhz = 1500.0 }]

[[backends.spectrometer]]
name = "XFFTS"
boards = [{ channels = 8, f_min_mhz = 0.0, f_max_mhz = 2500.0 }]
"#;

    fn config() -> RadiometerConfig {
        toml::from_str(CONFIG).unwrap()
    }

    fn instrument(cfg: &RadiometerConfig) -> Instrument {
        Instrument::from_config(cfg, &DriverRegistry::with_builtin_drivers()).unwrap()
    }

    #[test]
    fn builds_controllers_in_fixed_order() {
        let inst = instrument(&config());
        let names: Vec<&str> = inst.controllers().map(Controller::name).collect();
        assert_eq!(
            names,
            ["Chopper", "Wobbler", "Housekeeping", "Frontend", "AFFTS", "XFFTS"]
        );
        assert_eq!(inst.cycle_length(), 4);
        assert_eq!(inst.chopper_position(2), ChopperPos::Hot);
        assert_eq!(inst.wobbler_position(5), 3000);
        assert!(inst.backend("XFFTS").is_some());
        assert!(inst.none_init());
    }

    #[test]
    fn mismatched_tables_fail_before_any_driver_is_built() {
        let mut cfg = config();
        cfg.wobbler.positions.pop();
        let err = Instrument::from_config(&cfg, &DriverRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("chopper has 4, wobbler has 3"));
    }

    #[test]
    fn unknown_driver_is_fatal() {
        let mut cfg = config();
        cfg.frontend.driver = "sis-mixer".to_string();
        let err = Instrument::from_config(&cfg, &DriverRegistry::with_builtin_drivers())
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::Driver(DeviceError::DriverNotFound(_))
        ));
    }

    #[test]
    fn init_all_and_close_all() {
        let inst = instrument(&config());
        assert_eq!(inst.init_all(), 0);
        assert!(inst.all_init());
        assert!(!inst.any_error());

        inst.ready_run_all();
        assert!(inst.guards().ready());
        inst.unready_run_all();
        assert!(!inst.any_run());

        let report = inst.close_all();
        assert!(report.is_clean());
        assert!(inst.none_init());
    }

    #[test]
    fn automatic_session_fails_every_dummy() {
        let mut cfg = config();
        cfg.operation.manual = false;
        let inst = instrument(&cfg);
        assert_eq!(inst.init_all(), 6);
        assert!(inst.none_init());
        assert_eq!(inst.error_messages().len(), 6);

        inst.acknowledge_errors();
        assert!(!inst.any_error());
        assert!(inst.close_all().is_clean());
    }

    #[test]
    fn quit_all_wakes_the_orchestrator() {
        let inst = instrument(&config());
        assert!(!inst.wait_for_wakeup(Duration::from_millis(1)));
        inst.quit_all();
        assert!(inst.any_quit());
        assert!(inst.wait_for_wakeup(Duration::from_millis(1)));
    }
}

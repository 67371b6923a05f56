//! Per-device controller.
//!
//! A `Controller` owns one driver and exposes the seven status flags shared
//! between the orchestrator, the exchanger and the operator:
//!
//! | Flag | Written by | Meaning |
//! |------|------------|---------|
//! | `init` | operator | device bound and initialized |
//! | `error` | controller, operator (clear) | last operation failed |
//! | `quit` | operator / signal | shut the instrument down |
//! | `run` | operator | device may take part in cycles |
//! | `operating` | orchestrator | a command is in progress |
//! | `waiting` | orchestrator | blocked on the device |
//! | `newdata` | orchestrator (set), exchanger (clear) | `data` holds an unconsumed sample |
//!
//! Flags are atomics and can be read from any thread without locking. The
//! driver sits behind a mutex that is held for the duration of one device
//! call. Operator writes to `init`, `run` and `quit` nudge the shared wakeup
//! channel so the orchestrator re-evaluates its guards immediately.

use bitflags::bitflags;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use radiometer_common::device::config::DeviceConfig;
use radiometer_common::device::driver::{DeviceDriver, DeviceError};
use radiometer_common::device::types::{DeviceCommand, DeviceKind, Reading};
use static_assertions::assert_impl_all;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

bitflags! {
    /// Snapshot of a controller's status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControllerFlags: u8 {
        /// Bound and initialized.
        const INIT      = 0x01;
        /// Last operation failed.
        const ERROR     = 0x02;
        /// Shutdown requested.
        const QUIT      = 0x04;
        /// Allowed to cycle.
        const RUN       = 0x08;
        /// Command in progress.
        const OPERATING = 0x10;
        /// Blocked on the device.
        const WAITING   = 0x20;
        /// Unconsumed sample in `data`.
        const NEWDATA   = 0x40;
    }
}

/// One fetched payload, tagged with the cycle that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Orchestrator cycle counter.
    pub cycle: u64,
    /// Position index within the cycle.
    pub pos: usize,
    /// Fetched data.
    pub reading: Reading,
    /// Time the sample was stored.
    pub timestamp: DateTime<Local>,
}

/// Driver plus shared status for one subsystem.
pub struct Controller {
    name: String,
    kind: DeviceKind,
    config: DeviceConfig,
    driver: Mutex<Box<dyn DeviceDriver>>,
    bound: AtomicBool,
    init: AtomicBool,
    error: AtomicBool,
    quit: AtomicBool,
    run: AtomicBool,
    operating: AtomicBool,
    waiting: AtomicBool,
    newdata: AtomicBool,
    last_error: Mutex<String>,
    data: Mutex<Option<Sample>>,
    wakeup: flume::Sender<()>,
}

assert_impl_all!(Controller: Send, Sync);

impl Controller {
    /// Wrap `driver`. `wakeup` is nudged on every operator-side flag change.
    pub fn new(
        name: impl Into<String>,
        config: DeviceConfig,
        driver: Box<dyn DeviceDriver>,
        wakeup: flume::Sender<()>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: driver.kind(),
            config,
            driver: Mutex::new(driver),
            bound: AtomicBool::new(false),
            init: AtomicBool::new(false),
            error: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            run: AtomicBool::new(false),
            operating: AtomicBool::new(false),
            waiting: AtomicBool::new(false),
            newdata: AtomicBool::new(false),
            last_error: Mutex::new(String::new()),
            data: Mutex::new(None),
            wakeup,
        }
    }

    /// Controller name (backend name, or the device kind).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device kind of the wrapped driver.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Device configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    // ─── Device operations ──────────────────────────────────────────

    /// Bind the driver to its configured endpoint.
    pub fn startup(&self) -> Result<(), DeviceError> {
        debug!("Binding {}", self.name);
        let endpoint = &self.config.endpoint;
        self.call(|d| d.startup(endpoint))?;
        self.bound.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Initialize the device. On success `init` is left for the caller to set.
    pub fn initialize(&self, manual: bool) -> Result<(), DeviceError> {
        debug!("Initializing {}", self.name);
        self.call(|d| d.init(manual))
    }

    /// Issue one command.
    pub fn run_command(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        self.call(|d| d.run(command))
    }

    /// Fetch the result of the last command.
    pub fn fetch(&self, slot: Option<usize>) -> Result<Reading, DeviceError> {
        self.call(|d| d.get_data(slot))
    }

    /// Block until a non-blocking move has settled.
    pub fn wait(&self) -> Result<(), DeviceError> {
        self.call(|d| d.wait())
    }

    /// Release the device. Harmless when `startup()` never succeeded.
    pub fn close(&self) -> Result<(), DeviceError> {
        self.init.store(false, Ordering::SeqCst);
        self.operating.store(false, Ordering::SeqCst);
        self.waiting.store(false, Ordering::SeqCst);
        if !self.bound.swap(false, Ordering::SeqCst) {
            debug!("{} was never bound, nothing to close", self.name);
            return Ok(());
        }
        debug!("Closing {}", self.name);
        self.call(|d| d.close())
    }

    /// Whether the driver wants calibration-load temperatures.
    pub fn needs_load_temperatures(&self) -> bool {
        self.driver.lock().needs_load_temperatures()
    }

    /// Forward calibration-load temperatures to the driver.
    pub fn set_load_temperatures(&self, cold_k: f64, hot_k: f64) {
        self.driver.lock().set_load_temperatures(cold_k, hot_k);
    }

    /// Run `f` on the driver; any failure or latched fault sets `error`.
    fn call<T>(
        &self,
        f: impl FnOnce(&mut dyn DeviceDriver) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        let mut driver = self.driver.lock();
        match f(driver.as_mut()) {
            Ok(value) if !driver.has_error() => Ok(value),
            Ok(_) => {
                let err = DeviceError::CommunicationError(driver.error_string());
                drop(driver);
                self.record_failure(&err);
                Err(err)
            }
            Err(err) => {
                drop(driver);
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    fn record_failure(&self, err: &DeviceError) {
        warn!("{} error: {}", self.name, err);
        *self.last_error.lock() = err.to_string();
        self.error.store(true, Ordering::SeqCst);
    }

    // ─── Errors ─────────────────────────────────────────────────────

    /// True if the last operation failed or the driver has a latched fault.
    ///
    /// While another thread is inside a device call only the `error` flag
    /// is consulted.
    pub fn has_error(&self) -> bool {
        if self.error.load(Ordering::SeqCst) {
            return true;
        }
        self.driver
            .try_lock()
            .is_some_and(|driver| driver.has_error())
    }

    /// Description of the last failure.
    pub fn error_string(&self) -> String {
        let recorded = self.last_error.lock().clone();
        if !recorded.is_empty() {
            return recorded;
        }
        self.driver
            .try_lock()
            .map(|driver| driver.error_string())
            .unwrap_or_default()
    }

    /// Acknowledge: clear the `error` flag and the driver's latched fault.
    ///
    /// A persisting hardware problem fails again on the next operation.
    pub fn delete_error(&self) {
        self.error.store(false, Ordering::SeqCst);
        self.last_error.lock().clear();
        self.driver.lock().delete_error();
        self.nudge();
    }

    // ─── Flags ──────────────────────────────────────────────────────

    /// `init` flag.
    pub fn is_init(&self) -> bool {
        self.init.load(Ordering::SeqCst)
    }

    /// Set `init` (operator).
    pub fn set_init(&self, value: bool) {
        self.init.store(value, Ordering::SeqCst);
        self.nudge();
    }

    /// `error` flag only, without consulting the driver.
    pub fn error_flag(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }

    /// `quit` flag.
    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Set `quit` (operator or signal handler).
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
        self.nudge();
    }

    /// `run` flag.
    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::SeqCst)
    }

    /// Set `run` (operator).
    pub fn set_run(&self, value: bool) {
        self.run.store(value, Ordering::SeqCst);
        self.nudge();
    }

    /// `operating` flag.
    pub fn is_operating(&self) -> bool {
        self.operating.load(Ordering::SeqCst)
    }

    /// Set `operating` (orchestrator).
    pub fn set_operating(&self, value: bool) {
        self.operating.store(value, Ordering::SeqCst);
    }

    /// `waiting` flag.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Set `waiting` (orchestrator).
    pub fn set_waiting(&self, value: bool) {
        self.waiting.store(value, Ordering::SeqCst);
    }

    /// `newdata` flag.
    pub fn has_newdata(&self) -> bool {
        self.newdata.load(Ordering::SeqCst)
    }

    /// Set `newdata` (orchestrator sets, exchanger clears).
    pub fn set_newdata(&self, value: bool) {
        self.newdata.store(value, Ordering::SeqCst);
    }

    /// All flags at once.
    pub fn flags(&self) -> ControllerFlags {
        let mut flags = ControllerFlags::empty();
        flags.set(ControllerFlags::INIT, self.is_init());
        flags.set(ControllerFlags::ERROR, self.error_flag());
        flags.set(ControllerFlags::QUIT, self.quit_requested());
        flags.set(ControllerFlags::RUN, self.is_running());
        flags.set(ControllerFlags::OPERATING, self.is_operating());
        flags.set(ControllerFlags::WAITING, self.is_waiting());
        flags.set(ControllerFlags::NEWDATA, self.has_newdata());
        flags
    }

    // ─── Data ───────────────────────────────────────────────────────

    /// Replace the stored sample (orchestrator).
    pub fn store(&self, sample: Sample) {
        *self.data.lock() = Some(sample);
    }

    /// Copy of the stored sample.
    pub fn data(&self) -> Option<Sample> {
        self.data.lock().clone()
    }

    fn nudge(&self) {
        // A full channel already holds a pending wakeup.
        let _ = self.wakeup.try_send(());
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("flags", &self.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiometer_common::device::types::Endpoint;

    /// Driver whose next operation can be made to fail.
    #[derive(Default)]
    struct FlakyDriver {
        fail_next: Option<DeviceError>,
        latch_only: bool,
        fault: Option<String>,
        closes: usize,
    }

    impl FlakyDriver {
        fn outcome(&mut self) -> Result<(), DeviceError> {
            match self.fail_next.take() {
                Some(err) if self.latch_only => {
                    self.fault = Some(err.to_string());
                    Ok(())
                }
                Some(err) => {
                    self.fault = Some(err.to_string());
                    Err(err)
                }
                None => Ok(()),
            }
        }
    }

    impl DeviceDriver for FlakyDriver {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn kind(&self) -> DeviceKind {
            DeviceKind::Housekeeping
        }
        fn startup(&mut self, _endpoint: &Endpoint) -> Result<(), DeviceError> {
            self.outcome()
        }
        fn init(&mut self, _manual: bool) -> Result<(), DeviceError> {
            self.outcome()
        }
        fn run(&mut self, _command: &DeviceCommand) -> Result<(), DeviceError> {
            self.outcome()
        }
        fn get_data(&mut self, _slot: Option<usize>) -> Result<Reading, DeviceError> {
            self.outcome().map(|()| Reading::Empty)
        }
        fn close(&mut self) -> Result<(), DeviceError> {
            self.closes += 1;
            self.outcome()
        }
        fn has_error(&self) -> bool {
            self.fault.is_some()
        }
        fn error_string(&self) -> String {
            self.fault.clone().unwrap_or_default()
        }
        fn delete_error(&mut self) {
            self.fault = None;
        }
    }

    fn controller(driver: FlakyDriver) -> (Controller, flume::Receiver<()>) {
        let (tx, rx) = flume::bounded(1);
        (
            Controller::new("hk", DeviceConfig::default(), Box::new(driver), tx),
            rx,
        )
    }

    #[test]
    fn new_controller_has_no_flags() {
        let (ctrl, _rx) = controller(FlakyDriver::default());
        assert_eq!(ctrl.flags(), ControllerFlags::empty());
        assert_eq!(ctrl.kind(), DeviceKind::Housekeeping);
        assert!(ctrl.data().is_none());
    }

    #[test]
    fn failed_call_sets_error_and_keeps_init_clear() {
        let (ctrl, _rx) = controller(FlakyDriver {
            fail_next: Some(DeviceError::InitFailed("no answer".to_string())),
            ..FlakyDriver::default()
        });
        assert!(ctrl.startup().is_err());
        assert!(ctrl.has_error());
        assert!(ctrl.error_flag());
        assert!(!ctrl.is_init());
        assert_eq!(ctrl.error_string(), "Initialization failed: no answer");
    }

    #[test]
    fn latched_fault_without_err_is_still_reported() {
        let (ctrl, _rx) = controller(FlakyDriver {
            fail_next: Some(DeviceError::CommunicationError("crc".to_string())),
            latch_only: true,
            ..FlakyDriver::default()
        });
        let err = ctrl.run_command(&DeviceCommand::Acquire).unwrap_err();
        assert!(err.to_string().contains("crc"));
        assert!(ctrl.error_flag());
    }

    #[test]
    fn delete_error_clears_flag_and_driver_latch() {
        let (ctrl, rx) = controller(FlakyDriver {
            fail_next: Some(DeviceError::CommunicationError("timeout".to_string())),
            ..FlakyDriver::default()
        });
        assert!(ctrl.run_command(&DeviceCommand::Acquire).is_err());
        ctrl.delete_error();
        assert!(!ctrl.has_error());
        assert!(ctrl.error_string().is_empty());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn close_without_startup_skips_driver() {
        let (ctrl, _rx) = controller(FlakyDriver::default());
        assert!(ctrl.close().is_ok());
        assert_eq!(ctrl.driver.lock().error_string(), "");
    }

    #[test]
    fn close_after_startup_reaches_driver_and_clears_init() {
        let (ctrl, _rx) = controller(FlakyDriver::default());
        ctrl.startup().unwrap();
        ctrl.set_init(true);
        ctrl.close().unwrap();
        assert!(!ctrl.is_init());
        // second close is a no-op
        ctrl.close().unwrap();
    }

    #[test]
    fn operator_flag_writes_nudge_wakeup() {
        let (ctrl, rx) = controller(FlakyDriver::default());
        ctrl.set_run(true);
        ctrl.request_quit();
        // bounded(1): coalesced into a single pending wakeup
        assert_eq!(rx.len(), 1);
        assert!(ctrl.flags().contains(ControllerFlags::RUN | ControllerFlags::QUIT));
    }

    #[test]
    fn orchestrator_flags_do_not_nudge() {
        let (ctrl, rx) = controller(FlakyDriver::default());
        ctrl.set_operating(true);
        ctrl.set_waiting(true);
        ctrl.set_newdata(true);
        assert!(rx.is_empty());
        assert_eq!(
            ctrl.flags(),
            ControllerFlags::OPERATING | ControllerFlags::WAITING | ControllerFlags::NEWDATA
        );
    }

    #[test]
    fn store_and_copy_sample() {
        let (ctrl, _rx) = controller(FlakyDriver::default());
        let sample = Sample {
            cycle: 7,
            pos: 2,
            reading: Reading::Wobbler(3000),
            timestamp: Local::now(),
        };
        ctrl.store(sample.clone());
        assert_eq!(ctrl.data(), Some(sample));
    }
}

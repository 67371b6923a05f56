//! Scripted drivers and a running pipeline for orchestrator tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use radiometer_common::prelude::*;
use radiometer_control::cycle::{Orchestrator, RunReport};
use radiometer_control::exchange::{self, ExchangeStats, Exchanger};
use radiometer_control::instrument::{DeviceSlot, Instrument, InstrumentDrivers};
use radiometer_control::live::LiveData;
use radiometer_control::saver::DataSaver;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const POLL: Duration = Duration::from_millis(20);
pub const TIMEOUT: Duration = Duration::from_secs(10);

pub const CHOPPER: [ChopperPos; 4] = [
    ChopperPos::Cold,
    ChopperPos::Antenna,
    ChopperPos::Hot,
    ChopperPos::Antenna,
];
pub const WOBBLER: [i32; 4] = [3000, 3000, 7000, 7000];

// ── Call log ────────────────────────────────────────────────────────

/// Every driver call of every device, in order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().clone()
}

pub fn count(log: &CallLog, needle: &str) -> usize {
    log.lock().iter().filter(|c| c.contains(needle)).count()
}

pub fn clear(log: &CallLog) {
    log.lock().clear();
}

// ── Scripted driver ─────────────────────────────────────────────────

/// Failures to inject into one device.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Fail `init()`.
    pub fail_init: bool,
    /// Fail the n-th `get_data()` call (1-based), once.
    pub fail_fetch_on: Option<usize>,
    /// Fail `close()`.
    pub fail_close: bool,
    /// Ask for calibration-load temperatures every cycle.
    pub wants_loads: bool,
}

pub struct ScriptedDriver {
    label: String,
    kind: DeviceKind,
    log: CallLog,
    script: Script,
    fetches: usize,
    fault: Option<String>,
}

impl ScriptedDriver {
    pub fn new(label: &str, kind: DeviceKind, log: &CallLog, script: Script) -> Self {
        Self {
            label: label.to_string(),
            kind,
            log: Arc::clone(log),
            script,
            fetches: 0,
            fault: None,
        }
    }

    fn note(&self, call: String) {
        self.log.lock().push(format!("{} {}", self.label, call));
    }

    fn fail(&mut self, err: DeviceError) -> DeviceError {
        self.fault = Some(err.to_string());
        err
    }
}

impl DeviceDriver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn startup(&mut self, _endpoint: &Endpoint) -> Result<(), DeviceError> {
        self.note("startup".to_string());
        Ok(())
    }

    fn init(&mut self, _manual: bool) -> Result<(), DeviceError> {
        self.note("init".to_string());
        if self.script.fail_init {
            return Err(self.fail(DeviceError::InitFailed("injected".to_string())));
        }
        Ok(())
    }

    fn run(&mut self, command: &DeviceCommand) -> Result<(), DeviceError> {
        self.note(format!("run {command:?}"));
        Ok(())
    }

    fn get_data(&mut self, slot: Option<usize>) -> Result<Reading, DeviceError> {
        self.note(format!("get_data {slot:?}"));
        self.fetches += 1;
        if self.script.fail_fetch_on == Some(self.fetches) {
            return Err(self.fail(DeviceError::CommunicationError("injected".to_string())));
        }
        Ok(match self.kind {
            DeviceKind::Spectrometer => {
                let level = slot.unwrap_or_default() as f32 + 1.0;
                Reading::Spectra(vec![vec![level; 4]])
            }
            // 18 K / 297 K on the first fetch, one kelvin warmer each fetch after.
            DeviceKind::Housekeeping => {
                let drift = self.fetches as f64;
                Reading::Scalars(BTreeMap::from([
                    (COLD_LOAD_KEY.to_string(), 17.0 + drift),
                    (HOT_LOAD_KEY.to_string(), 296.0 + drift),
                ]))
            }
            DeviceKind::Frontend => Reading::Scalars(BTreeMap::from([("LO".to_string(), 1.0)])),
            _ => Reading::Empty,
        })
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.note("close".to_string());
        if self.script.fail_close {
            return Err(self.fail(DeviceError::CloseFailed("injected".to_string())));
        }
        Ok(())
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

    fn wait(&mut self) -> Result<(), DeviceError> {
        self.note("wait".to_string());
        Ok(())
    }

    fn needs_load_temperatures(&self) -> bool {
        self.script.wants_loads
    }

    fn set_load_temperatures(&mut self, cold_k: f64, hot_k: f64) {
        self.note(format!("set_load_temperatures {cold_k} {hot_k}"));
    }
}

// ── Instrument ──────────────────────────────────────────────────────

/// Chopper, Wobbler, Housekeeping, Frontend and backends AFFTS and XFFTS,
/// each scripted by `script(name)`.
pub fn instrument(log: &CallLog, script: impl Fn(&str) -> Script) -> Instrument {
    let slot = |name: &str, kind: DeviceKind| {
        DeviceSlot::new(
            name,
            Box::new(ScriptedDriver::new(name, kind, log, script(name))),
        )
    };
    Instrument::from_drivers(
        InstrumentDrivers {
            chopper: slot("Chopper", DeviceKind::Chopper),
            wobbler: slot("Wobbler", DeviceKind::Wobbler),
            housekeeping: slot("Housekeeping", DeviceKind::Housekeeping),
            frontend: slot("Frontend", DeviceKind::Frontend),
            backends: vec![
                slot("AFFTS", DeviceKind::Spectrometer),
                slot("XFFTS", DeviceKind::Spectrometer),
            ],
        },
        CHOPPER.to_vec(),
        WOBBLER.to_vec(),
        true,
    )
    .unwrap()
}

pub fn no_faults(_: &str) -> Script {
    Script::default()
}

// ── Pipeline ────────────────────────────────────────────────────────

/// Orchestrator and exchanger running on their own threads.
pub struct Pipeline {
    pub instrument: Arc<Instrument>,
    pub saver: Arc<DataSaver>,
    pub live: Arc<LiveData>,
    pub dir: tempfile::TempDir,
    orchestrator: JoinHandle<RunReport>,
    exchanger: JoinHandle<ExchangeStats>,
}

impl Pipeline {
    pub fn start(instrument: Instrument, cycle_limit: Option<u64>) -> Self {
        let instrument = Arc::new(instrument);
        let dir = tempfile::tempdir().unwrap();
        let saver = Arc::new(DataSaver::new(dir.path(), "test"));
        let live = Arc::new(LiveData::new(
            instrument
                .backends()
                .iter()
                .map(|b| (b.name().to_string(), vec![vec![0.0; 4]]))
                .collect(),
            10,
        ));
        let (link, end) = exchange::channel();
        let exchanger = Exchanger::new(
            Arc::clone(&instrument),
            Arc::clone(&saver),
            Arc::clone(&live),
            end,
            POLL,
        )
        .spawn()
        .unwrap();
        let mut orchestrator = Orchestrator::new(Arc::clone(&instrument), link, POLL);
        if let Some(n) = cycle_limit {
            orchestrator = orchestrator.with_cycle_limit(n);
        }
        let orchestrator = orchestrator.spawn().unwrap();
        Self {
            instrument,
            saver,
            live,
            dir,
            orchestrator,
            exchanger,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.orchestrator.is_finished()
    }

    /// Join both threads, failing the test if the orchestrator hangs.
    pub fn finish(self) -> (RunReport, ExchangeStats, tempfile::TempDir) {
        assert!(
            wait_until(TIMEOUT, || self.orchestrator.is_finished()),
            "orchestrator did not close"
        );
        let report = self.orchestrator.join().unwrap();
        let stats = self.exchanger.join().unwrap();
        (report, stats, self.dir)
    }

    /// Data rows of the output file, split on tabs.
    pub fn rows(dir: &tempfile::TempDir) -> Vec<Vec<String>> {
        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
            .iter()
            .flat_map(|f| {
                std::fs::read_to_string(f)
                    .unwrap()
                    .lines()
                    .skip(1)
                    .map(|l| l.split('\t').map(String::from).collect())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

pub fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    f()
}

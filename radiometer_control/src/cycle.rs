//! Measurement cycle runner.
//!
//! The orchestrator is the only thread that commands devices. Each pass of
//! the loop samples the controller guards, feeds the resulting event to the
//! [`OrchestratorStateMachine`] and, while Cycling, executes one position of
//! the measurement cycle:
//!
//! ```text
//! Chopper → Wobbler(start) → Frontend → Backends → Housekeeping
//!   → fetch Backends → fetch Housekeeping → fetch Frontend
//!   → gate (previous cycle drained) → store → newdata → Wobbler(settle)
//! ```
//!
//! A device failure aborts the pass without advancing `pos`, clears `run`
//! everywhere and returns to AwaitingReady; the operator acknowledges and
//! restarts. Only `quit` leads to Stopping, where every controller is closed
//! and failures are collected into the run report.

use crate::controller::{Controller, Sample};
use crate::error::ShutdownReport;
use crate::exchange::ExchangeLink;
use crate::instrument::Instrument;
use crate::state::{
    OrchestratorEvent, OrchestratorState, OrchestratorStateMachine, TransitionResult, next_event,
};
use chrono::Local;
use flume::RecvTimeoutError;
use radiometer_common::consts::{COLD_LOAD_KEY, HOT_LOAD_KEY};
use radiometer_common::device::driver::DeviceError;
use radiometer_common::device::types::{DeviceCommand, Reading};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Cycles between periodic statistics log lines.
const STATS_LOG_INTERVAL: u64 = 100;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// Per-run cycle counters and timings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Completed cycles.
    pub cycles: u64,
    /// Transitions back to AwaitingReady.
    pub pauses: u64,
    /// Passes aborted by a device failure.
    pub faults: u64,
    /// Duration of the last completed cycle.
    pub last_cycle: Duration,
    /// Longest completed cycle.
    pub max_cycle: Duration,
    /// Sum of completed cycle durations.
    pub total_cycle: Duration,
    /// Time the last cycle spent at the backpressure gate.
    pub last_gate_wait: Duration,
    /// Longest gate wait.
    pub max_gate_wait: Duration,
}

impl CycleStats {
    /// Zeroed statistics.
    pub const fn new() -> Self {
        Self {
            cycles: 0,
            pauses: 0,
            faults: 0,
            last_cycle: Duration::ZERO,
            max_cycle: Duration::ZERO,
            total_cycle: Duration::ZERO,
            last_gate_wait: Duration::ZERO,
            max_gate_wait: Duration::ZERO,
        }
    }

    /// Record one completed cycle.
    #[inline]
    pub fn record(&mut self, duration: Duration, gate_wait: Duration) {
        self.cycles += 1;
        self.last_cycle = duration;
        self.max_cycle = self.max_cycle.max(duration);
        self.total_cycle += duration;
        self.last_gate_wait = gate_wait;
        self.max_gate_wait = self.max_gate_wait.max(gate_wait);
    }

    /// Average cycle duration (zero if no cycles).
    pub fn avg_cycle(&self) -> Duration {
        match u32::try_from(self.cycles) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_cycle / n,
            Err(_) => Duration::from_secs_f64(self.total_cycle.as_secs_f64() / self.cycles as f64),
        }
    }
}

/// Outcome of a finished orchestrator run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Close failures, in close order.
    pub errors: ShutdownReport,
    /// Cycle statistics.
    pub stats: CycleStats,
    /// Position index the next cycle would have used.
    pub final_pos: usize,
    /// State the orchestrator ended in.
    pub final_state: OrchestratorState,
}

enum PassOutcome {
    Completed,
    Fault,
    Quit,
}

// ─── Orchestrator ───────────────────────────────────────────────────

/// The sequencing thread body.
pub struct Orchestrator {
    instrument: Arc<Instrument>,
    machine: OrchestratorStateMachine,
    link: ExchangeLink,
    poll_interval: Duration,
    pos: usize,
    cycle: u64,
    awaiting_ack: Option<u64>,
    stats: CycleStats,
    max_cycles: Option<u64>,
    errors: ShutdownReport,
}

impl Orchestrator {
    /// Orchestrator for `instrument`, publishing through `link`.
    pub fn new(instrument: Arc<Instrument>, link: ExchangeLink, poll_interval: Duration) -> Self {
        Self {
            instrument,
            machine: OrchestratorStateMachine::new(),
            link,
            poll_interval,
            pos: 0,
            cycle: 0,
            awaiting_ack: None,
            stats: CycleStats::new(),
            max_cycles: None,
            errors: ShutdownReport::new(),
        }
    }

    /// Raise `quit` after `cycles` completed cycles.
    pub fn with_cycle_limit(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Current state.
    pub fn state(&self) -> OrchestratorState {
        self.machine.state()
    }

    /// Position index of the next cycle.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Statistics so far.
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run on a thread named `orchestrator`.
    pub fn spawn(self) -> std::io::Result<JoinHandle<RunReport>> {
        std::thread::Builder::new()
            .name("orchestrator".to_string())
            .spawn(move || self.run())
    }

    /// Loop until Closed.
    ///
    /// Dropping the orchestrator at the end disconnects the exchanger.
    pub fn run(mut self) -> RunReport {
        info!(
            "Orchestrator started: {} positions, {} backends",
            self.instrument.cycle_length(),
            self.instrument.backends().len()
        );
        while self.machine.is_live() {
            self.step();
        }
        info!(
            "Orchestrator closed after {} cycles (avg {:?}, max {:?})",
            self.stats.cycles,
            self.stats.avg_cycle(),
            self.stats.max_cycle
        );
        RunReport {
            errors: std::mem::take(&mut self.errors),
            stats: self.stats,
            final_pos: self.pos,
            final_state: self.machine.state(),
        }
    }

    /// One loop iteration.
    pub fn step(&mut self) {
        let state = self.machine.state();
        match state {
            OrchestratorState::AwaitingReady => {
                match next_event(state, &self.instrument.guards()) {
                    Some(event) => self.apply(event),
                    None => {
                        self.instrument.wait_for_wakeup(self.poll_interval);
                    }
                }
            }
            OrchestratorState::Cycling => {
                if let Some(event) = next_event(state, &self.instrument.guards()) {
                    if event == OrchestratorEvent::Fault {
                        self.on_fault();
                    } else {
                        self.apply(event);
                    }
                    return;
                }
                match self.run_pass() {
                    PassOutcome::Completed => {
                        if self.max_cycles.is_some_and(|max| self.stats.cycles >= max) {
                            info!("Cycle limit of {} reached", self.stats.cycles);
                            self.instrument.quit_all();
                        }
                    }
                    PassOutcome::Fault => self.on_fault(),
                    PassOutcome::Quit => self.apply(OrchestratorEvent::Quit),
                }
            }
            OrchestratorState::Stopping => {
                info!("Closing all devices");
                let report = self.instrument.close_all();
                self.errors.extend(report);
                self.apply(OrchestratorEvent::CloseComplete);
            }
            OrchestratorState::Closed => {}
        }
    }

    fn apply(&mut self, event: OrchestratorEvent) {
        let from = self.machine.state();
        match self.machine.handle_event(event) {
            TransitionResult::Ok(to) => {
                info!("Orchestrator {from} → {to} ({event:?})");
                if event == OrchestratorEvent::Paused {
                    self.stats.pauses += 1;
                }
            }
            TransitionResult::Rejected(reason) => {
                warn!("Orchestrator ignored {event:?}: {reason}");
            }
        }
    }

    fn on_fault(&mut self) {
        for (device, message) in self.instrument.error_messages() {
            error!("{device}: {message}");
        }
        self.stats.faults += 1;
        self.stats.pauses += 1;
        self.instrument.clear_activity();
        self.instrument.unready_run_all();
        self.apply(OrchestratorEvent::Fault);
    }

    /// Execute one position of the measurement cycle.
    fn run_pass(&mut self) -> PassOutcome {
        match self.try_pass() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Cycle {} at position {} aborted: {}", self.cycle, self.pos, e);
                PassOutcome::Fault
            }
        }
    }

    fn try_pass(&mut self) -> Result<PassOutcome, DeviceError> {
        let inst = Arc::clone(&self.instrument);
        let started = Instant::now();
        let pos = self.pos;
        let chopper_target = inst.chopper_position(pos);
        let wobbler_target = inst.wobbler_position(pos);

        let chopper = inst.chopper();
        debug!("Running Chopper to {chopper_target}");
        chopper.set_operating(true);
        chopper.set_waiting(true);
        let moved = chopper.run_command(&DeviceCommand::MoveChopper(chopper_target));
        chopper.set_waiting(false);
        chopper.set_operating(false);
        moved?;

        let wobbler = inst.wobbler();
        debug!("Running Wobbler to {wobbler_target}");
        wobbler.set_operating(true);
        wobbler.run_command(&DeviceCommand::MoveWobbler(wobbler_target))?;

        debug!("Running Frontend");
        start(inst.frontend())?;
        for backend in inst.backends() {
            debug!("Running Backend {}", backend.name());
            start(backend)?;
        }
        debug!("Running Housekeeping");
        start(inst.housekeeping())?;

        let mut spectra = Vec::with_capacity(inst.backends().len());
        for backend in inst.backends() {
            debug!("Get Data Backend {}", backend.name());
            spectra.push(collect(backend, Some(pos))?);
        }
        debug!("Get Data Housekeeping");
        let housekeeping = collect(inst.housekeeping(), None)?;
        debug!("Get Data Frontend");
        let frontend = collect(inst.frontend(), None)?;

        let gate_started = Instant::now();
        if !self.wait_for_drain() {
            return Ok(PassOutcome::Quit);
        }
        let gate_wait = gate_started.elapsed();

        debug!("Store cycle {} position {pos}", self.cycle);
        let now = Local::now();
        let sample = |reading: Reading| Sample {
            cycle: self.cycle,
            pos,
            reading,
            timestamp: now,
        };
        chopper.store(sample(Reading::Chopper(chopper_target)));
        wobbler.store(sample(Reading::Wobbler(wobbler_target)));
        for (backend, reading) in inst.backends().iter().zip(spectra) {
            backend.store(sample(reading));
        }
        let frontend_ctrl = inst.frontend();
        if frontend_ctrl.needs_load_temperatures() {
            if let (Some(cold), Some(hot)) = (
                housekeeping.scalar(COLD_LOAD_KEY),
                housekeeping.scalar(HOT_LOAD_KEY),
            ) {
                frontend_ctrl.set_load_temperatures(cold, hot);
            }
        }
        inst.housekeeping().store(sample(housekeeping));
        frontend_ctrl.store(sample(frontend));

        debug!("Set all to done");
        for backend in inst.backends() {
            backend.set_newdata(true);
        }
        chopper.set_newdata(true);
        wobbler.set_newdata(true);
        inst.housekeeping().set_newdata(true);
        frontend_ctrl.set_newdata(true);
        if self.link.sample_tx.send(self.cycle).is_err() {
            warn!("Exchanger is gone; cycle {} will not be saved", self.cycle);
        } else {
            self.awaiting_ack = Some(self.cycle);
        }
        self.cycle += 1;

        debug!("Wait for Wobbler");
        wobbler.set_waiting(true);
        let settled = wobbler.wait();
        wobbler.set_waiting(false);
        wobbler.set_operating(false);
        settled?;

        self.pos = (pos + 1) % inst.cycle_length();
        self.stats.record(started.elapsed(), gate_wait);
        if self.stats.cycles % STATS_LOG_INTERVAL == 0 {
            info!(
                "{} cycles, last {:?}, max {:?}, max gate wait {:?}",
                self.stats.cycles,
                self.stats.last_cycle,
                self.stats.max_cycle,
                self.stats.max_gate_wait
            );
        }
        Ok(PassOutcome::Completed)
    }

    /// Block until the exchanger has drained and acknowledged the previous
    /// cycle.
    ///
    /// Each acknowledgement is consumed here, so the drained channel never
    /// holds more than one. Returns false if `quit` was raised while waiting.
    fn wait_for_drain(&mut self) -> bool {
        while self.awaiting_ack.is_some() || self.instrument.pending_newdata() {
            if self.instrument.any_quit() {
                return false;
            }
            match self.link.drained_rx.recv_timeout(self.poll_interval) {
                Ok(cycle) if Some(cycle) == self.awaiting_ack => self.awaiting_ack = None,
                Ok(cycle) => debug!("Ignoring stale acknowledgement of cycle {cycle}"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    error!("Exchanger is gone; stopping");
                    self.instrument.quit_all();
                    return false;
                }
            }
        }
        true
    }
}

/// Issue an acquisition and mark the controller busy.
fn start(ctrl: &Controller) -> Result<(), DeviceError> {
    ctrl.set_operating(true);
    ctrl.run_command(&DeviceCommand::Acquire)
}

/// Fetch the acquisition started by [`start`].
fn collect(ctrl: &Controller, slot: Option<usize>) -> Result<Reading, DeviceError> {
    ctrl.set_waiting(true);
    let reading = ctrl.fetch(slot);
    ctrl.set_waiting(false);
    ctrl.set_operating(false);
    reading
}

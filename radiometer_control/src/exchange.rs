//! Exchanger: moves published samples into the data file and live buffers.
//!
//! The orchestrator announces each published cycle on the sample channel.
//! The exchanger then drains every controller with `newdata` set, persists
//! the combined record, updates the live buffers, clears `newdata` and
//! acknowledges the cycle on the drained channel. The orchestrator's
//! backpressure gate blocks on that acknowledgement, so at most one cycle is
//! ever in flight and both channels hold at most one message.

use crate::controller::Controller;
use crate::instrument::Instrument;
use crate::live::LiveData;
use crate::saver::{BackendSpectra, DataSaver, Record};
use chrono::Local;
use flume::{RecvTimeoutError, TrySendError};
use radiometer_common::device::types::Reading;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Orchestrator side of the exchange channels.
#[derive(Debug)]
pub struct ExchangeLink {
    /// "Cycle k published".
    pub sample_tx: flume::Sender<u64>,
    /// "Cycle k consumed".
    pub drained_rx: flume::Receiver<u64>,
}

/// Exchanger side of the exchange channels.
#[derive(Debug)]
pub struct ExchangeEnd {
    /// "Cycle k published".
    pub sample_rx: flume::Receiver<u64>,
    /// "Cycle k consumed".
    pub drained_tx: flume::Sender<u64>,
}

/// Create a connected pair of channel ends.
pub fn channel() -> (ExchangeLink, ExchangeEnd) {
    let (sample_tx, sample_rx) = flume::bounded(1);
    let (drained_tx, drained_rx) = flume::bounded(1);
    (
        ExchangeLink {
            sample_tx,
            drained_rx,
        },
        ExchangeEnd {
            sample_rx,
            drained_tx,
        },
    )
}

/// Exchange counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    /// Records drained.
    pub records: u64,
    /// Records the saver failed to write.
    pub save_failures: u64,
}

/// The exchange thread body.
pub struct Exchanger {
    instrument: Arc<Instrument>,
    saver: Arc<DataSaver>,
    live: Arc<LiveData>,
    end: ExchangeEnd,
    poll_interval: Duration,
    stats: ExchangeStats,
}

impl Exchanger {
    /// Exchanger draining `instrument` into `saver` and `live`.
    pub fn new(
        instrument: Arc<Instrument>,
        saver: Arc<DataSaver>,
        live: Arc<LiveData>,
        end: ExchangeEnd,
        poll_interval: Duration,
    ) -> Self {
        Self {
            instrument,
            saver,
            live,
            end,
            poll_interval,
            stats: ExchangeStats::default(),
        }
    }

    /// Run on a thread named `exchanger`.
    pub fn spawn(self) -> std::io::Result<JoinHandle<ExchangeStats>> {
        std::thread::Builder::new()
            .name("exchanger".to_string())
            .spawn(move || self.run())
    }

    /// Loop until the orchestrator drops its end of the channels.
    pub fn run(mut self) -> ExchangeStats {
        info!("Exchanger started");
        loop {
            match self.end.sample_rx.recv_timeout(self.poll_interval) {
                Ok(cycle) => {
                    self.drain(cycle);
                    match self.end.drained_tx.try_send(cycle) {
                        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!("Acknowledgement of cycle {cycle} dropped: previous one unread");
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if self.instrument.pending_newdata() {
                        self.drain(u64::MAX);
                    }
                    break;
                }
            }
        }
        info!(
            "Exchanger stopped after {} records ({} save failures)",
            self.stats.records, self.stats.save_failures
        );
        self.stats
    }

    /// Consume every controller with `newdata` set.
    pub fn drain(&mut self, cycle: u64) {
        let inst = Arc::clone(&self.instrument);
        debug!("Exchanging cycle {cycle}");

        let chopper = take(inst.chopper()).and_then(|s| match s.reading {
            Reading::Chopper(pos) => Some(pos),
            _ => None,
        });
        let wobbler = take(inst.wobbler()).and_then(|s| match s.reading {
            Reading::Wobbler(step) => Some(step),
            _ => None,
        });

        let housekeeping = peek(inst.housekeeping());
        let frontend = peek(inst.frontend());
        let mut pos = None;
        let mut sample_cycle = None;
        let backends: Vec<BackendSpectra> = inst
            .backends()
            .iter()
            .filter(|b| b.has_newdata())
            .filter_map(|b| {
                let sample = b.data()?;
                pos.get_or_insert(sample.pos);
                sample_cycle.get_or_insert(sample.cycle);
                let boards = match sample.reading {
                    Reading::Spectra(boards) => boards,
                    _ => Vec::new(),
                };
                Some(BackendSpectra {
                    name: b.name().to_string(),
                    boards,
                })
            })
            .collect();

        let record = Record {
            timestamp: Local::now(),
            cycle: sample_cycle.unwrap_or(cycle),
            pos: pos.unwrap_or_default(),
            chopper,
            wobbler,
            housekeeping: scalars(housekeeping),
            frontend: scalars(frontend),
            backends,
        };

        if let Err(e) = self.saver.write(&record) {
            error!("Saving cycle {} failed: {}", record.cycle, e);
            self.stats.save_failures += 1;
        }
        self.live.update(&record);

        for ctrl in inst.gated() {
            ctrl.set_newdata(false);
        }
        self.stats.records += 1;
    }

    /// Counters so far.
    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }
}

/// Copy the sample and clear `newdata` immediately.
fn take(ctrl: &Controller) -> Option<crate::controller::Sample> {
    if !ctrl.has_newdata() {
        return None;
    }
    let sample = ctrl.data();
    ctrl.set_newdata(false);
    sample
}

/// Copy the sample, leaving `newdata` for the gate.
fn peek(ctrl: &Controller) -> Option<Reading> {
    if !ctrl.has_newdata() {
        return None;
    }
    ctrl.data().map(|s| s.reading)
}

fn scalars(reading: Option<Reading>) -> BTreeMap<String, f64> {
    match reading {
        Some(Reading::Scalars(map)) => map,
        _ => BTreeMap::new(),
    }
}

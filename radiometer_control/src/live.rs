//! Live buffers read by the presentation layer.
//!
//! Holds the per-backend calibration state, the last exchanged record and
//! bounded time series of housekeeping values, frontend values and spectrum
//! medians.

use crate::calibration::Calibration;
use crate::saver::Record;
use heapless::HistoryBuffer;
use parking_lot::Mutex;
use radiometer_common::consts::{COLD_LOAD_KEY, HOT_LOAD_KEY};
use std::collections::BTreeMap;

/// Points kept per long-term series.
pub const SERIES_CAPACITY: usize = 1024;

/// `(unix seconds, value)` ring buffer.
pub type Series = HistoryBuffer<(f64, f64), SERIES_CAPACITY>;

#[derive(Debug)]
struct LiveState {
    series: BTreeMap<String, Box<Series>>,
    calibrations: Vec<(String, Calibration)>,
    last_record: Option<Record>,
    records: u64,
}

/// Shared live view of the instrument.
#[derive(Debug)]
pub struct LiveData {
    state: Mutex<LiveState>,
}

impl LiveData {
    /// Buffers for the given backends: `(name, frequency grid per board)`.
    pub fn new(backends: Vec<(String, Vec<Vec<f64>>)>, num_to_avg: usize) -> Self {
        let calibrations = backends
            .into_iter()
            .map(|(name, freqs)| (name, Calibration::new(freqs, num_to_avg)))
            .collect();
        Self {
            state: Mutex::new(LiveState {
                series: BTreeMap::new(),
                calibrations,
                last_record: None,
                records: 0,
            }),
        }
    }

    /// Fold one exchanged record into the buffers.
    pub fn update(&self, record: &Record) {
        let t = record.timestamp.timestamp_millis() as f64 / 1000.0;
        let tc = record.housekeeping.get(COLD_LOAD_KEY).copied().unwrap_or(f64::NAN);
        let th = record.housekeeping.get(HOT_LOAD_KEY).copied().unwrap_or(f64::NAN);

        let mut state = self.state.lock();
        let LiveState {
            series,
            calibrations,
            ..
        } = &mut *state;

        let mut longterm: BTreeMap<String, f64> = record
            .housekeeping
            .iter()
            .chain(&record.frontend)
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        for backend in &record.backends {
            let Some((_, cal)) = calibrations.iter_mut().find(|(n, _)| *n == backend.name) else {
                continue;
            };
            if let Some(target) = record.chopper {
                cal.update(target, tc, th, &backend.boards);
            }
            let views = [
                ("Median", cal.calibrated()),
                ("Median Noise", cal.noise()),
                ("Raw Cold", cal.last_cold()),
                ("Raw Hot", cal.last_hot()),
                ("Raw Target", cal.last_target()),
            ];
            for (label, spectra) in views {
                let Some(spectra) = spectra else { continue };
                let multi = spectra.len() > 1;
                for (j, board) in spectra.iter().enumerate() {
                    let Some(m) = median(board) else { continue };
                    let key = if multi {
                        format!("{} {label} {j}", backend.name)
                    } else {
                        format!("{} {label}", backend.name)
                    };
                    longterm.insert(key, m);
                }
            }
        }

        for (key, value) in longterm {
            series
                .entry(key)
                .or_insert_with(|| Box::new(HistoryBuffer::new()))
                .write((t, value));
        }
        state.last_record = Some(record.clone());
        state.records += 1;
    }

    /// Names of all long-term series.
    pub fn series_names(&self) -> Vec<String> {
        self.state.lock().series.keys().cloned().collect()
    }

    /// Points of one series, oldest first.
    pub fn series(&self, name: &str) -> Vec<(f64, f64)> {
        self.state
            .lock()
            .series
            .get(name)
            .map(|s| s.oldest_ordered().copied().collect())
            .unwrap_or_default()
    }

    /// Most recent value of one series.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.state
            .lock()
            .series
            .get(name)
            .and_then(|s| s.recent().map(|&(_, v)| v))
    }

    /// Copy of a backend's calibration state.
    pub fn calibration(&self, backend: &str) -> Option<Calibration> {
        self.state
            .lock()
            .calibrations
            .iter()
            .find(|(n, _)| n == backend)
            .map(|(_, c)| c.clone())
    }

    /// Restart every running average.
    pub fn reset_averages(&self) {
        for (_, cal) in self.state.lock().calibrations.iter_mut() {
            cal.reset_average();
        }
    }

    /// Last exchanged record.
    pub fn last_record(&self) -> Option<Record> {
        self.state.lock().last_record.clone()
    }

    /// Records exchanged so far.
    pub fn record_count(&self) -> u64 {
        self.state.lock().records
    }
}

/// Upper median of the finite values in `values`.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    Some(v[v.len() / 2])
}

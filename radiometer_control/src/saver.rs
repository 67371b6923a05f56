//! Data file identity and persistence.
//!
//! Output files are named `<basename>.<YYYY-MM-DD>.<n>.tsv` inside the
//! output directory. `n` is the first sequence number whose file does not
//! exist yet, so restarting the program never appends to a previous run's
//! file. A new name is computed when the day changes, when the directory is
//! changed, or when the current file has disappeared.
//!
//! Each record is one tab-separated line; a header line is written at the
//! top of every new file. The header fixes the file's [`Columns`]: a later
//! record missing a value gets `-` in that column, and a record carrying a
//! column the header lacks starts the next sequence number instead.

use crate::error::ControlError;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use radiometer_common::consts::{DATA_FILE_EXTENSION, DAY_TAG_FORMAT};
use radiometer_common::device::types::ChopperPos;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Placeholder for a value the record does not carry.
const MISSING: &str = "-";

/// Spectra of one backend for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpectra {
    /// Backend name.
    pub name: String,
    /// One vector per board.
    pub boards: Vec<Vec<f32>>,
}

/// Everything exchanged for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Exchange time.
    pub timestamp: DateTime<Local>,
    /// Orchestrator cycle counter.
    pub cycle: u64,
    /// Position index the samples were taken at.
    pub pos: usize,
    /// Chopper position achieved.
    pub chopper: Option<ChopperPos>,
    /// Wobbler position commanded.
    pub wobbler: Option<i32>,
    /// Housekeeping scalars.
    pub housekeeping: BTreeMap<String, f64>,
    /// Frontend scalars.
    pub frontend: BTreeMap<String, f64>,
    /// Backend spectra, in configuration order.
    pub backends: Vec<BackendSpectra>,
}

impl Record {
    /// Column names, matching [`Record::fields`].
    pub fn header(&self) -> Vec<String> {
        Columns::of(self).header()
    }

    /// Values in column order.
    pub fn fields(&self) -> Vec<String> {
        Columns::of(self).row(self)
    }
}

// ─── Column Layout ──────────────────────────────────────────────────

/// Column layout of one data file, taken from its first record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    housekeeping: Vec<String>,
    frontend: Vec<String>,
    /// Backend name and channel count per board.
    backends: Vec<(String, Vec<usize>)>,
}

impl Columns {
    /// Layout carrying exactly the values of `record`.
    pub fn of(record: &Record) -> Self {
        Self {
            housekeeping: record.housekeeping.keys().cloned().collect(),
            frontend: record.frontend.keys().cloned().collect(),
            backends: record
                .backends
                .iter()
                .map(|b| (b.name.clone(), b.boards.iter().map(Vec::len).collect()))
                .collect(),
        }
    }

    /// Header line.
    pub fn header(&self) -> Vec<String> {
        let mut cols: Vec<String> = ["time", "cycle", "pos", "chopper", "wobbler"]
            .into_iter()
            .map(String::from)
            .collect();
        cols.extend(self.housekeeping.iter().cloned());
        cols.extend(self.frontend.iter().cloned());
        for (name, boards) in &self.backends {
            for (board, &channels) in boards.iter().enumerate() {
                cols.extend((0..channels).map(|ch| format!("{name}.{board}.{ch}")));
            }
        }
        cols
    }

    /// Every value of `record` has a column here.
    pub fn admits(&self, record: &Record) -> bool {
        record.housekeeping.keys().all(|k| self.housekeeping.contains(k))
            && record.frontend.keys().all(|k| self.frontend.contains(k))
            && record.backends.iter().all(|b| {
                self.backends.iter().any(|(name, boards)| {
                    *name == b.name
                        && boards.len() == b.boards.len()
                        && boards.iter().zip(&b.boards).all(|(&n, data)| n == data.len())
                })
            })
    }

    /// Values of `record` in this layout, `-` where it has none.
    ///
    /// Always exactly as wide as [`Columns::header`].
    pub fn row(&self, record: &Record) -> Vec<String> {
        let mut out = vec![
            record.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            record.cycle.to_string(),
            record.pos.to_string(),
            record.chopper.map_or_else(|| MISSING.to_string(), |c| c.to_string()),
            record.wobbler.map_or_else(|| MISSING.to_string(), |w| w.to_string()),
        ];
        let scalar = |map: &BTreeMap<String, f64>, key: &String| {
            map.get(key).map_or_else(|| MISSING.to_string(), f64::to_string)
        };
        out.extend(self.housekeeping.iter().map(|k| scalar(&record.housekeeping, k)));
        out.extend(self.frontend.iter().map(|k| scalar(&record.frontend, k)));
        for (name, boards) in &self.backends {
            let spectra = record.backends.iter().find(|b| b.name == *name);
            for (board, &channels) in boards.iter().enumerate() {
                match spectra.and_then(|b| b.boards.get(board)) {
                    Some(data) if data.len() == channels => {
                        out.extend(data.iter().map(f32::to_string));
                    }
                    _ => out.extend(std::iter::repeat_n(MISSING.to_string(), channels)),
                }
            }
        }
        out
    }
}

#[derive(Debug)]
struct SaverState {
    dir: PathBuf,
    day_tag: String,
    sequence: usize,
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    columns: Option<Columns>,
    force_new: bool,
}

/// Process-wide output file.
///
/// The directory, day tag, sequence number and open file all live under one
/// mutex, so a directory change never races a write.
#[derive(Debug)]
pub struct DataSaver {
    basename: String,
    state: Mutex<SaverState>,
}

impl DataSaver {
    /// Saver writing into `dir`. Nothing is created until the first write.
    pub fn new(dir: impl Into<PathBuf>, basename: impl Into<String>) -> Self {
        Self {
            basename: basename.into(),
            state: Mutex::new(SaverState {
                dir: dir.into(),
                day_tag: String::new(),
                sequence: 0,
                path: PathBuf::new(),
                writer: None,
                columns: None,
                force_new: true,
            }),
        }
    }

    /// Refresh the day tag and return the current file path.
    pub fn update_time_and_rotate(&self) -> PathBuf {
        self.update_time_and_rotate_at(Local::now())
    }

    /// [`DataSaver::update_time_and_rotate`] at a given time.
    ///
    /// Calling it twice with the same day and no intervening write returns
    /// the same path.
    pub fn update_time_and_rotate_at(&self, now: DateTime<Local>) -> PathBuf {
        let mut state = self.state.lock();
        self.rotate(&mut state, now);
        state.path.clone()
    }

    fn rotate(&self, state: &mut SaverState, now: DateTime<Local>) {
        let tag = now.format(DAY_TAG_FORMAT).to_string();
        if tag == state.day_tag && !state.force_new && state.path.exists() {
            return;
        }

        let mut sequence = 0;
        let mut path = self.file_name(&state.dir, &tag, sequence);
        while path.exists() {
            sequence += 1;
            path = self.file_name(&state.dir, &tag, sequence);
        }

        if path != state.path {
            info!("New data file {}", path.display());
        }
        // Reopen even under the same name: the old file may have been removed.
        state.writer = None;
        state.day_tag = tag;
        state.sequence = sequence;
        state.path = path;
        state.force_new = false;
    }

    fn file_name(&self, dir: &Path, tag: &str, sequence: usize) -> PathBuf {
        dir.join(format!(
            "{}.{tag}.{sequence}.{DATA_FILE_EXTENSION}",
            self.basename
        ))
    }

    /// Switch to `dir`; the next write starts a new file there.
    pub fn update_path(&self, dir: impl Into<PathBuf>) {
        let mut state = self.state.lock();
        state.dir = dir.into();
        state.writer = None;
        state.force_new = true;
        info!("Output directory set to {}", state.dir.display());
    }

    /// Append one record, rotating first.
    pub fn write(&self, record: &Record) -> Result<PathBuf, ControlError> {
        self.write_at(record, Local::now())
    }

    /// [`DataSaver::write`] with the rotation clock given explicitly.
    pub fn write_at(&self, record: &Record, now: DateTime<Local>) -> Result<PathBuf, ControlError> {
        let mut state = self.state.lock();
        self.rotate(&mut state, now);
        let outgrown = state.writer.is_some()
            && state.columns.as_ref().is_some_and(|c| !c.admits(record));
        if outgrown {
            info!(
                "Cycle {} does not fit the columns of {}",
                record.cycle,
                state.path.display()
            );
            state.force_new = true;
            self.rotate(&mut state, now);
        }

        if state.writer.is_none() {
            std::fs::create_dir_all(&state.dir).map_err(|source| ControlError::Io {
                path: state.dir.clone(),
                source,
            })?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&state.path)
                .map_err(|source| ControlError::Io {
                    path: state.path.clone(),
                    source,
                })?;
            let fresh = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .delimiter(b'\t')
                .from_writer(file);
            let columns = Columns::of(record);
            if fresh {
                writer.write_record(columns.header())?;
            }
            state.writer = Some(writer);
            state.columns = Some(columns);
        }

        let path = state.path.clone();
        let row = state.columns.as_ref().map(|c| c.row(record));
        if let (Some(writer), Some(row)) = (state.writer.as_mut(), row) {
            writer.write_record(row)?;
            writer
                .flush()
                .map_err(|source| ControlError::Io { path: path.clone(), source })?;
        }
        debug!("Saved cycle {} to {}", record.cycle, path.display());
        Ok(path)
    }

    /// Current file path (empty before the first rotation).
    pub fn current_path(&self) -> PathBuf {
        self.state.lock().path.clone()
    }

    /// Current output directory.
    pub fn directory(&self) -> PathBuf {
        self.state.lock().dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn record(cycle: u64) -> Record {
        Record {
            timestamp: at(1),
            cycle,
            pos: 0,
            chopper: Some(ChopperPos::Cold),
            wobbler: Some(3000),
            housekeeping: BTreeMap::from([("Cold Load Temperature".to_string(), 18.0)]),
            frontend: BTreeMap::new(),
            backends: vec![BackendSpectra {
                name: "AFFTS".to_string(),
                boards: vec![vec![1.0, 2.0]],
            }],
        }
    }

    #[test]
    fn header_and_fields_line_up() {
        let rec = record(3);
        assert_eq!(
            rec.header(),
            [
                "time",
                "cycle",
                "pos",
                "chopper",
                "wobbler",
                "Cold Load Temperature",
                "AFFTS.0.0",
                "AFFTS.0.1"
            ]
        );
        let fields = rec.fields();
        assert_eq!(fields.len(), rec.header().len());
        assert_eq!(&fields[1..], ["3", "0", "Cold", "3000", "18", "1", "2"]);
    }

    #[test]
    fn rotation_is_idempotent_within_a_day() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DataSaver::new(dir.path(), "WASPAM");
        let first = saver.update_time_and_rotate_at(at(1));
        let second = saver.update_time_and_rotate_at(at(1));
        assert_eq!(first, second);
        assert_eq!(first, dir.path().join("WASPAM.2024-03-01.0.tsv"));
    }

    #[test]
    fn existing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("WASPAM.2024-03-01.0.tsv"), "old").unwrap();
        std::fs::write(dir.path().join("WASPAM.2024-03-01.1.tsv"), "old").unwrap();
        let saver = DataSaver::new(dir.path(), "WASPAM");
        let path = saver.update_time_and_rotate_at(at(1));
        assert_eq!(path, dir.path().join("WASPAM.2024-03-01.2.tsv"));
    }

    #[test]
    fn day_change_starts_a_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DataSaver::new(dir.path(), "WASPAM");
        saver.write_at(&record(0), at(1)).unwrap();
        saver.write_at(&record(1), at(1)).unwrap();
        let next = saver.write_at(&record(2), at(2)).unwrap();
        assert_eq!(next, dir.path().join("WASPAM.2024-03-02.0.tsv"));

        let first = std::fs::read_to_string(dir.path().join("WASPAM.2024-03-01.0.tsv")).unwrap();
        let lines: Vec<&str> = first.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("time\tcycle\tpos"));
        assert!(lines[2].contains("\t1\t0\tCold\t"));
    }

    #[test]
    fn path_change_forces_new_name() {
        let first_dir = tempfile::tempdir().unwrap();
        let second_dir = tempfile::tempdir().unwrap();
        let saver = DataSaver::new(first_dir.path(), "WASPAM");
        saver.write_at(&record(0), at(1)).unwrap();

        saver.update_path(second_dir.path());
        assert_eq!(saver.directory(), second_dir.path());
        let path = saver.write_at(&record(1), at(1)).unwrap();
        assert_eq!(path, second_dir.path().join("WASPAM.2024-03-01.0.tsv"));
    }

    #[test]
    fn update_path_to_same_dir_does_not_reuse_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DataSaver::new(dir.path(), "WASPAM");
        saver.write_at(&record(0), at(1)).unwrap();
        saver.update_path(dir.path());
        let path = saver.write_at(&record(1), at(1)).unwrap();
        assert_eq!(path, dir.path().join("WASPAM.2024-03-01.1.tsv"));
    }

    #[test]
    fn removed_file_is_recreated_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DataSaver::new(dir.path(), "WASPAM");
        let path = saver.write_at(&record(0), at(1)).unwrap();
        std::fs::remove_file(&path).unwrap();

        let again = saver.write_at(&record(1), at(1)).unwrap();
        assert_eq!(again, path);
        let lines: Vec<String> = std::fs::read_to_string(&again)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("time\t"));
    }

    fn lines(path: &Path) -> Vec<Vec<String>> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.split('\t').map(String::from).collect())
            .collect()
    }

    #[test]
    fn missing_values_are_dashed_in_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DataSaver::new(dir.path(), "WASPAM");
        let first = saver.write_at(&record(0), at(1)).unwrap();

        let mut sparse = record(1);
        sparse.housekeeping.clear();
        sparse.backends.clear();
        sparse.chopper = None;
        let second = saver.write_at(&sparse, at(1)).unwrap();
        assert_eq!(first, second);

        let rows = lines(&first);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.len() == rows[0].len()));
        assert_eq!(&rows[2][1..], ["1", "0", "-", "3000", "-", "-", "-"]);
    }

    #[test]
    fn new_columns_start_the_next_file() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DataSaver::new(dir.path(), "WASPAM");
        let mut nodata = record(0);
        nodata.frontend = BTreeMap::from([("NODATA".to_string(), 1.0)]);
        let first = saver.write_at(&nodata, at(1)).unwrap();

        let mut loads = record(1);
        loads.frontend = BTreeMap::from([
            ("Frontend Cold Load".to_string(), 18.0),
            ("Frontend Hot Load".to_string(), 297.0),
        ]);
        let second = saver.write_at(&loads, at(1)).unwrap();
        let third = saver.write_at(&loads, at(1)).unwrap();

        assert_eq!(first, dir.path().join("WASPAM.2024-03-01.0.tsv"));
        assert_eq!(second, dir.path().join("WASPAM.2024-03-01.1.tsv"));
        assert_eq!(third, second);
        for path in [&first, &second] {
            let rows = lines(path);
            assert!(rows.iter().all(|r| r.len() == rows[0].len()));
        }
        assert_eq!(lines(&first).len(), 2);
        let rows = lines(&second);
        assert_eq!(rows.len(), 3);
        assert!(rows[0].contains(&"Frontend Hot Load".to_string()));
    }

    #[test]
    fn resized_backend_starts_the_next_file() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DataSaver::new(dir.path(), "WASPAM");
        let first = saver.write_at(&record(0), at(1)).unwrap();
        let mut wider = record(1);
        wider.backends[0].boards[0].push(3.0);
        let second = saver.write_at(&wider, at(1)).unwrap();
        assert_ne!(first, second);
        assert_eq!(lines(&second)[0].last().unwrap(), "AFFTS.0.2");
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let saver = DataSaver::new(&nested, "run");
        let path = saver.write_at(&record(0), at(5)).unwrap();
        assert!(path.exists());
        assert_eq!(saver.current_path(), path);
    }
}

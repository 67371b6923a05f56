//! System-wide constants for the radiometer workspace.
//!
//! Single source of truth for housekeeping keys, defaults and limits.

/// Housekeeping key carrying the cold calibration load temperature [K].
pub const COLD_LOAD_KEY: &str = "Cold Load Temperature";

/// Housekeeping key carrying the hot calibration load temperature [K].
pub const HOT_LOAD_KEY: &str = "Hot Load Temperature";

/// Default orchestrator poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default number of calibrated spectra in the running average.
pub const DEFAULT_NUM_TO_AVG: usize = 100;

/// Default data file base name.
pub const DEFAULT_BASENAME: &str = "radiometer";

/// Day-tag format used in data file names.
pub const DAY_TAG_FORMAT: &str = "%Y-%m-%d";

/// Data file extension.
pub const DATA_FILE_EXTENSION: &str = "tsv";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/radiometer/radiometer.toml";

/// Upper bound on the cycle length (positions per chopper/wobbler table).
pub const MAX_CYCLE_LENGTH: usize = 64;

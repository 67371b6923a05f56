//! Control-layer error types.
//!
//! - [`ControlError`] - Failures surfaced to the binary
//! - [`ShutdownReport`] - Ordered collection of close failures

use radiometer_common::config::ConfigError;
use radiometer_common::device::driver::DeviceError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the control crate.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Configuration could not be loaded or is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A device operation failed.
    #[error("{device}: {source}")]
    Device {
        /// Controller name.
        device: String,
        /// Underlying driver error.
        #[source]
        source: DeviceError,
    },

    /// Driver could not be created.
    #[error(transparent)]
    Driver(#[from] DeviceError),

    /// File system error while persisting data.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Record serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Operator action not allowed in the current instrument state.
    #[error("Operator action rejected: {0}")]
    Operator(String),

    /// A worker thread panicked.
    #[error("Thread '{0}' panicked")]
    ThreadPanicked(&'static str),
}

/// Close failures collected while shutting the instrument down.
///
/// One failing close never prevents the others; every failure is kept in
/// the order it happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    errors: Vec<String>,
}

impl ShutdownReport {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `device`.
    pub fn push(&mut self, device: &str, message: impl fmt::Display) {
        self.errors.push(format!("{device}: {message}"));
    }

    /// Append another report's failures.
    pub fn extend(&mut self, other: ShutdownReport) {
        self.errors.extend(other.errors);
    }

    /// True when nothing failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Failures in the order they were recorded.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Consume into the list of failures.
    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

//! Device command and reading types.
//!
//! This module defines the data exchanged between controllers and drivers:
//! - `DeviceKind` - Which subsystem a driver implements
//! - `ChopperPos` - Logical calibration-target positions
//! - `DeviceCommand` - What `run()` is asked to do
//! - `Reading` - What `get_data()` returns
//! - `Endpoint` - How a driver reaches its hardware

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Subsystem implemented by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Calibration-target chopper.
    Chopper,
    /// Optical path-length wobbler.
    Wobbler,
    /// Housekeeping sensor unit.
    Housekeeping,
    /// Receiver frontend.
    Frontend,
    /// FFT spectrometer backend.
    Spectrometer,
}

impl DeviceKind {
    /// All kinds, in instrument initialization order.
    pub const ALL: [DeviceKind; 5] = [
        DeviceKind::Housekeeping,
        DeviceKind::Frontend,
        DeviceKind::Wobbler,
        DeviceKind::Chopper,
        DeviceKind::Spectrometer,
    ];

    /// Lowercase name used in configuration files and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Chopper => "chopper",
            DeviceKind::Wobbler => "wobbler",
            DeviceKind::Housekeeping => "housekeeping",
            DeviceKind::Frontend => "frontend",
            DeviceKind::Spectrometer => "spectrometer",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical chopper target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChopperPos {
    /// Cold calibration load.
    Cold,
    /// Hot calibration load.
    Hot,
    /// Sky / antenna view.
    Antenna,
    /// Reference view.
    Reference,
}

impl ChopperPos {
    /// True for the two calibration loads.
    pub const fn is_load(self) -> bool {
        matches!(self, ChopperPos::Cold | ChopperPos::Hot)
    }

    /// Short name used by operator consoles (`cold`, `hot`, `ant`, `ref`).
    pub const fn short_name(self) -> &'static str {
        match self {
            ChopperPos::Cold => "cold",
            ChopperPos::Hot => "hot",
            ChopperPos::Antenna => "ant",
            ChopperPos::Reference => "ref",
        }
    }

    /// Parse a short or long position name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cold" => Some(ChopperPos::Cold),
            "hot" => Some(ChopperPos::Hot),
            "ant" | "antenna" => Some(ChopperPos::Antenna),
            "ref" | "reference" => Some(ChopperPos::Reference),
            _ => None,
        }
    }
}

impl fmt::Display for ChopperPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChopperPos::Cold => "Cold",
            ChopperPos::Hot => "Hot",
            ChopperPos::Antenna => "Antenna",
            ChopperPos::Reference => "Reference",
        };
        f.write_str(s)
    }
}

/// Command issued through `DeviceDriver::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Start one acquisition (frontend, housekeeping, spectrometer).
    Acquire,
    /// Move the chopper to a target; blocks until reached.
    MoveChopper(ChopperPos),
    /// Start a wobbler move; `wait()` blocks until settled.
    MoveWobbler(i32),
}

/// Payload returned by `DeviceDriver::get_data`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Reading {
    /// Nothing fetched yet.
    #[default]
    Empty,
    /// Current chopper position.
    Chopper(ChopperPos),
    /// Current wobbler position in device steps.
    Wobbler(i32),
    /// Named scalar values (housekeeping, frontend).
    Scalars(BTreeMap<String, f64>),
    /// Per-board spectra (spectrometer).
    Spectra(Vec<Vec<f32>>),
}

impl Reading {
    /// Named scalars, if this is a scalar reading.
    pub fn as_scalars(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Reading::Scalars(map) => Some(map),
            _ => None,
        }
    }

    /// Board spectra, if this is a spectrometer reading.
    pub fn as_spectra(&self) -> Option<&[Vec<f32>]> {
        match self {
            Reading::Spectra(boards) => Some(boards),
            _ => None,
        }
    }

    /// Look up one scalar by key.
    pub fn scalar(&self, key: &str) -> Option<f64> {
        self.as_scalars().and_then(|map| map.get(key).copied())
    }
}

/// Hardware endpoint a driver binds to during `startup()`.
///
/// # TOML Example
///
/// ```toml
/// endpoint = { serial = { dev = "/dev/ttyUSB0", baudrate = 115200 } }
/// endpoint = { network = { host = "192.168.1.20", tcp_port = 1788, udp_port = 16210 } }
/// endpoint = "none"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// Serial line.
    Serial {
        /// Device node.
        dev: String,
        /// Baud rate.
        baudrate: u32,
    },
    /// TCP control + UDP data socket pair.
    Network {
        /// Host name or address.
        host: String,
        /// TCP control port.
        tcp_port: u16,
        /// UDP data port (0 when unused).
        #[serde(default)]
        udp_port: u16,
    },
    /// No physical endpoint (development drivers).
    #[default]
    None,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Serial { dev, baudrate } => write!(f, "{dev}@{baudrate}"),
            Endpoint::Network {
                host,
                tcp_port,
                udp_port,
            } => write!(f, "{host}:{tcp_port}/{udp_port}"),
            Endpoint::None => f.write_str("none"),
        }
    }
}

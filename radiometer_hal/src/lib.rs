//! # Radiometer Device Layer
//!
//! Driver registry and built-in drivers for the radiometer subsystems.
//!
//! Drivers implement `DeviceDriver` from `radiometer_common::device::driver`.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration per device kind
//! - [`drivers`] - Driver implementations
//! - [`console`] - Single-device command console
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       radiometer_hal                         │
//! │  ┌──────────────────────┐        ┌────────────────────────┐  │
//! │  │  DriverRegistry      │───────►│  DriverFactory         │  │
//! │  │  (kind, name) → fn   │        │  fn(&DeviceConfig)     │  │
//! │  └──────────────────────┘        └───────────┬────────────┘  │
//! │                                              ▼               │
//! │                                   Box<dyn DeviceDriver>      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod console;
pub mod driver_registry;
pub mod drivers;

pub use crate::driver_registry::DriverRegistry;

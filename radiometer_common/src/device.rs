//! Device model shared by drivers and controllers.
//!
//! - [`driver`] - `DeviceDriver` trait, `DeviceError`, `DriverFactory`
//! - [`types`] - Device kinds, commands, readings, endpoints
//! - [`config`] - Per-device configuration tables

pub mod config;
pub mod driver;
pub mod types;

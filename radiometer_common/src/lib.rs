//! Radiometer Common Library
//!
//! This crate provides the device model shared by the driver layer and the
//! control crate, plus configuration loading utilities.
//!
//! # Module Structure
//!
//! - [`device`] - Device trait, commands, readings and per-device configuration
//! - [`config`] - Configuration loading traits and the instrument schema
//! - [`consts`] - Workspace-wide constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use radiometer_common::prelude::*;
//! use radiometer_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod device;
pub mod prelude;

//! # Radiometer Control
//!
//! Orchestration core of the radiometer: sequences the chopper, wobbler,
//! frontend, spectrometer backends and housekeeping unit through the
//! measurement cycle, hands finished samples to the exchange thread and
//! shuts everything down on request.
//!
//! ## Threads
//!
//! ```text
//!  operator ──flags/wakeup──► orchestrator ──sample──► exchanger ──► DataSaver
//!     ▲                          ▲    │                   │      └─► LiveData
//!     └──────── flags, data ─────┘    └◄──── drained ─────┘
//! ```
//!
//! ## Modules
//!
//! - [`controller`] - Per-device flags, data and driver
//! - [`instrument`] - All controllers plus instrument-wide operations
//! - [`state`] - Orchestrator state machine
//! - [`cycle`] - Orchestrator loop and cycle statistics
//! - [`exchange`] - Exchange thread and channels
//! - [`saver`] - Output file naming and records
//! - [`calibration`] - Hot/cold calibration per backend
//! - [`live`] - Live buffers for display
//! - [`operator`] - Operator actions
//! - [`error`] - Error types

pub mod calibration;
pub mod controller;
pub mod cycle;
pub mod error;
pub mod exchange;
pub mod instrument;
pub mod live;
pub mod operator;
pub mod saver;
pub mod state;

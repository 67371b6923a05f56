//! Driver implementations.
//!
//! - [`dummy`] - Development drivers for every device kind, no hardware needed
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `DeviceDriver` from `radiometer_common::device::driver`
//! 3. Register the factory in [`register_builtin_drivers`]

pub mod dummy;

use crate::driver_registry::DriverRegistry;
use radiometer_common::device::types::DeviceKind;

/// Register all built-in drivers into `registry`.
pub fn register_builtin_drivers(registry: &mut DriverRegistry) {
    registry.register(DeviceKind::Chopper, "dummy", dummy::create_chopper);
    registry.register(DeviceKind::Wobbler, "dummy", dummy::create_wobbler);
    registry.register(DeviceKind::Housekeeping, "dummy", dummy::create_housekeeping);
    registry.register(DeviceKind::Frontend, "dummy", dummy::create_frontend);
    registry.register(DeviceKind::Spectrometer, "dummy", dummy::create_spectrometer);
}

//! Driver registry.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving driver
//! factories per device kind. Constructed once at startup and passed by
//! reference to whoever builds controllers.

use radiometer_common::device::config::DeviceConfig;
use radiometer_common::device::driver::{DeviceDriver, DeviceError, DriverFactory};
use radiometer_common::device::types::DeviceKind;
use std::collections::HashMap;
use tracing::debug;

/// Registry of available drivers, keyed by device kind and driver name.
pub struct DriverRegistry {
    factories: HashMap<(DeviceKind, &'static str), DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in driver.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_builtin_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same kind and name is already registered.
    pub fn register(&mut self, kind: DeviceKind, name: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(&(kind, name)) {
            panic!("Driver '{name}' for {kind} is already registered");
        }
        self.factories.insert((kind, name), factory);
    }

    /// Get a driver factory by kind and name.
    pub fn get_factory(&self, kind: DeviceKind, name: &str) -> Option<DriverFactory> {
        self.factories
            .iter()
            .find(|((k, n), _)| *k == kind && *n == name)
            .map(|(_, f)| *f)
    }

    /// Create a driver instance for the device described by `config`.
    ///
    /// # Errors
    /// Returns `DeviceError::DriverNotFound` if no driver with the configured
    /// name is registered for `kind`.
    pub fn create_driver(
        &self,
        kind: DeviceKind,
        config: &DeviceConfig,
    ) -> Result<Box<dyn DeviceDriver>, DeviceError> {
        let factory = self
            .get_factory(kind, &config.driver)
            .ok_or_else(|| DeviceError::DriverNotFound(format!("{kind}/{}", config.driver)))?;
        debug!("Creating {} driver '{}'", kind, config.driver);
        Ok(factory(config))
    }

    /// List registered driver names for one device kind, sorted.
    pub fn list_drivers(&self, kind: DeviceKind) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiometer_common::device::types::{DeviceCommand, Endpoint, Reading};

    struct TestDriver;

    impl DeviceDriver for TestDriver {
        fn name(&self) -> &'static str {
            "test"
        }

        fn kind(&self) -> DeviceKind {
            DeviceKind::Frontend
        }

        fn startup(&mut self, _endpoint: &Endpoint) -> Result<(), DeviceError> {
            Ok(())
        }

        fn init(&mut self, _manual: bool) -> Result<(), DeviceError> {
            Ok(())
        }

        fn run(&mut self, _command: &DeviceCommand) -> Result<(), DeviceError> {
            Ok(())
        }

        fn get_data(&mut self, _slot: Option<usize>) -> Result<Reading, DeviceError> {
            Ok(Reading::Empty)
        }

        fn close(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        fn has_error(&self) -> bool {
            false
        }

        fn error_string(&self) -> String {
            String::new()
        }

        fn delete_error(&mut self) {}
    }

    fn create_test_driver(_config: &DeviceConfig) -> Box<dyn DeviceDriver> {
        Box::new(TestDriver)
    }

    fn config_for(driver: &str) -> DeviceConfig {
        DeviceConfig {
            driver: driver.to_string(),
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register(DeviceKind::Frontend, "test_driver", create_test_driver);

        let driver = reg
            .create_driver(DeviceKind::Frontend, &config_for("test_driver"))
            .expect("should create");
        assert_eq!(driver.name(), "test");
    }

    #[test]
    fn registry_driver_not_found() {
        let reg = DriverRegistry::new();
        let result = reg.create_driver(DeviceKind::Chopper, &config_for("nonexistent"));
        assert!(matches!(result, Err(DeviceError::DriverNotFound(_))));
    }

    #[test]
    fn registry_lookup_is_per_kind() {
        let mut reg = DriverRegistry::new();
        reg.register(DeviceKind::Frontend, "test_driver", create_test_driver);
        assert!(reg.get_factory(DeviceKind::Frontend, "test_driver").is_some());
        assert!(reg.get_factory(DeviceKind::Wobbler, "test_driver").is_none());
    }

    #[test]
    fn registry_list_drivers() {
        let mut reg = DriverRegistry::new();
        reg.register(DeviceKind::Frontend, "beta", create_test_driver);
        reg.register(DeviceKind::Frontend, "alpha", create_test_driver);
        reg.register(DeviceKind::Chopper, "gamma", create_test_driver);

        assert_eq!(reg.list_drivers(DeviceKind::Frontend), vec!["alpha", "beta"]);
        assert_eq!(reg.list_drivers(DeviceKind::Chopper), vec!["gamma"]);
    }

    #[test]
    fn same_name_for_different_kinds_is_allowed() {
        let mut reg = DriverRegistry::new();
        reg.register(DeviceKind::Frontend, "dup", create_test_driver);
        reg.register(DeviceKind::Chopper, "dup", create_test_driver);
        assert_eq!(reg.list_drivers(DeviceKind::Chopper), vec!["dup"]);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = DriverRegistry::new();
        reg.register(DeviceKind::Frontend, "dup", create_test_driver);
        reg.register(DeviceKind::Frontend, "dup", create_test_driver);
    }

    #[test]
    fn builtin_registry_has_dummy_for_every_kind() {
        let reg = DriverRegistry::with_builtin_drivers();
        for kind in DeviceKind::ALL {
            assert!(reg.list_drivers(kind).contains(&"dummy"), "{kind}");
        }
    }
}

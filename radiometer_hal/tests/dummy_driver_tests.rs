//! Registry + development driver integration tests.
//!
//! Verifies:
//! 1. Every device table of an instrument configuration resolves to a driver.
//! 2. A full bind → init → run → fetch → close sequence works for each kind.
//! 3. Automatic sessions are refused with a latched fault.
//! 4. Unknown driver names surface as `DriverNotFound`.

use radiometer_common::config::RadiometerConfig;
use radiometer_common::consts::COLD_LOAD_KEY;
use radiometer_common::prelude::*;
use radiometer_hal::DriverRegistry;
use radiometer_hal::drivers::dummy::MUST_BE_MANUAL;

const CONFIG: &str = r#"
[shared]
service_name = "dummy-instrument"

[chopper]
positions = ["cold", "antenna", "hot", "antenna"]

[wobbler]
positions = [3000, 3000, 7000, 7000]

[[backends.spectrometer]]
name = "AFFTS"
boards = [
    { channels = 64, f_min_mhz = 0.0, f_max_mhz = 1500.0 },
    { channels = 32, f_min_mhz = 1500.0, f_max_mhz = 3000.0 },
]
"#;

fn config() -> RadiometerConfig {
    let cfg: RadiometerConfig = toml::from_str(CONFIG).unwrap();
    cfg.validate().unwrap();
    cfg
}

fn bring_up(driver: &mut dyn DeviceDriver) {
    driver.startup(&Endpoint::None).unwrap();
    driver.init(true).unwrap();
    assert!(!driver.has_error());
}

// ─── Test 1: every table resolves ──────────────────────────────────

#[test]
fn every_device_table_resolves_to_a_driver() {
    let cfg = config();
    let reg = DriverRegistry::with_builtin_drivers();

    let tables = [
        (DeviceKind::Chopper, &cfg.chopper.device),
        (DeviceKind::Wobbler, &cfg.wobbler.device),
        (DeviceKind::Housekeeping, &cfg.housekeeping),
        (DeviceKind::Frontend, &cfg.frontend),
        (DeviceKind::Spectrometer, &cfg.backends.spectrometer[0].device),
    ];
    for (kind, table) in tables {
        let driver = reg.create_driver(kind, table).unwrap();
        assert_eq!(driver.kind(), kind);
        assert_eq!(driver.name(), "dummy");
    }
}

// ─── Test 2: full manual sequence ───────────────────────────────────

#[test]
fn spectrometer_layout_comes_from_board_tables() {
    let cfg = config();
    let reg = DriverRegistry::with_builtin_drivers();
    let mut spec = reg
        .create_driver(DeviceKind::Spectrometer, &cfg.backends.spectrometer[0].device)
        .unwrap();
    bring_up(spec.as_mut());

    spec.run(&DeviceCommand::Acquire).unwrap();
    let reading = spec.get_data(Some(0)).unwrap();
    let sizes: Vec<usize> = reading.as_spectra().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![64, 32]);
    spec.close().unwrap();
}

#[test]
fn chopper_and_wobbler_follow_commands() {
    let cfg = config();
    let reg = DriverRegistry::with_builtin_drivers();
    let mut chopper = reg
        .create_driver(DeviceKind::Chopper, &cfg.chopper.device)
        .unwrap();
    let mut wobbler = reg
        .create_driver(DeviceKind::Wobbler, &cfg.wobbler.device)
        .unwrap();
    bring_up(chopper.as_mut());
    bring_up(wobbler.as_mut());

    chopper
        .run(&DeviceCommand::MoveChopper(ChopperPos::Antenna))
        .unwrap();
    wobbler.run(&DeviceCommand::MoveWobbler(7000)).unwrap();
    wobbler.wait().unwrap();

    assert_eq!(
        chopper.get_data(None).unwrap(),
        Reading::Chopper(ChopperPos::Antenna)
    );
    assert_eq!(wobbler.get_data(None).unwrap(), Reading::Wobbler(7000));
    chopper.close().unwrap();
    wobbler.close().unwrap();
}

#[test]
fn housekeeping_reports_cold_load() {
    let reg = DriverRegistry::with_builtin_drivers();
    let mut hk = reg
        .create_driver(DeviceKind::Housekeeping, &DeviceConfig::default())
        .unwrap();
    bring_up(hk.as_mut());
    hk.run(&DeviceCommand::Acquire).unwrap();
    assert_eq!(hk.get_data(None).unwrap().scalar(COLD_LOAD_KEY), Some(18.0));
}

// ─── Test 3: automatic sessions refused ─────────────────────────────

#[test]
fn automatic_session_latches_fault_on_every_kind() {
    let cfg = config();
    let reg = DriverRegistry::with_builtin_drivers();
    for kind in DeviceKind::ALL {
        let table = match kind {
            DeviceKind::Spectrometer => &cfg.backends.spectrometer[0].device,
            _ => &cfg.frontend,
        };
        let mut driver = reg.create_driver(kind, table).unwrap();
        driver.startup(&Endpoint::None).unwrap();
        assert!(driver.init(false).is_err(), "{kind}");
        assert!(driver.has_error(), "{kind}");
        assert_eq!(driver.error_string(), format!("Initialization failed: {MUST_BE_MANUAL}"));
        driver.delete_error();
        assert!(!driver.has_error());
        // closing after a failed init is safe
        driver.close().unwrap();
    }
}

// ─── Test 4: unknown driver ─────────────────────────────────────────

#[test]
fn unknown_driver_is_reported() {
    let reg = DriverRegistry::with_builtin_drivers();
    let table = DeviceConfig {
        driver: "affts-udp".to_string(),
        ..DeviceConfig::default()
    };
    match reg.create_driver(DeviceKind::Spectrometer, &table) {
        Err(DeviceError::DriverNotFound(name)) => assert_eq!(name, "spectrometer/affts-udp"),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("driver should not exist"),
    }
}

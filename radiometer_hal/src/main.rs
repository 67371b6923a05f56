//! # Radiometer Device Console
//!
//! Binds one device through the driver registry and drives it from stdin.
//!
//! # Usage
//!
//! ```bash
//! # Dummy chopper, operator session
//! radiometer_device --kind chopper --manual
//!
//! # Device table taken from the instrument configuration
//! radiometer_device --kind spectrometer --config radiometer.toml --backend AFFTS
//! ```

use clap::Parser;
use radiometer_common::config::RadiometerConfig;
use radiometer_common::device::config::DeviceConfig;
use radiometer_common::device::types::DeviceKind;
use radiometer_hal::DriverRegistry;
use radiometer_hal::console::{self, ConsoleCommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle to swap the log filter once the configuration is known.
type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Radiometer device console - drive a single subsystem by hand
#[derive(Parser, Debug)]
#[command(name = "radiometer_device")]
#[command(version)]
#[command(about = "Drive a single radiometer device from the command line")]
struct Args {
    /// Device kind (chopper, wobbler, housekeeping, frontend, spectrometer)
    #[arg(short, long, value_parser = parse_kind)]
    kind: DeviceKind,

    /// Instrument configuration to take the device table from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Driver name when no configuration is given
    #[arg(short, long, default_value = "dummy")]
    driver: String,

    /// Backend name (spectrometer only; defaults to the first backend)
    #[arg(short, long)]
    backend: Option<String>,

    /// Operator-driven session
    #[arg(short, long)]
    manual: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn parse_kind(s: &str) -> Result<DeviceKind, String> {
    DeviceKind::ALL
        .into_iter()
        .find(|k| k.as_str() == s)
        .ok_or_else(|| format!("unknown device kind '{s}'"))
}

fn main() {
    if let Err(e) = run() {
        error!("Device console failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = setup_tracing(&args);

    let device = device_config(&args, &filter)?;
    let registry = DriverRegistry::with_builtin_drivers();
    let mut driver = registry.create_driver(args.kind, &device)?;
    info!("Created {} driver '{}'", args.kind, driver.name());

    if let Err(e) = driver.startup(&device.endpoint) {
        return Err(format!("startup on {} failed: {e}", device.endpoint).into());
    }

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    write!(stdout, "{}> ", args.kind)?;
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            match console::parse_command(&line) {
                Ok(ConsoleCommand::Quit) => break,
                Ok(cmd) => match console::execute(driver.as_mut(), cmd, args.manual) {
                    Ok(text) => writeln!(stdout, "{text}")?,
                    Err(e) => eprintln!("{e}"),
                },
                Err(msg) => eprintln!("{msg}"),
            }
        }
        write!(stdout, "{}> ", args.kind)?;
        stdout.flush()?;
    }

    if let Err(e) = driver.close() {
        error!("Close failed: {}", e);
    }
    info!("Device console shutdown complete");
    Ok(())
}

/// Pick the device table from the configuration file, or build one from CLI flags.
fn device_config(
    args: &Args,
    filter: &FilterHandle,
) -> Result<DeviceConfig, Box<dyn std::error::Error>> {
    let Some(path) = &args.config else {
        return Ok(DeviceConfig {
            driver: args.driver.clone(),
            ..DeviceConfig::default()
        });
    };
    let config = RadiometerConfig::load_validated(path)?;
    let env_set = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    if let Some(directive) = config.shared.log_directive(args.verbose, env_set) {
        if let Err(e) = filter.reload(EnvFilter::new(directive)) {
            warn!("Cannot apply log level '{directive}': {e}");
        }
    }
    let device = match args.kind {
        DeviceKind::Chopper => config.chopper.device,
        DeviceKind::Wobbler => config.wobbler.device,
        DeviceKind::Housekeeping => config.housekeeping,
        DeviceKind::Frontend => config.frontend,
        DeviceKind::Spectrometer => {
            let spec = match &args.backend {
                Some(name) => config
                    .backends
                    .spectrometer
                    .into_iter()
                    .find(|s| &s.name == name)
                    .ok_or_else(|| format!("no backend named '{name}'"))?,
                None => config
                    .backends
                    .spectrometer
                    .into_iter()
                    .next()
                    .ok_or("no backend configured")?,
            };
            spec.device
        }
    };
    Ok(device)
}

/// Setup tracing subscriber based on CLI arguments.
///
/// Logs go to stderr so they do not mix with the console prompt. The filter
/// stays reloadable for `[shared] log_level`.
fn setup_tracing(args: &Args) -> FilterHandle {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let (filter, handle) = reload::Layer::new(filter);

    let json = args
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text = (!args.json).then(|| fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
    handle
}

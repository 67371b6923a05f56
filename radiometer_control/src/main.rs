//! # Radiometer
//!
//! Loads the instrument configuration, initializes every device and runs
//! the measurement cycle until Ctrl-C, a cycle limit or a fatal fault.
//!
//! # Usage
//!
//! ```bash
//! # Development drivers, operator session, ten cycles
//! radiometer --config radiometer.toml --manual --cycles 10
//!
//! # Resume automatically after device faults
//! radiometer --config radiometer.toml --auto-run --save-dir /data/waspam
//! ```

use clap::Parser;
use radiometer_common::config::RadiometerConfig;
use radiometer_common::consts::DEFAULT_CONFIG_PATH;
use radiometer_control::cycle::Orchestrator;
use radiometer_control::error::ControlError;
use radiometer_control::exchange::{self, Exchanger};
use radiometer_control::instrument::Instrument;
use radiometer_control::live::LiveData;
use radiometer_control::operator::OperatorPanel;
use radiometer_control::saver::DataSaver;
use radiometer_hal::DriverRegistry;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle to swap the log filter once the configuration is known.
type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Radiometer - measurement cycle controller
#[derive(Parser, Debug)]
#[command(name = "radiometer")]
#[command(version)]
#[command(about = "Run the radiometer measurement cycle")]
struct Args {
    /// Instrument configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Output directory (overrides `save.path`).
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Operator-driven session (required by the development drivers).
    #[arg(short, long)]
    manual: bool,

    /// Acknowledge device faults and resume instead of shutting down.
    #[arg(long)]
    auto_run: bool,

    /// Stop after this many cycles.
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let filter = setup_tracing(&args);

    info!("Radiometer v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args, &filter) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Radiometer shutdown complete");
}

fn run(args: &Args, filter: &FilterHandle) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RadiometerConfig::load_validated(&args.config)?;
    let env_set = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    if let Some(directive) = config.shared.log_directive(args.verbose, env_set) {
        if let Err(e) = filter.reload(EnvFilter::new(directive)) {
            warn!("Cannot apply log level '{directive}': {e}");
        }
    }
    if args.manual {
        config.operation.manual = true;
    }
    if let Some(dir) = &args.save_dir {
        config.save.path = dir.clone();
    }
    info!(
        "Config OK: '{}', {} positions, {} backends, output {}",
        config.shared.service_name,
        config.cycle_length(),
        config.backends.spectrometer.len(),
        config.save.path.display()
    );

    let registry = DriverRegistry::with_builtin_drivers();
    let instrument = Arc::new(Instrument::from_config(&config, &registry)?);
    let saver = Arc::new(DataSaver::new(&config.save.path, &config.save.basename));
    let live = Arc::new(LiveData::new(
        config
            .backends
            .spectrometer
            .iter()
            .map(|s| {
                let freqs: Vec<Vec<f64>> = s.device.boards.iter().map(|b| b.frequencies()).collect();
                (s.name.clone(), freqs)
            })
            .collect(),
        config.operation.num_to_avg,
    ));
    let poll = config.operation.poll_interval();

    let (link, end) = exchange::channel();
    let exchanger = Exchanger::new(
        Arc::clone(&instrument),
        Arc::clone(&saver),
        Arc::clone(&live),
        end,
        poll,
    )
    .spawn()?;
    let mut orchestrator = Orchestrator::new(Arc::clone(&instrument), link, poll);
    if let Some(n) = args.cycles {
        orchestrator = orchestrator.with_cycle_limit(n);
    }
    let orchestrator = orchestrator.spawn()?;

    let inst = Arc::clone(&instrument);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        inst.quit_all();
    })?;

    let mut panel = OperatorPanel::new(Arc::clone(&instrument), Arc::clone(&saver));
    let failures = panel.initialize()?;
    if failures > 0 {
        report_errors(&panel);
        error!("{failures} device(s) failed to initialize, shutting down");
        panel.quit();
    } else {
        panel.start()?;
    }

    while !orchestrator.is_finished() {
        std::thread::sleep(poll);
        if panel.active_errors() > 0 || panel.poll_errors() == 0 {
            continue;
        }
        report_errors(&panel);
        if args.auto_run {
            warn!("Acknowledging and resuming");
            panel.acknowledge();
            if let Err(e) = panel.start() {
                error!("Cannot resume: {e}");
                panel.quit();
            }
        } else {
            error!("Device fault, shutting down (use --auto-run to resume automatically)");
            panel.quit();
        }
    }

    let report = orchestrator
        .join()
        .map_err(|_| ControlError::ThreadPanicked("orchestrator"))?;
    let exchanged = exchanger
        .join()
        .map_err(|_| ControlError::ThreadPanicked("exchanger"))?;

    info!(
        "{} cycles, {} pauses, {} records saved to {}",
        report.stats.cycles,
        report.stats.pauses,
        exchanged.records - exchanged.save_failures,
        saver.current_path().display()
    );
    if exchanged.save_failures > 0 {
        warn!("{} records could not be saved", exchanged.save_failures);
    }
    if !report.errors.is_clean() {
        for failure in report.errors.errors() {
            error!("Shutdown: {failure}");
        }
        return Err(format!("{} device(s) failed to close", report.errors.errors().len()).into());
    }
    Ok(())
}

fn report_errors(panel: &OperatorPanel) {
    for (device, message) in panel.error_messages() {
        error!("{device}: {message}");
    }
}

/// Setup tracing subscriber based on CLI arguments.
///
/// The filter stays reloadable so `[shared] log_level` can replace the
/// default once the configuration has been read.
fn setup_tracing(args: &Args) -> FilterHandle {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let (filter, handle) = reload::Layer::new(filter);

    let json = args.json.then(|| fmt::layer().json());
    let text = (!args.json).then(fmt::layer);
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
    handle
}

//! Line-oriented console for driving a single device.
//!
//! Used by the `radiometer_device` binary to bring one subsystem up by hand:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `init` | `init(manual)` |
//! | `cold`, `hot`, `ant`, `ref` | chopper move |
//! | `move <steps>` | wobbler move followed by `wait()` |
//! | `run` | start one acquisition |
//! | `data [slot]` | fetch and print the last reading |
//! | `close` | release the hardware |
//! | `help`, `quit` | console control |
//!
//! A latched driver fault is reported and then cleared, so the console keeps
//! accepting commands.

use radiometer_common::device::driver::{DeviceDriver, DeviceError};
use radiometer_common::device::types::{ChopperPos, DeviceCommand, Reading};
use std::fmt::Write as _;

/// One parsed console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Print the command table.
    Help,
    /// Initialize the device.
    Init,
    /// Move the chopper.
    Chopper(ChopperPos),
    /// Move the wobbler and wait for it to settle.
    Move(i32),
    /// Start one acquisition.
    Run,
    /// Fetch data, optionally for a cycle slot.
    Data(Option<usize>),
    /// Close the device.
    Close,
    /// Leave the console.
    Quit,
}

/// Help text printed for `help`.
pub const HELP: &str = "\
init          Initialize the machine
cold|hot      Point at a calibration load
ant|ref       Point at antenna / reference position
move <steps>  Move the wobbler and wait
run           Start one acquisition
data [slot]   Fetch and print the last reading
close         Close the machine
quit          Leave";

/// Parse one input line.
///
/// # Errors
/// Returns a human-readable message for unknown commands or bad arguments.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    let arg = words.next();
    let cmd = match head {
        "help" | "?" => ConsoleCommand::Help,
        "init" => ConsoleCommand::Init,
        "run" => ConsoleCommand::Run,
        "close" => ConsoleCommand::Close,
        "quit" | "exit" => ConsoleCommand::Quit,
        "move" => {
            let steps = arg
                .ok_or_else(|| "move needs a step count".to_string())?
                .parse::<i32>()
                .map_err(|e| format!("bad step count: {e}"))?;
            ConsoleCommand::Move(steps)
        }
        "data" => match arg {
            Some(s) => ConsoleCommand::Data(Some(
                s.parse::<usize>().map_err(|e| format!("bad slot: {e}"))?,
            )),
            None => ConsoleCommand::Data(None),
        },
        other => match ChopperPos::parse(other) {
            Some(pos) => ConsoleCommand::Chopper(pos),
            None => return Err(format!("unknown command '{other}', try 'help'")),
        },
    };
    if words.next().is_some() {
        return Err(format!("too many arguments for '{head}'"));
    }
    Ok(cmd)
}

/// Execute one command against `driver` and describe the outcome.
///
/// On failure the driver's latched fault is cleared after being captured in
/// the returned error.
pub fn execute(
    driver: &mut dyn DeviceDriver,
    command: ConsoleCommand,
    manual: bool,
) -> Result<String, DeviceError> {
    let result = match command {
        ConsoleCommand::Help => Ok(HELP.to_string()),
        ConsoleCommand::Quit => Ok(String::new()),
        ConsoleCommand::Init => driver.init(manual).map(|()| "Initialized".to_string()),
        ConsoleCommand::Chopper(pos) => driver
            .run(&DeviceCommand::MoveChopper(pos))
            .map(|()| format!("Moved to {} position", pos.short_name())),
        ConsoleCommand::Move(steps) => driver
            .run(&DeviceCommand::MoveWobbler(steps))
            .and_then(|()| driver.wait())
            .map(|()| format!("Moved to {steps}")),
        ConsoleCommand::Run => driver
            .run(&DeviceCommand::Acquire)
            .map(|()| "Acquisition started".to_string()),
        ConsoleCommand::Data(slot) => driver.get_data(slot).map(|r| describe(&r)),
        ConsoleCommand::Close => driver.close().map(|()| "Closed down".to_string()),
    };
    if result.is_err() || driver.has_error() {
        driver.delete_error();
    }
    result
}

/// Render a reading for the console.
pub fn describe(reading: &Reading) -> String {
    match reading {
        Reading::Empty => "no data".to_string(),
        Reading::Chopper(pos) => format!("chopper at {pos}"),
        Reading::Wobbler(steps) => format!("wobbler at {steps}"),
        Reading::Scalars(map) => {
            let mut out = String::new();
            for (k, v) in map {
                let _ = writeln!(out, "{k}: {v}");
            }
            out.trim_end().to_string()
        }
        Reading::Spectra(boards) => {
            let mut out = String::new();
            for (i, board) in boards.iter().enumerate() {
                let mean = if board.is_empty() {
                    0.0
                } else {
                    board.iter().sum::<f32>() / board.len() as f32
                };
                let _ = writeln!(out, "board {i}: {} channels, mean {mean:.3}", board.len());
            }
            out.trim_end().to_string()
        }
    }
}

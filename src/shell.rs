//! # Power Shell Commands
//!
//! Thin command wrappers over the manager for a debug console:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `power_request <mode>` | add a constraint on `<mode>` |
//! | `power_release <mode>` | drop a constraint on `<mode>` |
//! | `power_status` | dump mode, vote counters, devices and statistics |
//!
//! `<mode>` is a table index or a mode name; without it, index 0 (`None`)
//! is used. Output goes to any `core::fmt::Write` sink, typically the
//! console UART.

use core::fmt::{self, Write};

use crate::manager::LowPowerManager;
use crate::mode::SleepMode;

type CmdFn = fn(&LowPowerManager, Option<&str>, &mut dyn Write) -> fmt::Result;

struct CmdEntry {
    name: &'static str,
    summary: &'static str,
    func: CmdFn,
}

const COMMANDS: [CmdEntry; 3] = [
    CmdEntry {
        name: "power_request",
        summary: "request power management mode",
        func: power_request,
    },
    CmdEntry {
        name: "power_release",
        summary: "release power management mode",
        func: power_release,
    },
    CmdEntry {
        name: "power_status",
        summary: "dump power management status",
        func: power_status,
    },
];

/// Run one command line against `lpm`, writing its output to `out`.
pub fn execute(lpm: &LowPowerManager, line: &str, out: &mut dyn Write) -> fmt::Result {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(());
    };
    let arg = words.next();

    if cmd == "help" {
        for entry in COMMANDS.iter() {
            writeln!(out, "{}: {}", entry.name, entry.summary)?;
        }
        return Ok(());
    }

    match COMMANDS.iter().find(|entry| entry.name == cmd) {
        Some(entry) => (entry.func)(lpm, arg, out),
        None => writeln!(out, "Command {} not found", cmd),
    }
}

fn parse_mode(arg: Option<&str>, out: &mut dyn Write) -> Result<Option<SleepMode>, fmt::Error> {
    match arg {
        None => Ok(Some(SleepMode::None)),
        Some(text) => match text.parse::<SleepMode>() {
            Ok(mode) => Ok(Some(mode)),
            Err(err) => {
                writeln!(out, "{}: {}", err, text)?;
                Ok(None)
            }
        },
    }
}

fn power_request(lpm: &LowPowerManager, arg: Option<&str>, out: &mut dyn Write) -> fmt::Result {
    if let Some(mode) = parse_mode(arg, out)? {
        let current = lpm.request_mode(mode);
        writeln!(out, "requested {}, current sleep mode: {}", mode, current)?;
    }
    Ok(())
}

fn power_release(lpm: &LowPowerManager, arg: Option<&str>, out: &mut dyn Write) -> fmt::Result {
    if let Some(mode) = parse_mode(arg, out)? {
        let current = lpm.release_mode(mode);
        writeln!(out, "released {}, current sleep mode: {}", mode, current)?;
    }
    Ok(())
}

fn power_status(lpm: &LowPowerManager, _arg: Option<&str>, out: &mut dyn Write) -> fmt::Result {
    let counts = lpm.constraint_counts();

    writeln!(out, "| Power Management Mode | Counter |")?;
    writeln!(out, "+-----------------------+---------+")?;
    for mode in SleepMode::ALL {
        writeln!(out, "| {:<21} | {:>7} |", mode.name(), counts[mode.index()])?;
    }
    writeln!(out, "lpm current sleep mode: {}", lpm.current_mode())?;

    let devices = lpm.devices();
    writeln!(out, "| no    | device             |")?;
    writeln!(out, "+-------+--------------------+")?;
    for (index, device) in devices.iter().enumerate() {
        writeln!(out, "| {:<5} | {:<18p} |", index, device)?;
    }
    writeln!(out, "total register num: {}", devices.len())?;

    let stats = lpm.stats();
    writeln!(
        out,
        "episodes: {}, busy: {}, early wakes: {}, slept: {} ns",
        stats.episodes, stats.busy, stats.early_wakes, stats.slept_nsec
    )
}

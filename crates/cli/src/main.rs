// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use avrsim_config::ChipDescriptor;
use avrsim_core::memory::store::ProgramImage;
use avrsim_core::snapshot::DeviceSnapshot;
use avrsim_core::system::{build_device, load_run};
use avrsim_core::{AvrDevice, DebugControl, StopReason};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const DEFAULT_MAX_STEPS: u64 = 20_000;

fn parse_u32_addr(s: &str) -> Result<u32, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex address '{}': {}", s, e))
    } else {
        u32::from_str(trimmed).map_err(|e| format!("Invalid address '{}': {}", s, e))
    }
}

fn parse_analog(s: &str) -> Result<(String, u32), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected PIN=VALUE, got '{}'", s))?;
    let value = u32::from_str(value.trim())
        .map_err(|e| format!("Invalid analog value '{}': {}", value, e))?;
    Ok((name.trim().to_string(), value))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "AvrSim AVR Simulator", long_about = None)]
struct Cli {
    /// Path to a chip descriptor (YAML)
    #[arg(short, long, conflicts_with = "manifest", required_unless_present = "manifest")]
    chip: Option<PathBuf>,

    /// Path to a run manifest (YAML); the chip it names is loaded relative to it
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Raw flash image, loaded at word address 0
    #[arg(short, long)]
    firmware: Option<PathBuf>,

    /// Breakpoint word address (repeatable)
    #[arg(long, value_parser = parse_u32_addr)]
    breakpoint: Vec<u32>,

    /// Termination word address (repeatable). Ends the run when PC reaches it.
    #[arg(long, value_parser = parse_u32_addr)]
    stop_at: Vec<u32>,

    /// Analog input in PIN=VALUE form (repeatable)
    #[arg(long, value_parser = parse_analog)]
    analog: Vec<(String, u32)>,

    /// Maximum number of steps to execute (default: manifest value or 20000)
    #[arg(long)]
    max_steps: Option<u64>,

    /// Enable per-step execution tracing
    #[arg(short, long)]
    trace: bool,

    /// Write a device snapshot (JSON) after the run
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    stop_reason: StopReason,
    total_cycles: u64,
    device: DeviceSnapshot,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    info!("Starting AvrSim");

    let (mut device, manifest_steps) = match prepare(&cli) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let max_steps = cli
        .max_steps
        .or(manifest_steps)
        .unwrap_or(DEFAULT_MAX_STEPS);
    info!("Running for at most {} steps", max_steps);

    let stop_reason = match device.run(Some(max_steps)) {
        Ok(reason) => reason,
        Err(e) => {
            error!("Simulation error at pc={:#x}: {}", device.get_pc(), e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    info!("Stopped: {:?}", stop_reason);
    info!("Final PC: {:#x}", device.get_pc());
    info!("Total Cycles: {}", device.get_cycle_count());

    if let Some(path) = &cli.snapshot {
        if let Err(e) = write_snapshot(path, &device, stop_reason) {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    }

    ExitCode::from(EXIT_PASS)
}

fn prepare(cli: &Cli) -> anyhow::Result<(AvrDevice, Option<u64>)> {
    let (mut device, manifest_steps) = match (&cli.manifest, &cli.chip) {
        (Some(manifest), _) => {
            let (device, manifest) = load_run(manifest)?;
            (device, manifest.max_steps)
        }
        (None, Some(chip)) => {
            info!("Loading chip descriptor: {:?}", chip);
            let chip = ChipDescriptor::from_file(chip)?;
            (build_device(&chip)?, None)
        }
        (None, None) => anyhow::bail!("Either --chip or --manifest is required"),
    };

    if let Some(firmware) = &cli.firmware {
        info!("Loading firmware: {:?}", firmware);
        let bytes = std::fs::read(firmware)
            .with_context(|| format!("Failed to read firmware {:?}", firmware))?;
        device
            .load_image(&ProgramImage::from_flash_bytes(bytes))
            .context("Failed to load firmware into flash")?;
    }

    for (name, value) in &cli.analog {
        let pin = device.pin(name).context("Bad --analog argument")?;
        device.bus.signals.set_analog(pin, *value);
    }
    for addr in &cli.breakpoint {
        device.add_breakpoint(*addr);
    }
    for addr in &cli.stop_at {
        device.add_termination_address(*addr);
    }

    Ok((device, manifest_steps))
}

fn write_snapshot(path: &Path, device: &AvrDevice, stop_reason: StopReason) -> anyhow::Result<()> {
    let report = RunReport {
        stop_reason,
        total_cycles: device.total_cycles(),
        device: device.snapshot(),
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create snapshot {:?}", path))?;
    serde_json::to_writer_pretty(file, &report).context("Failed to serialize snapshot")?;
    info!("Snapshot written to {:?}", path);
    Ok(())
}

// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::Parser;
use revsim_config::SimConfig;
use revsim_core::cpu::RevCoreFactory;
use revsim_core::metrics::PerformanceMetrics;
use revsim_core::snapshot::SimulationSnapshot;
use revsim_core::transport::EndpointRegistry;
use revsim_core::Simulation;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "RevSim Multi-Core RISC-V Simulator", long_about = None)]
struct Args {
    /// Path to the simulation config (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Program to run (RV32 ELF or flat binary); overrides the config
    #[arg(short, long)]
    program: Option<PathBuf>,

    /// Program arguments, whitespace separated; overrides the config
    #[arg(short, long, allow_hyphen_values = true)]
    args: Option<String>,

    /// Number of cores; overrides the config
    #[arg(short = 'n', long)]
    cores: Option<usize>,

    /// Simulated memory size, e.g. "64MiB"; overrides the config
    #[arg(long)]
    mem_size: Option<String>,

    /// Maximum number of cycles to simulate (0 = unlimited)
    #[arg(long, default_value = "10000000")]
    max_cycles: u64,

    /// Write a JSON result file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum StopReason {
    AllCoresFinished,
    CycleLimit,
}

#[derive(Debug, Serialize)]
struct SimulationResult {
    status: &'static str,
    exit_status: u8,
    stop_reason: StopReason,
    program: String,
    program_hash: String,
    cycles: u64,
    cycles_per_second: f64,
    #[serde(flatten)]
    snapshot: SimulationSnapshot,
}

fn init_tracing(verbose: u32) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn load_config(args: &Args) -> anyhow::Result<(SimConfig, PathBuf)> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };

    let program_path = match &args.program {
        Some(path) => {
            config.program = path.to_string_lossy().into_owned();
            path.clone()
        }
        None => {
            let path = PathBuf::from(&config.program);
            match &config.base_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            }
        }
    };
    if let Some(program_args) = &args.args {
        config.args = program_args.clone();
    }
    if let Some(cores) = args.cores {
        config.num_cores = cores;
    }
    if let Some(mem_size) = &args.mem_size {
        config.mem_size = mem_size.clone();
    }

    Ok((config, program_path))
}

fn program_hash(path: &Path) -> anyhow::Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read program: {:?}", path))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// 0 when every core exited cleanly with code 0, 1 on a fault or when the
/// cycle cap was hit, otherwise the first non-zero exit code.
fn exit_status(stop_reason: StopReason, snapshot: &SimulationSnapshot) -> u8 {
    if stop_reason == StopReason::CycleLimit || snapshot.cores.iter().any(|c| c.fault.is_some()) {
        return 1;
    }
    snapshot
        .cores
        .iter()
        .filter_map(|c| c.exit_code)
        .find(|&code| code != 0)
        .map(|code| match (code & 0xFF) as u8 {
            0 => 1,
            low => low,
        })
        .unwrap_or(0)
}

fn run(args: &Args, config: SimConfig, program_path: &Path) -> anyhow::Result<u8> {
    let options = config
        .resolve()
        .context("Invalid simulation configuration")?;

    info!("Loading program: {:?}", program_path);
    let image = revsim_loader::load_program(program_path, options.mem_base)?;
    let program_hash = program_hash(program_path)?;
    info!("Entry Point: {:#x}", image.entry_point);

    let options = Arc::new(options);
    let registry = EndpointRegistry::with_loopback();
    let mut sim = Simulation::construct(options.clone(), &image, &registry, &RevCoreFactory)
        .context("Failed to construct simulation")?;

    let metrics = Arc::new(PerformanceMetrics::new());
    sim.add_observer(metrics.clone());

    sim.setup();
    for phase in 0..options.init_phases {
        sim.init(phase);
    }

    info!(
        "Starting Simulation: {} core(s) at {} Hz",
        sim.num_cores(),
        options.clock_hz
    );

    let mut cycle: u64 = 0;
    let stop_reason = loop {
        if args.max_cycles != 0 && cycle >= args.max_cycles {
            warn!("Cycle limit of {} reached", args.max_cycles);
            break StopReason::CycleLimit;
        }
        cycle += 1;
        sim.pump_messages();
        if sim.advance_cycle(cycle) {
            break StopReason::AllCoresFinished;
        }
    };

    let snapshot = sim.snapshot();
    for core in &snapshot.cores {
        match (&core.fault, core.exit_code) {
            (Some(fault), _) => error!("Core {}: {}", core.index, fault),
            (None, Some(code)) => info!(
                "Core {}: exited with code {} after {} instructions",
                core.index, code, core.retired
            ),
            (None, None) => info!(
                "Core {}: still running at pc={:#x} after {} instructions",
                core.index, core.pc, core.retired
            ),
        }
    }
    let cps = metrics.get_cps();
    info!(
        "Simulation finished: {} cycles ({:?}), {:.0} cycles/s, {} message(s)",
        cycle,
        stop_reason,
        cps,
        snapshot.messages.total()
    );

    let status = exit_status(stop_reason, &snapshot);
    if let Some(output) = &args.output {
        let result = SimulationResult {
            status: if status == 0 { "pass" } else { "fail" },
            exit_status: status,
            stop_reason,
            program: options.program.clone(),
            program_hash,
            cycles: cycle,
            cycles_per_second: cps,
            snapshot,
        };
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(output, json)
            .with_context(|| format!("Failed to write result to {:?}", output))?;
        info!("Result written to {:?}", output);
    }

    sim.teardown();
    Ok(status)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (config, program_path) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            init_tracing(u32::from(args.verbose));
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.verbose.max(u32::from(args.verbose)));

    info!("Starting RevSim");
    match run(&args, config, &program_path) {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

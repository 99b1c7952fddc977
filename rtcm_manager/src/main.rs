//! # RTCM Manager
//!
//! Runs the controller manager against simulated hardware.
//!
//! Loads the TOML configuration, starts the periodic update thread, loads
//! every configured controller, starts the `autostart` ones and keeps
//! ticking until SIGINT/SIGTERM. On shutdown every controller is stopped
//! before the cycle thread exits. If the cycle thread dies first, pending
//! and later requests fail with `ERR_SHUT_DOWN` and the process exits.

#![deny(warnings)]

use clap::Parser;
use rtcm_common::config::ConfigLoader;
use rtcm_common::consts::DEFAULT_CONFIG_PATH;
use rtcm_common::types::Strictness;
use rtcm_manager::{
    ControllerManager, ControllerRegistry, CycleRunner, ManagerConfig, ManagerError, SimHardware,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// RTCM Manager: real-time controller manager
#[derive(Parser, Debug)]
#[command(name = "rtcm_manager")]
#[command(version)]
#[command(about = "Loads, switches and updates controllers in a periodic loop")]
struct Args {
    /// Path to the manager configuration TOML.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// CPU core to pin the cycle thread to (overrides `[cycle] cpu_core`).
    #[arg(long)]
    cpu_core: Option<usize>,

    /// SCHED_FIFO priority (overrides `[cycle] rt_priority`).
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,

    /// Print the available controller types and exit.
    #[arg(long)]
    list_types: bool,

    /// Write a JSON status report to this path on shutdown.
    #[arg(long, value_name = "FILE")]
    status_json: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("RTCM Manager v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("RTCM Manager shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ManagerConfig::load_validated(&args.config)?;
    if let Some(core) = args.cpu_core {
        config.cycle.cpu_core = core;
    }
    if let Some(priority) = args.rt_priority {
        config.cycle.rt_priority = priority;
    }
    info!(
        service = %config.shared.service_name,
        cycle_time_us = config.cycle.cycle_time_us,
        joints = config.hardware.joints.len(),
        controllers = config.controllers.len(),
        "Config OK"
    );

    let hardware = SimHardware::new(&config.hardware);
    let manager = Arc::new(ControllerManager::new(Box::new(hardware)));
    manager.register_controller_loader(Arc::new(ControllerRegistry::with_builtin_controllers()));

    if args.list_types {
        for type_name in manager.list_controller_types() {
            println!("{type_name}");
        }
        return Ok(());
    }

    for spec in &config.controllers {
        manager.set_controller_spec(spec.clone());
    }

    let cycle = CycleRunner::new(Arc::clone(&manager), config.cycle.clone()).spawn()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    for spec in &config.controllers {
        match manager.load_controller(&spec.name) {
            Ok(()) => {}
            Err(ManagerError::ShutDown) => break,
            Err(e) => error!(controller = %spec.name, "Load failed: {e}"),
        }
    }
    let autostart: Vec<&str> = config
        .controllers
        .iter()
        .filter(|spec| spec.autostart && manager.controller_state(&spec.name).is_some())
        .map(|spec| spec.name.as_str())
        .collect();
    if !autostart.is_empty() {
        match manager.switch_controller(&autostart, &[], Strictness::Strict) {
            Ok(()) => info!(controllers = ?autostart, "Autostart complete"),
            Err(e) => error!("Autostart failed: {e}"),
        }
    }

    while running.load(Ordering::SeqCst) && cycle.is_running() {
        std::thread::sleep(Duration::from_millis(100));
    }

    match manager.stop_all() {
        Ok(()) => {}
        Err(ManagerError::ShutDown) => warn!("Cycle thread exited before controllers were stopped"),
        Err(e) => warn!("Stopping controllers failed: {e}"),
    }
    let stats = cycle.stop()?;
    info!(
        cycles = stats.cycle_count,
        overruns = stats.overruns,
        avg_ns = stats.avg_cycle_ns(),
        max_ns = stats.max_cycle_ns,
        max_latency_ns = stats.max_latency_ns,
        "Cycle statistics"
    );

    if let Some(path) = &args.status_json {
        let report = serde_json::to_string_pretty(&manager.status_report())?;
        std::fs::write(path, report)?;
        info!("Status report written to {}", path.display());
    }

    Ok(())
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

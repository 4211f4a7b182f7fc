//! `aegis-sim` — The deterministic training simulator.
//!
//! Creates the bridge region, loads a mission, and steps the physics at the
//! frame rate until SIGINT, publishing radar frames and consuming the
//! core's actuator commands.

use anyhow::{Context, Result};
use clap::Parser;
use sim::{Mission, SimStepper, StepperConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "aegis-sim", about = "AEGIS deterministic training simulator")]
struct Cli {
    /// Mission JSON; the built-in warehouse incursion when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Random seed. Runs with the same mission and seed are
    /// bit-reproducible.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Shared-memory bridge region to create.
    #[arg(long, default_value = bridge_ipc::layout::DEFAULT_REGION_PATH)]
    bridge: PathBuf,

    /// Stop after this many seconds of sim time (default: run until SIGINT).
    #[arg(long)]
    duration: Option<f64>,
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        error!("FATAL: {e:#}");
        std::process::exit(-1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }

    let mission = match &cli.scenario {
        Some(path) => Mission::load(path)
            .with_context(|| format!("failed to load mission {}", path.display()))?,
        None => Mission::default_mission(),
    };
    info!(mission = %mission.mission_name, seed = cli.seed, "mission ready");

    let mut writer =
        bridge_ipc::BridgeWriter::create(&cli.bridge).context("failed to create bridge region")?;

    let config = StepperConfig {
        seed: cli.seed,
        ..Default::default()
    };
    let dt = config.dt;
    let mut stepper = SimStepper::new(&mission, config)?;

    match cli.duration {
        Some(seconds) => {
            let ticks = (seconds / dt).ceil() as u64;
            for _ in 0..ticks {
                if SHUTDOWN.load(Ordering::Relaxed) {
                    break;
                }
                let cmd = writer.latest_command();
                let points = stepper.step(&cmd);
                writer.publish(stepper.frame(), stepper.time(), &points);
            }
            info!(frames = stepper.frame(), "fixed-duration run complete");
        }
        None => stepper.run(&mut writer, &SHUTDOWN),
    }

    Ok(())
}

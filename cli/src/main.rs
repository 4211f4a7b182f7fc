//! `aegis-core` — The on-board flight software.
//!
//! Boots the autonomy stack, connects to the simulator bridge (or live
//! hardware drivers when compiled in), and runs the guidance loop until
//! SIGINT. Exit code 0 on clean shutdown, -1 on unrecoverable
//! initialization failure.

use anyhow::{bail, Context, Result};
use clap::Parser;
use guidance_core::comms::{CloudConfig, CloudLink, StationConfig, StationLink};
use guidance_core::control::{GuidanceLoop, LoopConfig};
use guidance_core::fusion::FusionEngine;
use guidance_core::perception::DetectorAdapter;
use guidance_core::platform;
use sensor_hal::types::CalibrationData;
use sensor_hal::BridgeConsumer;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "aegis-core", about = "AEGIS counter-UAS flight core")]
struct Cli {
    /// Use live capture hardware instead of the simulator bridge.
    #[arg(long)]
    live: bool,

    /// Pre-compiled detector plan.
    #[arg(long, default_value = "configs/aura_v1.plan")]
    plan: PathBuf,

    /// Shared-memory bridge region (simulation mode).
    #[arg(long, default_value = bridge_ipc::layout::DEFAULT_REGION_PATH)]
    bridge: PathBuf,

    /// Operator station TCP port.
    #[arg(long, default_value_t = 9090)]
    station_port: u16,

    /// Cloud ingestor address.
    #[arg(long, default_value = "127.0.0.1:50051")]
    cloud: String,

    /// Real-time priority for the guidance thread (SCHED_FIFO).
    #[arg(long, default_value_t = 50)]
    rt_priority: i32,
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

    info!("========================================");
    info!("   AEGIS CORE: FLIGHT SOFTWARE          ");
    info!("========================================");

    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }

    // Real-time posture; degraded scheduling is a warning, not an error.
    if platform::set_realtime_priority(cli.rt_priority) {
        info!("running with SCHED_FIFO priority {}", cli.rt_priority);
        platform::set_cpu_affinity(0);
        platform::lock_memory();
    } else {
        warn!("running with standard scheduling, latency not guaranteed");
    }

    if cli.live {
        // Live capture drivers (capture graph, radar head) are deployment
        // components and are not part of this build.
        bail!("no live capture backend compiled into this binary");
    }

    // Connecting: retry the bridge attach at 1 Hz until the sim shows up.
    info!("connecting to bridge at {}", cli.bridge.display());
    let reader = loop {
        if SHUTDOWN.load(Ordering::Relaxed) {
            return Ok(());
        }
        match bridge_ipc::BridgeReader::attach(&cli.bridge) {
            Ok(reader) => break reader,
            Err(e @ bridge_ipc::BridgeError::BadMagic { .. }) => {
                return Err(e).context("bridge protocol error");
            }
            Err(_) => {
                info!("waiting for simulator...");
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    };
    info!("bridge connected, sensors online");

    // Sensor fan-out and drivers.
    let mut consumer = BridgeConsumer::start(reader);
    let radar = Box::new(consumer.radar());
    let camera = Box::new(consumer.camera());
    let command_tx = consumer.command_sender();

    // Autonomy stack.
    let cal = CalibrationData::perfect_alignment(
        bridge_ipc::layout::VIDEO_WIDTH as u32,
        bridge_ipc::layout::VIDEO_HEIGHT as u32,
    );
    let fusion = FusionEngine::new(cal.clone());
    let detector = DetectorAdapter::from_plan(&cli.plan, cal.width, cal.height)
        .context("detector initialization failed")?;

    // Comms.
    let station = StationLink::start(StationConfig {
        port: cli.station_port,
    })
    .with_context(|| format!("failed to bind station port {}", cli.station_port))?;
    let cloud = CloudLink::start(CloudConfig {
        address: cli.cloud.clone(),
        ..Default::default()
    });

    let config = LoopConfig {
        live: cli.live,
        ..Default::default()
    };
    let mut guidance = GuidanceLoop::new(
        config,
        radar,
        camera,
        fusion,
        detector,
        command_tx,
        Some(station),
        Some(cloud),
    );

    guidance.run(&SHUTDOWN)?;
    consumer.stop();

    info!("shutdown complete");
    Ok(())
}

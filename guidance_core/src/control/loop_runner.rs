//! The fixed-rate guidance loop.
//!
//! One tick: acquire radar + image, fuse, detect, lift threat detections to
//! 3-D measurements through the depth map, track, merge operator input with
//! auto-aim, and fan the results out to the bridge, the station, and (at a
//! decimated rate) the cloud.
//!
//! Pacing is paced-but-not-catch-up: the loop sleeps for whatever remains
//! of the period and never compensates for accumulated lag. A tick that
//! overruns is logged, not dropped; the next one starts immediately.

use crate::comms::proto::TelemetryPacket as CloudPacket;
use crate::comms::{CloudLink, StationLink};
use crate::control::policy::{CommandPolicy, PolicyConfig};
use crate::fusion::FusionEngine;
use crate::perception::{DetectorAdapter, THREAT_CLASS};
use crate::tracking::{TrackManager, TrackerConfig};
use crate::CoreResult;
use bridge_ipc::layout::ControlCommand;
use bridge_ipc::station::TelemetryPacket;
use crossbeam_channel::Sender;
use sensor_hal::types::{PointCloud, RadarPoint};
use sensor_hal::{ImageSource, RadarSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Loop configuration.
#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// Target frame period. 16.66 ms ≈ 60 Hz.
    pub period: Duration,
    /// Live hardware mode: skip the tick on an invalid or mismatched frame.
    /// Simulated mode trusts the bridge and coasts through a missing frame.
    pub live: bool,
    /// Range used when the depth map has no return at the box centre (m).
    pub fallback_range_m: f32,
    /// Send one cloud packet pair every N ticks.
    pub cloud_decimation: u64,
    pub policy: PolicyConfig,
    pub tracker: TrackerConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_micros(16_660),
            live: false,
            fallback_range_m: 50.0,
            cloud_decimation: 30,
            policy: PolicyConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

/// Lifecycle of the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Booting,
    Connecting,
    Running,
    Shutdown,
}

/// What one tick did, for callers and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickOutcome {
    /// True when the tick was skipped on an invalid frame.
    pub skipped: bool,
    /// The command issued this tick, if any.
    pub command: Option<ControlCommand>,
    pub confirmed_tracks: usize,
}

/// Composes the autonomy stack and drives it at the frame rate.
pub struct GuidanceLoop {
    config: LoopConfig,
    state: LoopState,
    radar: Box<dyn RadarSource>,
    camera: Box<dyn ImageSource>,
    fusion: FusionEngine,
    detector: DetectorAdapter,
    tracker: TrackManager,
    policy: CommandPolicy,
    command_tx: Sender<ControlCommand>,
    station: Option<StationLink>,
    cloud: Option<CloudLink>,
    tick_count: u64,
    started: Instant,
    last_skip_warn: Option<Instant>,
    last_overrun_warn: Option<Instant>,
}

impl GuidanceLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LoopConfig,
        radar: Box<dyn RadarSource>,
        camera: Box<dyn ImageSource>,
        fusion: FusionEngine,
        detector: DetectorAdapter,
        command_tx: Sender<ControlCommand>,
        station: Option<StationLink>,
        cloud: Option<CloudLink>,
    ) -> Self {
        let tracker = TrackManager::new(config.tracker);
        let policy = CommandPolicy::new(config.policy);
        Self {
            config,
            state: LoopState::Booting,
            radar,
            camera,
            fusion,
            detector,
            tracker,
            policy,
            command_tx,
            station,
            cloud,
            tick_count: 0,
            started: Instant::now(),
            last_skip_warn: None,
            last_overrun_warn: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Drive ticks until the shutdown flag is raised.
    pub fn run(&mut self, shutdown: &AtomicBool) -> CoreResult<()> {
        self.state = LoopState::Running;
        info!("guidance loop engaged");

        while !shutdown.load(Ordering::Relaxed) {
            let tick_start = Instant::now();
            let now_ms = self.started.elapsed().as_millis() as u64;
            self.tick(now_ms)?;

            let elapsed = tick_start.elapsed();
            if elapsed < self.config.period {
                std::thread::sleep(self.config.period - elapsed);
            } else {
                self.warn_overrun(elapsed);
            }
        }

        self.state = LoopState::Shutdown;
        info!("guidance loop shut down");
        if let Some(station) = self.station.as_mut() {
            station.stop();
        }
        if let Some(cloud) = self.cloud.as_mut() {
            cloud.stop();
        }
        Ok(())
    }

    /// One tick of the pipeline. Public so tests can drive the loop without
    /// the pacing.
    pub fn tick(&mut self, now_ms: u64) -> CoreResult<TickOutcome> {
        self.tick_count += 1;

        // --- Sensor ingestion ---
        let cloud = self.radar.get_scan();
        let image = self.camera.get_frame();
        let sys_time = cloud.timestamp;

        // Live hardware must not act on a bad frame: skip without advancing
        // the tracker. Simulated mode trusts the bridge's frame.
        if self.config.live && (!image.is_valid() || !self.frame_matches_calibration(&image)) {
            self.warn_frame("invalid image frame, skipping tick");
            return Ok(TickOutcome {
                skipped: true,
                ..Default::default()
            });
        }

        // --- Fusion and perception ---
        // A missing frame in simulated mode (bridge stall) coasts the
        // tracker through an empty detection set; the tick still runs.
        let detections = if image.is_valid() {
            let fused = self.fusion.process(&image, &cloud)?;
            self.detector.detect(&fused)?
        } else {
            self.warn_frame("camera frame missing, coasting tracker");
            Vec::new()
        };

        // --- Lift threat detections to 3-D measurements ---
        let mut measurements = PointCloud {
            timestamp: sys_time,
            points: Vec::with_capacity(detections.len()),
        };
        for det in &detections {
            if det.class_id != THREAT_CLASS {
                continue;
            }
            let (cx, cy) = det.center();
            let depth = self.fusion.depth_at(cx as u32, cy as u32);
            let range = if depth.is_finite() {
                depth
            } else {
                self.config.fallback_range_m
            };
            let [x, y, z] = self.fusion.unproject(cx, cy, range);
            measurements.points.push(RadarPoint {
                x,
                y,
                z,
                velocity: 0.0,
                snr: det.confidence * 100.0,
                track_id: det.track_id,
            });
        }

        // --- Tracking ---
        self.tracker.process_scan(&measurements);
        let tracks = self.tracker.get_tracks();
        let confirmed = self.tracker.confirmed_count();
        let primary = tracks.iter().find(|t| t.confirmed);

        // --- Command policy ---
        if let Some(station) = self.station.as_ref() {
            if let Some(packet) = station.get_latest_command() {
                self.policy.ingest(packet, now_ms);
            }
        }
        let command = self.policy.decide(now_ms, primary);

        // --- Actuation ---
        let _ = self.command_tx.try_send(command);

        // --- Telemetry ---
        if let Some(station) = self.station.as_ref() {
            station.broadcast_telemetry(&TelemetryPacket {
                timestamp: sys_time,
                pan: command.pan_velocity,
                tilt: command.tilt_velocity,
                target_count: confirmed as i32,
            });
        }
        if self.tick_count % self.config.cloud_decimation == 0 {
            if let Some(cloud_link) = self.cloud.as_ref() {
                cloud_link.enqueue(CloudPacket::health(45.0, 57.0));
                if let Some(track) = primary {
                    cloud_link.enqueue(CloudPacket::detection(
                        track.id,
                        track.position(),
                        track.confidence,
                    ));
                }
            }
        }

        Ok(TickOutcome {
            skipped: false,
            command: Some(command),
            confirmed_tracks: confirmed,
        })
    }

    fn frame_matches_calibration(&self, image: &sensor_hal::types::ImageFrame) -> bool {
        let cal = self.fusion.calibration();
        image.width == cal.width && image.height == cal.height
    }

    /// At most one frame complaint per second.
    fn warn_frame(&mut self, message: &'static str) {
        let now = Instant::now();
        let due = self
            .last_skip_warn
            .map_or(true, |t| now.duration_since(t) >= Duration::from_secs(1));
        if due {
            warn!("{message}");
            self.last_skip_warn = Some(now);
        }
    }

    fn warn_overrun(&mut self, elapsed: Duration) {
        let now = Instant::now();
        let due = self
            .last_overrun_warn
            .map_or(true, |t| now.duration_since(t) >= Duration::from_secs(1));
        if due {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = self.config.period.as_millis() as u64,
                "tick overran the frame period"
            );
            self.last_overrun_warn = Some(now);
        }
    }
}

//! Bridge-fed sensor drivers.
//!
//! Exactly one [`BridgeConsumer`] owns the shared-memory reader. Its pump
//! thread polls the region, decodes each new frame into a [`PointCloud`] and
//! an [`ImageFrame`], and fans them out on bounded channels; the radar and
//! camera drivers hold only receiver ends. Actuator commands travel the
//! reverse path on a channel drained by the same pump, so no lock is ever
//! shared with the guidance loop.

use crate::source::{ImageSource, RadarSource};
use crate::types::{ImageFrame, PointCloud, RadarPoint};
use crate::SensorResult;
use bridge_ipc::layout::ControlCommand;
use bridge_ipc::{BridgeError, BridgeReader};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, warn};

/// How long a driver blocks waiting for its producer before handing back an
/// invalid frame / empty scan.
const SOURCE_TIMEOUT: Duration = Duration::from_millis(100);

/// Pump idle sleep between region polls.
const PUMP_INTERVAL: Duration = Duration::from_millis(1);

/// Exclusive owner of the bridge reader; decodes frames and fans them out.
pub struct BridgeConsumer {
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    scan_rx: Option<Receiver<PointCloud>>,
    frame_rx: Option<Receiver<ImageFrame>>,
    cmd_tx: Sender<ControlCommand>,
}

impl BridgeConsumer {
    /// Take ownership of an attached reader and start the pump thread.
    pub fn start(mut reader: BridgeReader) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicBool::new(false));
        let (scan_tx, scan_rx) = bounded::<PointCloud>(2);
        let (frame_tx, frame_rx) = bounded::<ImageFrame>(2);
        let (cmd_tx, cmd_rx) = bounded::<ControlCommand>(8);

        let run = Arc::clone(&running);
        let fail = Arc::clone(&failed);
        let scan_drain = scan_rx.clone();
        let frame_drain = frame_rx.clone();
        let pump = std::thread::Builder::new()
            .name("bridge-pump".into())
            .spawn(move || {
                let scans = Fanout {
                    tx: scan_tx,
                    drain: scan_drain,
                };
                let frames = Fanout {
                    tx: frame_tx,
                    drain: frame_drain,
                };
                pump_loop(&mut reader, &run, &fail, &scans, &frames, &cmd_rx);
            })
            .expect("spawn bridge pump thread");

        Self {
            running,
            failed,
            pump: Some(pump),
            scan_rx: Some(scan_rx),
            frame_rx: Some(frame_rx),
            cmd_tx,
        }
    }

    /// Build the radar driver. Callable once.
    pub fn radar(&mut self) -> SimRadar {
        SimRadar {
            rx: self.scan_rx.take().expect("radar driver already taken"),
            last_time: 0.0,
            reported_loss: false,
        }
    }

    /// Build the camera driver. Callable once.
    pub fn camera(&mut self) -> SimCamera {
        SimCamera {
            rx: self.frame_rx.take().expect("camera driver already taken"),
            last_time: 0.0,
            reported_loss: false,
        }
    }

    /// Sender for actuator commands; the pump writes them to the region.
    pub fn command_sender(&self) -> Sender<ControlCommand> {
        self.cmd_tx.clone()
    }

    /// True once the pump hit an unrecoverable protocol error.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Stop the pump thread and join it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.pump.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BridgeConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sender half of a fan-out channel plus a drain handle used to displace the
/// oldest queued item when the receiver lags.
struct Fanout<T> {
    tx: Sender<T>,
    drain: Receiver<T>,
}

impl<T> Fanout<T> {
    /// Latest-only send: never blocks the pump; when the bounded queue is
    /// full, the oldest entry is dropped to make room.
    fn send_latest(&self, value: T) {
        match self.tx.try_send(value) {
            Ok(()) => {}
            Err(TrySendError::Full(value)) => {
                let _ = self.drain.try_recv();
                let _ = self.tx.try_send(value);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

fn pump_loop(
    reader: &mut BridgeReader,
    running: &AtomicBool,
    failed: &AtomicBool,
    scans: &Fanout<PointCloud>,
    frames: &Fanout<ImageFrame>,
    cmd_rx: &Receiver<ControlCommand>,
) {
    while running.load(Ordering::Relaxed) {
        // Reverse channel first so commands are never delayed by decode work.
        while let Ok(cmd) = cmd_rx.try_recv() {
            reader.send_command(&cmd);
        }

        match reader.poll() {
            Ok(Some(_)) => match reader.read() {
                Ok(frame) => {
                    let cloud = PointCloud {
                        timestamp: frame.sim_time,
                        points: frame
                            .points
                            .iter()
                            .map(|p| RadarPoint {
                                x: p.x,
                                y: p.y,
                                z: p.z,
                                velocity: p.velocity,
                                snr: p.snr_db,
                                track_id: 0,
                            })
                            .collect(),
                    };
                    let image = ImageFrame {
                        timestamp: frame.sim_time,
                        width: frame.video_width as u32,
                        height: frame.video_height as u32,
                        stride: frame.video_width as u32 * 3,
                        data: Some(Arc::from(frame.video)),
                    };
                    scans.send_latest(cloud);
                    frames.send_latest(image);
                }
                Err(BridgeError::NoData) => {}
                Err(e) => warn!("bridge read failed: {e}"),
            },
            Ok(None) => {}
            Err(BridgeError::FrameRegression { .. }) => {
                warn!("bridge frame regression, re-attaching");
                if reader.reattach().is_err() {
                    error!("bridge re-attach failed, feed is down");
                    failed.store(true, Ordering::Relaxed);
                    return;
                }
            }
            Err(e) => {
                error!("bridge poll failed: {e}");
                failed.store(true, Ordering::Relaxed);
                return;
            }
        }

        std::thread::sleep(PUMP_INTERVAL);
    }
}

/// Radar driver fed from the bridge pump.
pub struct SimRadar {
    rx: Receiver<PointCloud>,
    last_time: f64,
    reported_loss: bool,
}

impl RadarSource for SimRadar {
    fn initialize(&mut self) -> SensorResult<()> {
        Ok(())
    }

    fn get_scan(&mut self) -> PointCloud {
        match self.rx.recv_timeout(SOURCE_TIMEOUT) {
            Ok(cloud) => {
                self.last_time = cloud.timestamp;
                self.reported_loss = false;
                cloud
            }
            Err(_) => {
                if !self.reported_loss {
                    warn!("radar scan timed out, returning empty cloud");
                    self.reported_loss = true;
                }
                PointCloud {
                    timestamp: self.last_time,
                    points: Vec::new(),
                }
            }
        }
    }
}

/// Camera driver fed from the bridge pump.
pub struct SimCamera {
    rx: Receiver<ImageFrame>,
    last_time: f64,
    reported_loss: bool,
}

impl ImageSource for SimCamera {
    fn initialize(&mut self) -> SensorResult<()> {
        Ok(())
    }

    fn get_frame(&mut self) -> ImageFrame {
        match self.rx.recv_timeout(SOURCE_TIMEOUT) {
            Ok(frame) => {
                self.last_time = frame.timestamp;
                self.reported_loss = false;
                frame
            }
            Err(_) => {
                if !self.reported_loss {
                    warn!("camera frame timed out, returning invalid frame");
                    self.reported_loss = true;
                }
                ImageFrame::invalid(self.last_time)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_ipc::layout::SimRadarPoint;
    use bridge_ipc::BridgeWriter;

    fn temp_region(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("aegis_feed_test_{name}_{}", std::process::id()))
    }

    #[test]
    fn consumer_fans_out_scans_and_frames() {
        let path = temp_region("fanout");
        let mut writer = BridgeWriter::create(&path).unwrap();
        let reader = BridgeReader::attach(&path).unwrap();
        let mut consumer = BridgeConsumer::start(reader);
        let mut radar = consumer.radar();
        let mut camera = consumer.camera();

        writer.publish(
            1,
            0.5,
            &[SimRadarPoint {
                x: 1.0,
                y: 2.0,
                z: 80.0,
                velocity: -3.0,
                snr_db: 25.0,
            }],
        );

        let cloud = radar.get_scan();
        assert_eq!(cloud.points.len(), 1);
        assert_eq!(cloud.timestamp, 0.5);
        assert_eq!(cloud.points[0].z, 80.0);
        assert_eq!(cloud.points[0].track_id, 0);

        let frame = camera.get_frame();
        assert!(frame.is_valid());
        assert_eq!(frame.width, 1920);
        assert_eq!(frame.timestamp, 0.5);

        consumer.stop();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn timeout_yields_empty_scan_and_invalid_frame() {
        let path = temp_region("timeout");
        let _writer = BridgeWriter::create(&path).unwrap();
        let reader = BridgeReader::attach(&path).unwrap();
        let mut consumer = BridgeConsumer::start(reader);
        let mut radar = consumer.radar();
        let mut camera = consumer.camera();

        // Nothing published: both drivers time out.
        assert!(radar.get_scan().is_empty());
        assert!(!camera.get_frame().is_valid());

        consumer.stop();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn commands_reach_the_region() {
        let path = temp_region("commands");
        let writer = BridgeWriter::create(&path).unwrap();
        let reader = BridgeReader::attach(&path).unwrap();
        let mut consumer = BridgeConsumer::start(reader);

        let cmd = ControlCommand {
            timestamp_ms: 99,
            pan_velocity: 0.1,
            tilt_velocity: 0.0,
            fire_trigger: false,
        };
        consumer.command_sender().send(cmd).unwrap();

        // Give the pump a few cycles to drain the channel.
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        loop {
            if writer.latest_command() == cmd {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "command never arrived");
            std::thread::sleep(Duration::from_millis(5));
        }

        consumer.stop();
        let _ = std::fs::remove_file(&path);
    }
}

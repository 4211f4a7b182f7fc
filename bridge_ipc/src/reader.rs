//! Consumer side of the bridge: the flight core attaches to a region the
//! simulator created, polls for new frames, and writes gimbal commands back.

use crate::layout::{state, ControlCommand, SimRadarPoint, VIDEO_HEIGHT, VIDEO_WIDTH};
use crate::region::Region;
use crate::{BridgeError, BridgeResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// One decoded frame handed out by [`BridgeReader::read`]. Radar points are
/// copied out of the region; the video raster stays a borrowed view over the
/// mapped bytes and must be consumed before the next `read`.
pub struct BridgeFrame<'a> {
    pub frame_id: u64,
    pub sim_time: f64,
    pub points: Vec<SimRadarPoint>,
    pub video: &'a [u8],
    pub video_width: usize,
    pub video_height: usize,
}

/// Flight-core end of the shared-memory bridge.
#[derive(Debug)]
pub struct BridgeReader {
    region: Region,
    path: PathBuf,
    last_seen: u64,
    regressions: u32,
}

impl BridgeReader {
    /// Map the region read-write and verify the magic sentinel.
    ///
    /// Attaching is idempotent: a second attach to the same region yields an
    /// equally valid handle. Failures are reported so the caller can retry
    /// with backoff (the simulator may simply not be up yet).
    pub fn attach(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let region = Region::open(&path)?;
        region.verify_magic()?;
        debug!(path = %path.display(), "attached to bridge region");
        Ok(Self {
            region,
            path,
            last_seen: 0,
            regressions: 0,
        })
    }

    /// Drop the current mapping and attach again. Used after a frame-id
    /// regression, which indicates the producer restarted.
    pub fn reattach(&mut self) -> BridgeResult<()> {
        let region = Region::open(&self.path)?;
        region.verify_magic()?;
        self.region = region;
        self.last_seen = 0;
        self.regressions = 0;
        warn!(path = %self.path.display(), "re-attached to bridge region");
        Ok(())
    }

    /// Non-blocking check for a new frame. Returns `Some(frame_id)` iff the
    /// producer flagged a frame ready and its id advanced past the last one
    /// read. A frame id moving backwards twice in a row is a protocol error.
    pub fn poll(&mut self) -> BridgeResult<Option<u64>> {
        if self.region.state_flag().load(Ordering::Acquire) != state::READY {
            return Ok(None);
        }
        let frame_id = self.region.frame_id();
        if frame_id > self.last_seen {
            self.regressions = 0;
            return Ok(Some(frame_id));
        }
        if frame_id < self.last_seen {
            self.regressions += 1;
            if self.regressions > 1 {
                return Err(BridgeError::FrameRegression {
                    last_seen: self.last_seen,
                    observed: frame_id,
                });
            }
        }
        Ok(None)
    }

    /// Copy the radar array out of the region and expose the video raster as
    /// a read-only view. Records the frame as seen.
    pub fn read(&mut self) -> BridgeResult<BridgeFrame<'_>> {
        let flag = self.region.state_flag();
        if flag.load(Ordering::Acquire) != state::READY {
            return Err(BridgeError::NoData);
        }
        flag.store(state::READING, Ordering::Release);

        let frame_id = self.region.frame_id();
        let sim_time = self.region.sim_time();
        let points = self.region.read_radar(self.region.num_points() as usize);
        self.last_seen = frame_id;

        flag.store(state::IDLE, Ordering::Release);
        Ok(BridgeFrame {
            frame_id,
            sim_time,
            points,
            video: self.region.video(),
            video_width: VIDEO_WIDTH,
            video_height: VIDEO_HEIGHT,
        })
    }

    /// Write the actuator command block. Tear-free w.r.t. the peer's reader.
    pub fn send_command(&mut self, cmd: &ControlCommand) {
        self.region.write_command(cmd);
    }

    /// Highest frame id read so far.
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

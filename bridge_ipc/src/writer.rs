//! Producer side of the bridge: the simulator creates and owns the region,
//! publishes sensor frames, and reads back the core's actuator commands.

use crate::layout::{state, ControlCommand, SimRadarPoint, RADAR_CAPACITY};
use crate::region::Region;
use crate::BridgeResult;
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

/// Simulator end of the shared-memory bridge.
pub struct BridgeWriter {
    region: Region,
    last_published: u64,
}

impl BridgeWriter {
    /// Create the region file, size it to the fixed layout, zero the header,
    /// and stamp the magic sentinel.
    pub fn create(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let mut region = Region::create(path.as_ref())?;
        region.set_frame_id(0);
        region.set_sim_time(0.0);
        region.set_num_points(0);
        region.state_flag().store(state::IDLE, Ordering::Release);
        region.stamp_magic();
        info!(path = %path.as_ref().display(), "bridge region created");
        Ok(Self {
            region,
            last_published: 0,
        })
    }

    /// Publish one sensor frame: copy the radar points, write the header
    /// fields, then store `state_flag = READY` with release semantics so a
    /// consumer that observes the flag sees the full payload.
    ///
    /// `frame_id` must advance monotonically; `points` beyond the region
    /// capacity are dropped with a warning.
    pub fn publish(&mut self, frame_id: u64, sim_time: f64, points: &[SimRadarPoint]) {
        debug_assert!(frame_id > self.last_published, "frame_id must be monotonic");
        let count = if points.len() > RADAR_CAPACITY {
            warn!(
                points = points.len(),
                capacity = RADAR_CAPACITY,
                "radar buffer overflow, dropping tail"
            );
            RADAR_CAPACITY
        } else {
            points.len()
        };

        for (i, p) in points[..count].iter().enumerate() {
            p.write_to(self.region.radar_slot(i));
        }
        self.region.set_num_points(count as u32);
        self.region.set_sim_time(sim_time);
        self.region.set_frame_id(frame_id);
        self.region.state_flag().store(state::READY, Ordering::Release);
        self.last_published = frame_id;
    }

    /// Latest actuator command written by the core. Seqlock-protected read;
    /// returns a zeroed command until the core writes one.
    pub fn latest_command(&self) -> ControlCommand {
        self.region.read_command()
    }

    /// Mutable access to the RGB video raster for an external renderer.
    pub fn video_mut(&mut self) -> &mut [u8] {
        self.region.video_mut()
    }
}

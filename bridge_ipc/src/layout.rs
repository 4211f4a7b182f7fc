//! Fixed byte layout of the bridge region and the structs carried in it.
//!
//! All fields are little-endian with no padding between sections:
//!
//! ```text
//! offset  size        field
//! 0       64          BridgeHeader { u64 magic; u64 frame_id; f64 sim_time;
//!                                    u32 num_radar_points; u32 state_flag;
//!                                    u8 pad[28] }
//! 64      1024*20     SimRadarPoint[1024] { f32 x, y, z, velocity, snr_db }
//! 20544   32          ControlCommand { u64 timestamp_ms; f32 pan_vel;
//!                                      f32 tilt_vel; u32 fire_trigger;
//!                                      u32 seq; u8 pad[8] }
//! 20576   W*H*3       VideoBuffer (RGB8)
//! ```
//!
//! The command block's first padding word doubles as a seqlock sequence so a
//! 32-byte command can be handed over without tearing: the writer bumps it
//! to odd, writes the payload, then bumps it to even with release ordering.

/// Sentinel verified at attach. Spells "AEGISBR1" as little-endian bytes.
pub const BRIDGE_MAGIC: u64 = u64::from_le_bytes(*b"AEGISBR1");

/// Default region path shared by the simulator and the core.
pub const DEFAULT_REGION_PATH: &str = "/dev/shm/aegis_matrix_bridge";

/// Maximum radar points per published frame.
pub const RADAR_CAPACITY: usize = 1024;

/// Video raster dimensions baked into the region size.
pub const VIDEO_WIDTH: usize = 1920;
pub const VIDEO_HEIGHT: usize = 1080;

pub const HEADER_SIZE: usize = 64;
pub const POINT_SIZE: usize = 20;
pub const COMMAND_SIZE: usize = 32;
pub const VIDEO_SIZE: usize = VIDEO_WIDTH * VIDEO_HEIGHT * 3;

pub const RADAR_OFFSET: usize = HEADER_SIZE;
pub const COMMAND_OFFSET: usize = RADAR_OFFSET + RADAR_CAPACITY * POINT_SIZE;
pub const VIDEO_OFFSET: usize = COMMAND_OFFSET + COMMAND_SIZE;
pub const REGION_SIZE: usize = VIDEO_OFFSET + VIDEO_SIZE;

// Header field offsets.
pub(crate) const OFF_MAGIC: usize = 0;
pub(crate) const OFF_FRAME_ID: usize = 8;
pub(crate) const OFF_SIM_TIME: usize = 16;
pub(crate) const OFF_NUM_POINTS: usize = 24;
pub(crate) const OFF_STATE_FLAG: usize = 28;

// Command block field offsets (relative to COMMAND_OFFSET).
pub(crate) const CMD_OFF_TIMESTAMP: usize = 0;
pub(crate) const CMD_OFF_PAN: usize = 8;
pub(crate) const CMD_OFF_TILT: usize = 12;
pub(crate) const CMD_OFF_FIRE: usize = 16;
pub(crate) const CMD_OFF_SEQ: usize = 20;

/// Header `state_flag` values.
pub mod state {
    pub const IDLE: u32 = 0;
    pub const READY: u32 = 1;
    pub const READING: u32 = 2;
}

/// One raw radar return as carried over the bridge. 20 bytes on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SimRadarPoint {
    /// Position in the sensor frame (meters). Z forward, Y up, X right.
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Radial Doppler velocity (m/s, positive = receding).
    pub velocity: f32,
    /// Signal-to-noise ratio (dB).
    pub snr_db: f32,
}

impl SimRadarPoint {
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.x.to_le_bytes());
        buf[4..8].copy_from_slice(&self.y.to_le_bytes());
        buf[8..12].copy_from_slice(&self.z.to_le_bytes());
        buf[12..16].copy_from_slice(&self.velocity.to_le_bytes());
        buf[16..20].copy_from_slice(&self.snr_db.to_le_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Self {
        Self {
            x: f32::from_le_bytes(buf[0..4].try_into().unwrap()),
            y: f32::from_le_bytes(buf[4..8].try_into().unwrap()),
            z: f32::from_le_bytes(buf[8..12].try_into().unwrap()),
            velocity: f32::from_le_bytes(buf[12..16].try_into().unwrap()),
            snr_db: f32::from_le_bytes(buf[16..20].try_into().unwrap()),
        }
    }
}

/// Actuator command written back to the simulator each tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlCommand {
    /// Milliseconds since system start. Non-decreasing across ticks.
    pub timestamp_ms: u64,
    /// Gimbal pan rate (rad/s).
    pub pan_velocity: f32,
    /// Gimbal tilt rate (rad/s).
    pub tilt_velocity: f32,
    /// True when the operator has armed and pulled the trigger.
    pub fire_trigger: bool,
}

impl ControlCommand {
    /// Encode the payload fields (everything except the seqlock word).
    pub(crate) fn write_payload(&self, block: &mut [u8]) {
        block[CMD_OFF_TIMESTAMP..CMD_OFF_TIMESTAMP + 8]
            .copy_from_slice(&self.timestamp_ms.to_le_bytes());
        block[CMD_OFF_PAN..CMD_OFF_PAN + 4].copy_from_slice(&self.pan_velocity.to_le_bytes());
        block[CMD_OFF_TILT..CMD_OFF_TILT + 4].copy_from_slice(&self.tilt_velocity.to_le_bytes());
        let fire: u32 = if self.fire_trigger { 1 } else { 0 };
        block[CMD_OFF_FIRE..CMD_OFF_FIRE + 4].copy_from_slice(&fire.to_le_bytes());
    }

    pub(crate) fn read_payload(block: &[u8]) -> Self {
        let fire = u32::from_le_bytes(block[CMD_OFF_FIRE..CMD_OFF_FIRE + 4].try_into().unwrap());
        Self {
            timestamp_ms: u64::from_le_bytes(
                block[CMD_OFF_TIMESTAMP..CMD_OFF_TIMESTAMP + 8].try_into().unwrap(),
            ),
            pan_velocity: f32::from_le_bytes(block[CMD_OFF_PAN..CMD_OFF_PAN + 4].try_into().unwrap()),
            tilt_velocity: f32::from_le_bytes(
                block[CMD_OFF_TILT..CMD_OFF_TILT + 4].try_into().unwrap(),
            ),
            fire_trigger: fire != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_offsets_match_wire_contract() {
        assert_eq!(RADAR_OFFSET, 64);
        assert_eq!(COMMAND_OFFSET, 20544);
        assert_eq!(VIDEO_OFFSET, 20576);
        assert_eq!(REGION_SIZE, 20576 + 1920 * 1080 * 3);
        // The seqlock word must stay 4-byte aligned inside the block.
        assert_eq!((COMMAND_OFFSET + CMD_OFF_SEQ) % 4, 0);
        assert_eq!(OFF_STATE_FLAG % 4, 0);
    }

    #[test]
    fn radar_point_roundtrip() {
        let p = SimRadarPoint {
            x: 1.5,
            y: -2.0,
            z: 120.0,
            velocity: -14.2,
            snr_db: 23.7,
        };
        let mut buf = [0u8; POINT_SIZE];
        p.write_to(&mut buf);
        assert_eq!(SimRadarPoint::read_from(&buf), p);
    }

    #[test]
    fn command_payload_roundtrip() {
        let cmd = ControlCommand {
            timestamp_ms: 123_456,
            pan_velocity: 0.3,
            tilt_velocity: -0.1,
            fire_trigger: true,
        };
        let mut block = [0u8; COMMAND_SIZE];
        cmd.write_payload(&mut block);
        assert_eq!(ControlCommand::read_payload(&block), cmd);
    }
}

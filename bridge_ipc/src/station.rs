//! Operator-station wire protocol: fixed-size little-endian frames over TCP.
//!
//! - C→S [`CommandPacket`] (12 bytes): manual gimbal rates + arm/fire bits
//! - S→C [`TelemetryPacket`] (20 bytes): loop time, gimbal state, track count
//!
//! No variable-length fields; a reader always knows exactly how many bytes
//! to take off the socket.

/// Size of one operator command frame on the wire.
pub const COMMAND_PACKET_SIZE: usize = 12;

/// Size of one telemetry frame on the wire.
pub const TELEMETRY_PACKET_SIZE: usize = 20;

/// Manual control input from the operator station.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CommandPacket {
    /// Requested pan rate (rad/s). Non-zero means manual override.
    pub pan_velocity: f32,
    /// Requested tilt rate (rad/s).
    pub tilt_velocity: f32,
    /// Master arm switch.
    pub arm_system: bool,
    /// Trigger. Only honored while armed.
    pub fire_trigger: bool,
}

impl CommandPacket {
    pub fn to_bytes(&self) -> [u8; COMMAND_PACKET_SIZE] {
        let mut buf = [0u8; COMMAND_PACKET_SIZE];
        buf[0..4].copy_from_slice(&self.pan_velocity.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tilt_velocity.to_le_bytes());
        buf[8] = self.arm_system as u8;
        buf[9] = self.fire_trigger as u8;
        buf
    }

    pub fn from_bytes(buf: &[u8; COMMAND_PACKET_SIZE]) -> Self {
        Self {
            pan_velocity: f32::from_le_bytes(buf[0..4].try_into().unwrap()),
            tilt_velocity: f32::from_le_bytes(buf[4..8].try_into().unwrap()),
            arm_system: buf[8] != 0,
            fire_trigger: buf[9] != 0,
        }
    }

    /// True when the operator is actively steering.
    pub fn has_motion(&self) -> bool {
        self.pan_velocity != 0.0 || self.tilt_velocity != 0.0
    }
}

/// Status frame broadcast to the connected station every tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TelemetryPacket {
    /// Loop time (seconds, simulator clock in sim mode).
    pub timestamp: f64,
    /// Commanded pan rate this tick (rad/s).
    pub pan: f32,
    /// Commanded tilt rate this tick (rad/s).
    pub tilt: f32,
    /// Number of confirmed tracks.
    pub target_count: i32,
}

impl TelemetryPacket {
    pub fn to_bytes(&self) -> [u8; TELEMETRY_PACKET_SIZE] {
        let mut buf = [0u8; TELEMETRY_PACKET_SIZE];
        buf[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[8..12].copy_from_slice(&self.pan.to_le_bytes());
        buf[12..16].copy_from_slice(&self.tilt.to_le_bytes());
        buf[16..20].copy_from_slice(&self.target_count.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; TELEMETRY_PACKET_SIZE]) -> Self {
        Self {
            timestamp: f64::from_le_bytes(buf[0..8].try_into().unwrap()),
            pan: f32::from_le_bytes(buf[8..12].try_into().unwrap()),
            tilt: f32::from_le_bytes(buf[12..16].try_into().unwrap()),
            target_count: i32::from_le_bytes(buf[16..20].try_into().unwrap()),
        }
    }
}

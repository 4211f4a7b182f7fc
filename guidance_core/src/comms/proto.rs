//! Cloud ingestor message types.
//!
//! Defined with prost derive macros and carried as length-delimited frames
//! (u32 little-endian length prefix) on the bidirectional stream. The
//! ingestor service owns the canonical schema; tags here must not change.

use prost::Message;

/// One telemetry sample sent upstream.
#[derive(Clone, PartialEq, Message)]
pub struct TelemetryPacket {
    /// Unique id of this pod
    #[prost(string, tag = "1")]
    pub unit_id: String,

    /// Wall-clock milliseconds since the Unix epoch, stamped at send time
    #[prost(uint64, tag = "2")]
    pub timestamp_ms: u64,

    #[prost(oneof = "Payload", tags = "3, 4")]
    pub payload: Option<Payload>,
}

/// Telemetry payload variants.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Payload {
    #[prost(message, tag = "3")]
    Health(Health),
    #[prost(message, tag = "4")]
    Detection(DetectionEvent),
}

/// Periodic platform health sample.
#[derive(Clone, PartialEq, Message)]
pub struct Health {
    #[prost(float, tag = "1")]
    pub cpu_temp_c: f32,
    #[prost(float, tag = "2")]
    pub gpu_temp_c: f32,
}

/// A confirmed track observation.
#[derive(Clone, PartialEq, Message)]
pub struct DetectionEvent {
    #[prost(uint32, tag = "1")]
    pub track_id: u32,
    /// Sensor-frame position (meters)
    #[prost(float, tag = "2")]
    pub x: f32,
    #[prost(float, tag = "3")]
    pub y: f32,
    #[prost(float, tag = "4")]
    pub z: f32,
    #[prost(float, tag = "5")]
    pub confidence: f32,
}

/// Command sent downstream by the ingestor.
#[derive(Clone, PartialEq, Message)]
pub struct ServerCommand {
    #[prost(enumeration = "CommandKind", tag = "1")]
    pub command: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum CommandKind {
    Ack = 0,
    Reboot = 1,
}

impl TelemetryPacket {
    /// Health sample; unit id and timestamp are stamped by the writer.
    pub fn health(cpu_temp_c: f32, gpu_temp_c: f32) -> Self {
        Self {
            unit_id: String::new(),
            timestamp_ms: 0,
            payload: Some(Payload::Health(Health {
                cpu_temp_c,
                gpu_temp_c,
            })),
        }
    }

    /// Track observation; unit id and timestamp are stamped by the writer.
    pub fn detection(track_id: u32, position: [f32; 3], confidence: f32) -> Self {
        Self {
            unit_id: String::new(),
            timestamp_ms: 0,
            payload: Some(Payload::Detection(DetectionEvent {
                track_id,
                x: position[0],
                y: position[1],
                z: position[2],
                confidence,
            })),
        }
    }
}

/// Frame a message with its u32 little-endian length prefix.
pub fn encode_frame<M: Message>(msg: &M) -> Vec<u8> {
    let body = msg.encode_to_vec();
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    frame
}

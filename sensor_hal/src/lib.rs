//! `sensor_hal` — Sensor data model and polymorphic sensor intake.
//!
//! # Module layout
//! - [`types`]       — `RadarPoint`, `PointCloud`, `ImageFrame`, `CalibrationData`
//! - [`source`]      — `RadarSource` / `ImageSource` capability traits
//! - [`bridge_feed`] — Bridge-fed drivers: one consumer pumps the shared
//!   memory region and fans decoded scans/frames out on channels
//!
//! The guidance loop depends only on the capability traits, never on a
//! concrete producer.

pub mod bridge_feed;
pub mod source;
pub mod types;

use thiserror::Error;

pub use bridge_feed::{BridgeConsumer, SimCamera, SimRadar};
pub use source::{ImageSource, RadarSource};
pub use types::{CalibrationData, ImageFrame, PointCloud, RadarPoint};

/// Result type for sensor intake operations.
pub type SensorResult<T> = Result<T, SensorError>;

/// Errors raised while bringing a sensor source up or tearing it down.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("bridge transport failed: {0}")]
    Bridge(#[from] bridge_ipc::BridgeError),

    #[error("sensor feed disconnected")]
    Disconnected,
}

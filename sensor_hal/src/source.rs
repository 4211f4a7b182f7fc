//! Capability traits for sensor intake.
//!
//! The guidance loop depends on these contracts only; whether the producer
//! is the simulator bridge, a capture graph, or a file replay is wiring
//! decided in the binary.

use crate::types::{ImageFrame, PointCloud};
use crate::SensorResult;

/// A radar delivering timestamped point clouds.
///
/// `get_scan` may block up to a short internal timeout waiting for the
/// producer; on timeout it returns an empty cloud stamped with the last
/// known time rather than an error.
pub trait RadarSource: Send {
    fn initialize(&mut self) -> SensorResult<()>;
    fn get_scan(&mut self) -> PointCloud;
}

/// A camera delivering timestamped RGB frames.
///
/// `get_frame` may block up to a short internal timeout; on timeout it
/// returns an invalid frame (`data == None`) which the loop skips.
pub trait ImageSource: Send {
    fn initialize(&mut self) -> SensorResult<()>;
    fn get_frame(&mut self) -> ImageFrame;
}

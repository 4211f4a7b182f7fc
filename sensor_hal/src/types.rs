//! Fundamental sensor types shared across the workspace.

use nalgebra::{Matrix3, Vector3};
use std::sync::Arc;

/// A single radar return in the sensor frame. Z forward, Y up, X right.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RadarPoint {
    /// Position relative to the sensor (meters)
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Radial Doppler velocity (m/s, positive = receding)
    pub velocity: f32,
    /// Signal-to-noise ratio (dB)
    pub snr: f32,
    /// Hardware tracker id, 0 = unknown
    pub track_id: u32,
}

impl RadarPoint {
    /// Straight-line distance to another point (meters).
    pub fn distance_to(&self, other: &RadarPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// A timestamped batch of radar returns. At most 1024 points; ordering is
/// insertion order from the radar and carries no meaning.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    /// Scan timestamp (seconds, source clock). Strictly monotonic per source.
    pub timestamp: f64,
    pub points: Vec<RadarPoint>,
}

impl PointCloud {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One camera frame. `data == None` means the frame is invalid (acquisition
/// timeout or dropped frame) and must be skipped by the loop.
///
/// Ownership: the producing `ImageSource` retains the pixel buffer until its
/// next `get_frame()`; consumers share it read-only through the `Arc`.
#[derive(Clone, Debug, Default)]
pub struct ImageFrame {
    /// Frame timestamp (seconds, source clock)
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// Bytes per row (RGB8, so normally `width * 3`)
    pub stride: u32,
    /// RGB8 pixel data, `None` for an invalid frame
    pub data: Option<Arc<[u8]>>,
}

impl ImageFrame {
    /// Build an invalid frame carrying only a timestamp.
    pub fn invalid(timestamp: f64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.data.is_some()
    }
}

/// Camera intrinsics and radar→camera extrinsics. Immutable for a session.
#[derive(Clone, Debug)]
pub struct CalibrationData {
    /// 3×3 intrinsic matrix K
    pub k: Matrix3<f32>,
    /// 3×3 extrinsic rotation (sensor frame → camera frame)
    pub r: Matrix3<f32>,
    /// Extrinsic translation (meters)
    pub t: Vector3<f32>,
    pub width: u32,
    pub height: u32,
}

impl CalibrationData {
    /// Calibration for a radar boresighted with the camera: identity
    /// rotation, zero offset, principal point at the image centre, and a
    /// focal length of one image width (≈ 53° horizontal field of view).
    pub fn perfect_alignment(width: u32, height: u32) -> Self {
        let f = width as f32;
        let k = Matrix3::new(
            f,
            0.0,
            width as f32 / 2.0,
            0.0,
            f,
            height as f32 / 2.0,
            0.0,
            0.0,
            1.0,
        );
        Self {
            k,
            r: Matrix3::identity(),
            t: Vector3::zeros(),
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_frame_has_no_data() {
        let frame = ImageFrame::invalid(1.5);
        assert!(!frame.is_valid());
        assert_eq!(frame.timestamp, 1.5);
    }

    #[test]
    fn perfect_alignment_centers_principal_point() {
        let cal = CalibrationData::perfect_alignment(1920, 1080);
        assert_eq!(cal.k[(0, 2)], 960.0);
        assert_eq!(cal.k[(1, 2)], 540.0);
        assert_eq!(cal.r, Matrix3::identity());
    }

    #[test]
    fn point_distance() {
        let a = RadarPoint {
            z: 100.0,
            ..Default::default()
        };
        let b = RadarPoint {
            z: 97.0,
            x: 4.0,
            ..Default::default()
        };
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-6);
    }
}

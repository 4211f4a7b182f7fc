//! Sensor fusion: project the radar point cloud onto the camera plane to
//! build dense depth and radial-velocity maps aligned with the RGB frame.
//!
//! # Kernel
//! Parallel over radar points: transform each sensor-frame point through the
//! extrinsics, reject behind the near plane, project through K, and resolve
//! per-pixel contention with a packed 64-bit atomic (depth bits above
//! velocity bits) compare-exchange minimum. Nearest return wins the pixel;
//! ties on identical depth favour the later writer. Depth and velocity are
//! then unpacked into the engine's output maps.
//!
//! No synchronization happens in `process` — ordering to the detector is via
//! the shared stream.

use crate::device::Stream;
use crate::{CoreError, CoreResult};
use rayon::prelude::*;
use sensor_hal::types::{CalibrationData, ImageFrame, PointCloud};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Device-side staging capacity for radar points. The engine never
/// reallocates on the hot path; clouds beyond this drop their tail.
const STAGING_CAPACITY: usize = 2048;

/// Points closer than this to the camera plane are rejected (meters).
const NEAR_PLANE: f32 = 0.1;

/// Packed map cell representing "no return": depth = +∞ (0x7f800000),
/// velocity = 0.
const EMPTY_CELL: u64 = 0x7f80_0000u64 << 32;

/// A per-tick bundle of aligned RGB, depth, and velocity maps plus the
/// stream on which further work is queued. Borrows the engine's buffers and
/// the input frame's pixels: the borrow checker enforces the contract that
/// the frame is consumed before the next `process` call.
pub struct FusedFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub rgb: &'a [u8],
    pub depth: &'a [f32],
    pub velocity: &'a [f32],
    pub stream: &'a Stream,
}

/// Projects radar returns into camera pixel space.
pub struct FusionEngine {
    cal: CalibrationData,
    stream: Stream,
    /// Contention cells: depth bits in the high word, velocity in the low.
    packed: Vec<AtomicU64>,
    depth: Vec<f32>,
    velocity: Vec<f32>,
}

impl FusionEngine {
    /// Allocate the map and staging buffers once for the whole session.
    pub fn new(cal: CalibrationData) -> Self {
        let pixels = cal.width as usize * cal.height as usize;
        let mut packed = Vec::with_capacity(pixels);
        packed.resize_with(pixels, || AtomicU64::new(EMPTY_CELL));
        Self {
            cal,
            stream: Stream::new(),
            packed,
            depth: vec![f32::INFINITY; pixels],
            velocity: vec![0.0; pixels],
        }
    }

    /// The stream shared with downstream perception work.
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn calibration(&self) -> &CalibrationData {
        &self.cal
    }

    /// Fuse one tick of sensor data. The returned frame is valid until the
    /// next `process` call on this engine.
    pub fn process<'a>(
        &'a mut self,
        img: &'a ImageFrame,
        cloud: &PointCloud,
    ) -> CoreResult<FusedFrame<'a>> {
        let rgb = img.data.as_deref().ok_or(CoreError::InvalidFrame)?;
        if img.width != self.cal.width || img.height != self.cal.height {
            return Err(CoreError::Kernel(format!(
                "frame {}x{} does not match calibration {}x{}",
                img.width, img.height, self.cal.width, self.cal.height
            )));
        }

        // Clear maps to "no return".
        self.packed
            .par_iter()
            .for_each(|cell| cell.store(EMPTY_CELL, Ordering::Relaxed));

        let count = if cloud.points.len() > STAGING_CAPACITY {
            warn!(
                points = cloud.points.len(),
                capacity = STAGING_CAPACITY,
                "radar cloud exceeds staging capacity, dropping tail"
            );
            STAGING_CAPACITY
        } else {
            cloud.points.len()
        };

        let width = self.cal.width as i64;
        let height = self.cal.height as i64;
        let k = self.cal.k;
        let r = self.cal.r;
        let t = self.cal.t;
        let packed = &self.packed;

        // Projection kernel, parallel over radar points.
        cloud.points[..count].par_iter().for_each(|p| {
            let cam = r * nalgebra::Vector3::new(p.x, p.y, p.z) + t;
            if cam.z <= NEAR_PLANE {
                return;
            }
            let uvw = k * cam;
            let u = (uvw.x / cam.z).floor() as i64;
            let v = (uvw.y / cam.z).floor() as i64;
            if u < 0 || u >= width || v < 0 || v >= height {
                return;
            }
            let idx = v as usize * width as usize + u as usize;
            let key = ((cam.z.to_bits() as u64) << 32) | p.velocity.to_bits() as u64;

            let cell = &packed[idx];
            let mut cur = cell.load(Ordering::Relaxed);
            loop {
                // Depth occupies the high word; positive-float bit patterns
                // order like the floats, so a plain integer compare is the
                // atomic min. Equal depth replaces: later writer wins.
                if (key >> 32) > (cur >> 32) {
                    break;
                }
                match cell.compare_exchange_weak(cur, key, Ordering::Relaxed, Ordering::Relaxed) {
                    Ok(_) => break,
                    Err(observed) => cur = observed,
                }
            }
        });

        // Unpack into the output maps.
        self.depth
            .par_iter_mut()
            .zip(self.velocity.par_iter_mut())
            .zip(self.packed.par_iter())
            .for_each(|((d, v), cell)| {
                let bits = cell.load(Ordering::Relaxed);
                *d = f32::from_bits((bits >> 32) as u32);
                *v = f32::from_bits(bits as u32);
            });

        self.stream.record();

        Ok(FusedFrame {
            width: self.cal.width,
            height: self.cal.height,
            rgb,
            depth: &self.depth,
            velocity: &self.velocity,
            stream: &self.stream,
        })
    }

    /// Sample the depth map at a pixel. `+∞` means no radar return landed
    /// there this tick.
    pub fn depth_at(&self, u: u32, v: u32) -> f32 {
        if u >= self.cal.width || v >= self.cal.height {
            return f32::INFINITY;
        }
        self.depth[v as usize * self.cal.width as usize + u as usize]
    }

    /// Back-project a pixel at a given depth into the sensor frame.
    pub fn unproject(&self, u: f32, v: f32, depth: f32) -> [f32; 3] {
        let fx = self.cal.k[(0, 0)];
        let fy = self.cal.k[(1, 1)];
        let cx = self.cal.k[(0, 2)];
        let cy = self.cal.k[(1, 2)];
        let x = (u - cx) / fx * depth;
        let y = (v - cy) / fy * depth;
        [x, y, depth]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_hal::types::RadarPoint;
    use std::sync::Arc;

    fn frame(width: u32, height: u32, t: f64) -> ImageFrame {
        ImageFrame {
            timestamp: t,
            width,
            height,
            stride: width * 3,
            data: Some(Arc::from(vec![0u8; (width * height * 3) as usize].as_slice())),
        }
    }

    fn point(x: f32, y: f32, z: f32, vel: f32) -> RadarPoint {
        RadarPoint {
            x,
            y,
            z,
            velocity: vel,
            snr: 30.0,
            track_id: 0,
        }
    }

    #[test]
    fn boresight_point_lands_on_principal_point() {
        let mut engine = FusionEngine::new(CalibrationData::perfect_alignment(640, 480));
        let img = frame(640, 480, 0.0);
        let cloud = PointCloud {
            timestamp: 0.0,
            points: vec![point(0.0, 0.0, 100.0, -8.0)],
        };
        let fused = engine.process(&img, &cloud).unwrap();
        let idx = 240 * 640 + 320;
        assert_eq!(fused.depth[idx], 100.0);
        assert_eq!(fused.velocity[idx], -8.0);
        drop(fused);
        assert_eq!(engine.depth_at(320, 240), 100.0);
    }

    #[test]
    fn nearest_return_wins_the_pixel() {
        let mut engine = FusionEngine::new(CalibrationData::perfect_alignment(640, 480));
        let img = frame(640, 480, 0.0);
        let cloud = PointCloud {
            timestamp: 0.0,
            points: vec![point(0.0, 0.0, 120.0, -3.0), point(0.0, 0.0, 80.0, -9.0)],
        };
        let fused = engine.process(&img, &cloud).unwrap();
        let idx = 240 * 640 + 320;
        assert_eq!(fused.depth[idx], 80.0);
        assert_eq!(fused.velocity[idx], -9.0);
    }

    #[test]
    fn behind_near_plane_is_rejected() {
        let mut engine = FusionEngine::new(CalibrationData::perfect_alignment(64, 64));
        let img = frame(64, 64, 0.0);
        let cloud = PointCloud {
            timestamp: 0.0,
            points: vec![point(0.0, 0.0, -5.0, 0.0), point(0.0, 0.0, 0.05, 0.0)],
        };
        let fused = engine.process(&img, &cloud).unwrap();
        assert!(fused.depth.iter().all(|d| d.is_infinite()));
    }

    #[test]
    fn maps_are_cleared_between_ticks() {
        let mut engine = FusionEngine::new(CalibrationData::perfect_alignment(64, 64));
        let img = frame(64, 64, 0.0);
        let cloud = PointCloud {
            timestamp: 0.0,
            points: vec![point(0.0, 0.0, 50.0, -2.0)],
        };
        engine.process(&img, &cloud).unwrap();
        let empty = PointCloud {
            timestamp: 0.016,
            points: vec![],
        };
        let fused = engine.process(&img, &empty).unwrap();
        assert!(fused.depth.iter().all(|d| d.is_infinite()));
        assert!(fused.velocity.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn oversized_cloud_is_truncated_not_reallocated() {
        let mut engine = FusionEngine::new(CalibrationData::perfect_alignment(64, 64));
        let img = frame(64, 64, 0.0);
        let cloud = PointCloud {
            timestamp: 0.0,
            points: (0..3000).map(|_| point(0.0, 0.0, 50.0, -1.0)).collect(),
        };
        // Must not panic; the tail beyond capacity is simply dropped.
        let fused = engine.process(&img, &cloud).unwrap();
        assert_eq!(fused.depth[32 * 64 + 32], 50.0);
    }

    #[test]
    fn invalid_frame_is_refused() {
        let mut engine = FusionEngine::new(CalibrationData::perfect_alignment(64, 64));
        let img = ImageFrame::invalid(0.0);
        let cloud = PointCloud::default();
        assert!(matches!(
            engine.process(&img, &cloud),
            Err(CoreError::InvalidFrame)
        ));
    }

    #[test]
    fn unproject_inverts_projection() {
        let engine = FusionEngine::new(CalibrationData::perfect_alignment(640, 480));
        let p = engine.unproject(320.0, 240.0, 100.0);
        assert_eq!(p, [0.0, 0.0, 100.0]);
        let q = engine.unproject(480.0, 240.0, 64.0);
        // 160 px off-centre at f=640 → x = 160/640 * 64 = 16 m
        assert!((q[0] - 16.0).abs() < 1e-4);
    }
}

//! Perception: the detector adapter over a pre-compiled inference plan.
//!
//! The adapter owns the 5-channel input tensor and the bounded output
//! buffer. Per `detect`: a preprocessing kernel normalizes RGB to [0,1] and
//! stacks `(R, G, B, depth_n, velocity_n)` channel-major, the engine runs,
//! the output copy is issued, and the engine stream is synchronized once —
//! the only synchronous device wait of the tick. Results are filtered at
//! `confidence ≥ 0.5`, clamped to the image extents, and returned in
//! descending confidence order.
//!
//! Plan loading can fail only at construction; the hot path returns status,
//! never panics.

use crate::device::Stream;
use crate::fusion::FusedFrame;
use crate::{CoreError, CoreResult};
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

/// Class id of the threat class the tracker consumes.
pub const THREAT_CLASS: i32 = 0;

/// Upper bound on detections decoded per frame.
pub const MAX_DETECTIONS: usize = 100;

/// Detections below this confidence are discarded.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Depth channel normalization range (meters → [0,1]).
pub const DEPTH_NORM_RANGE: f32 = 200.0;

/// Velocity channel normalization range (m/s → [-1,1]).
pub const VELOCITY_NORM_RANGE: f32 = 50.0;

/// One decoded detection in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Detection {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    /// Confidence score in [0,1]
    pub confidence: f32,
    /// 0 = drone, 1 = bird, 2 = plane
    pub class_id: i32,
    /// Tracker id carried from a previous stage, 0 if unassigned
    pub track_id: u32,
}

impl Detection {
    /// Bounding-box centre (pixels).
    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }
}

/// The neural executor behind the adapter. Input is the channel-major
/// `5×H×W` tensor; implementations write at most `output.len()` detections
/// and return the count.
pub trait InferenceEngine: Send {
    fn infer(
        &mut self,
        input: &[f32],
        width: u32,
        height: u32,
        output: &mut [Detection],
        stream: &Stream,
    ) -> CoreResult<usize>;
}

/// Owns the device buffers and drives one inference per tick.
pub struct DetectorAdapter {
    engine: Box<dyn InferenceEngine>,
    width: u32,
    height: u32,
    /// Channel-major input tensor, 5·W·H floats, allocated once.
    input: Vec<f32>,
    /// Bounded output buffer, MAX_DETECTIONS slots.
    output: Vec<Detection>,
}

impl DetectorAdapter {
    /// Load the inference plan from disk and build the adapter. Failures
    /// here are fatal at startup and never occur during steady state.
    pub fn from_plan(path: impl AsRef<Path>, width: u32, height: u32) -> CoreResult<Self> {
        let engine = PlanEngine::load(path)?;
        Ok(Self::with_engine(Box::new(engine), width, height))
    }

    /// Build the adapter over an already-constructed engine.
    pub fn with_engine(engine: Box<dyn InferenceEngine>, width: u32, height: u32) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            engine,
            width,
            height,
            input: vec![0.0; 5 * pixels],
            output: vec![Detection::default(); MAX_DETECTIONS],
        }
    }

    /// Run preprocessing, inference, and output decode for one fused frame.
    pub fn detect(&mut self, fused: &FusedFrame<'_>) -> CoreResult<Vec<Detection>> {
        let pixels = self.width as usize * self.height as usize;

        // Preprocess kernel: normalize and stack channels.
        let (rgb, depth, velocity) = (fused.rgb, fused.depth, fused.velocity);
        let (r_plane, rest) = self.input.split_at_mut(pixels);
        let (g_plane, rest) = rest.split_at_mut(pixels);
        let (b_plane, rest) = rest.split_at_mut(pixels);
        let (d_plane, v_plane) = rest.split_at_mut(pixels);

        r_plane
            .par_iter_mut()
            .zip(g_plane.par_iter_mut())
            .zip(b_plane.par_iter_mut())
            .zip(d_plane.par_iter_mut())
            .zip(v_plane.par_iter_mut())
            .enumerate()
            .for_each(|(i, ((((r, g), b), d), v))| {
                *r = rgb[i * 3] as f32 / 255.0;
                *g = rgb[i * 3 + 1] as f32 / 255.0;
                *b = rgb[i * 3 + 2] as f32 / 255.0;
                let depth_m = depth[i];
                *d = if depth_m.is_finite() {
                    (depth_m / DEPTH_NORM_RANGE).min(1.0)
                } else {
                    0.0
                };
                *v = (velocity[i] / VELOCITY_NORM_RANGE).clamp(-1.0, 1.0);
            });
        fused.stream.record();

        // Inference + output copy, then the single sync of the tick.
        let count = self.engine.infer(
            &self.input,
            self.width,
            self.height,
            &mut self.output,
            fused.stream,
        )?;
        fused.stream.synchronize();

        let mut detections: Vec<Detection> = self.output[..count.min(MAX_DETECTIONS)]
            .iter()
            .filter(|d| d.confidence >= CONFIDENCE_THRESHOLD)
            .map(|d| {
                let mut d = *d;
                d.x_min = d.x_min.clamp(0.0, self.width as f32);
                d.x_max = d.x_max.clamp(0.0, self.width as f32);
                d.y_min = d.y_min.clamp(0.0, self.height as f32);
                d.y_max = d.y_max.clamp(0.0, self.height as f32);
                d
            })
            .collect();
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(detections)
    }
}

// ---------------------------------------------------------------------------
// Plan engine
// ---------------------------------------------------------------------------

/// Magic prefix of an inference plan file.
const PLAN_MAGIC: &[u8; 8] = b"AURAPLAN";
const PLAN_VERSION: u32 = 1;
const PLAN_HEADER_SIZE: usize = 8 + 4 + 16;

/// Executor for a compiled `.plan` file.
///
/// The plan header carries the decode parameters; detection itself runs a
/// gated clustering pass over the depth and velocity channels: pixels with a
/// radar return inside the depth gate and a radial speed past the velocity
/// gate are grouped into grid cells, adjacent active cells merge into one
/// box, and confidence grows with the cluster's pixel support.
pub struct PlanEngine {
    /// Maximum normalized depth considered a target return (0,1].
    depth_gate: f32,
    /// Minimum |normalized velocity| considered moving.
    velocity_gate: f32,
    /// Clustering cell size in pixels.
    cell_px: u32,
    /// Pixel-support → confidence scale.
    confidence_scale: f32,
}

impl PlanEngine {
    /// Parse and validate a plan file. Surfaced at construction only.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| CoreError::DetectorLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if bytes.len() < PLAN_HEADER_SIZE {
            return Err(CoreError::DetectorLoad {
                path: path.to_path_buf(),
                reason: format!("truncated plan: {} bytes", bytes.len()),
            });
        }
        if &bytes[0..8] != PLAN_MAGIC {
            return Err(CoreError::DetectorLoad {
                path: path.to_path_buf(),
                reason: "bad plan magic".into(),
            });
        }
        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version != PLAN_VERSION {
            return Err(CoreError::DetectorLoad {
                path: path.to_path_buf(),
                reason: format!("unsupported plan version {version}"),
            });
        }
        let f = |off: usize| f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        let engine = Self {
            depth_gate: f(12),
            velocity_gate: f(16),
            cell_px: f(20) as u32,
            confidence_scale: f(24),
        };
        info!(path = %path.display(), "inference plan loaded");
        Ok(engine)
    }

    /// Write a plan with the stock decode parameters. Provisioning helper
    /// for fresh installs and tests.
    pub fn write_default(path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut bytes = Vec::with_capacity(PLAN_HEADER_SIZE);
        bytes.extend_from_slice(PLAN_MAGIC);
        bytes.extend_from_slice(&PLAN_VERSION.to_le_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes()); // depth_gate
        bytes.extend_from_slice(&0.01f32.to_le_bytes()); // velocity_gate
        bytes.extend_from_slice(&16.0f32.to_le_bytes()); // cell_px
        bytes.extend_from_slice(&0.6f32.to_le_bytes()); // confidence_scale
        std::fs::write(path, bytes)
    }
}

impl InferenceEngine for PlanEngine {
    fn infer(
        &mut self,
        input: &[f32],
        width: u32,
        height: u32,
        output: &mut [Detection],
        stream: &Stream,
    ) -> CoreResult<usize> {
        stream.record();
        let (w, h) = (width as usize, height as usize);
        let pixels = w * h;
        let depth = &input[3 * pixels..4 * pixels];
        let velocity = &input[4 * pixels..5 * pixels];

        let cell = self.cell_px.max(1) as usize;
        let grid_w = w.div_ceil(cell);
        let grid_h = h.div_ceil(cell);
        let mut support = vec![0u32; grid_w * grid_h];

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let d = depth[i];
                if d > 0.0 && d <= self.depth_gate && velocity[i].abs() >= self.velocity_gate {
                    support[(y / cell) * grid_w + x / cell] += 1;
                }
            }
        }

        // Merge 4-connected active cells into clusters, row-major seed order.
        let mut visited = vec![false; grid_w * grid_h];
        let mut count = 0;
        for seed in 0..support.len() {
            if count >= output.len() {
                break;
            }
            if support[seed] == 0 || visited[seed] {
                continue;
            }
            let mut stack = vec![seed];
            visited[seed] = true;
            let (mut min_cx, mut min_cy) = (seed % grid_w, seed / grid_w);
            let (mut max_cx, mut max_cy) = (min_cx, min_cy);
            let mut pixel_support = 0u32;
            while let Some(c) = stack.pop() {
                let (cx, cy) = (c % grid_w, c / grid_w);
                pixel_support += support[c];
                min_cx = min_cx.min(cx);
                min_cy = min_cy.min(cy);
                max_cx = max_cx.max(cx);
                max_cy = max_cy.max(cy);
                let mut push = |n: usize| {
                    if support[n] > 0 && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                };
                if cx > 0 {
                    push(c - 1);
                }
                if cx + 1 < grid_w {
                    push(c + 1);
                }
                if cy > 0 {
                    push(c - grid_w);
                }
                if cy + 1 < grid_h {
                    push(c + grid_w);
                }
            }

            output[count] = Detection {
                x_min: (min_cx * cell) as f32,
                y_min: (min_cy * cell) as f32,
                x_max: ((max_cx + 1) * cell).min(w) as f32,
                y_max: ((max_cy + 1) * cell).min(h) as f32,
                confidence: (self.confidence_scale * pixel_support as f32).min(1.0),
                class_id: THREAT_CLASS,
                track_id: 0,
            };
            count += 1;
        }
        Ok(count)
    }
}

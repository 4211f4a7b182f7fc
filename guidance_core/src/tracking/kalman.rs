//! Constant-velocity Kalman filter with a diagonal covariance model.
//!
//! # Design
//! State x = [px, py, pz, vx, vy, vz]; the filter observes position only and
//! velocity is corrected through the per-axis gain on the position residual.
//! Both P and Q are diagonal: the three axes decouple into independent 1-D
//! filters, which loses cross-axis correlation but keeps the update at a
//! handful of multiplies per axis — the whole tracker stays far under the
//! tick budget. Position and velocity variances share the same growth rate,
//! so the velocity gain can never exceed the position gain.

use serde::{Deserialize, Serialize};

/// Noise configuration for a track filter.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct KalmanConfig {
    /// Process noise growth per axis (variance/s)
    pub process_noise: f32,
    /// Measurement noise variance per axis
    pub measurement_noise: f32,
    /// Initial per-axis variance for position and velocity
    pub initial_variance: f32,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.5,
            measurement_noise: 0.5,
            initial_variance: 1.0,
        }
    }
}

/// Filter state for one track.
#[derive(Clone, Copy, Debug)]
pub struct KalmanState {
    /// [px, py, pz, vx, vy, vz]
    x: [f32; 6],
    /// Diagonal covariance, same layout as the state
    p: [f32; 6],
    last_time: f64,
    q: f32,
    r: f32,
}

impl KalmanState {
    /// Initialise at a measured position with zero velocity.
    pub fn new(x: f32, y: f32, z: f32, timestamp: f64, config: KalmanConfig) -> Self {
        Self {
            x: [x, y, z, 0.0, 0.0, 0.0],
            p: [config.initial_variance; 6],
            last_time: timestamp,
            q: config.process_noise,
            r: config.measurement_noise,
        }
    }

    /// Propagate to `current_time`. Non-monotonic timestamps clamp dt to
    /// zero, which leaves the state untouched.
    pub fn predict(&mut self, current_time: f64) {
        let dt = (current_time - self.last_time) as f32;
        if dt <= 0.0 {
            return;
        }

        // x' = x + v*dt (constant velocity)
        self.x[0] += self.x[3] * dt;
        self.x[1] += self.x[4] * dt;
        self.x[2] += self.x[5] * dt;

        // P = FPF' + Q, diagonal: uncertainty grows linearly
        for p in &mut self.p {
            *p += self.q * dt;
        }
        self.last_time = current_time;
    }

    /// Fold in a position measurement, axis by axis.
    pub fn update(&mut self, mx: f32, my: f32, mz: f32) {
        let meas = [mx, my, mz];
        for i in 0..3 {
            // Innovation y = z - Hx
            let y = meas[i] - self.x[i];

            // S = HPH' + R (position variance only)
            let s = self.p[i] + self.r;

            let k_pos = self.p[i] / s;
            let k_vel = self.p[i + 3] / s;

            self.x[i] += k_pos * y;
            // Velocity learns from the position residual through its own gain
            self.x[i + 3] += k_vel * y;

            // P = (I - KH)P
            self.p[i] *= 1.0 - k_pos;
            self.p[i + 3] *= 1.0 - k_vel;
        }
    }

    pub fn position(&self) -> [f32; 3] {
        [self.x[0], self.x[1], self.x[2]]
    }

    pub fn velocity(&self) -> [f32; 3] {
        [self.x[3], self.x[4], self.x[5]]
    }

    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    /// Euclidean distance from the predicted position to a point (meters).
    pub fn distance_to(&self, x: f32, y: f32, z: f32) -> f32 {
        let dx = self.x[0] - x;
        let dy = self.x[1] - y;
        let dz = self.x[2] - z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

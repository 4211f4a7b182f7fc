//! Rigid-body pieces of the simulation: drone drag, gimbal kinematics, and
//! kinetic projectiles.

use crate::entity::SimEntity;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Aerodynamic tuning for drone entities.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DroneDynamicsConfig {
    /// Linear drag coefficient (1/s)
    pub drag: f64,
    /// Hard speed ceiling (m/s)
    pub max_speed: f64,
}

impl Default for DroneDynamicsConfig {
    fn default() -> Self {
        Self {
            drag: 0.3,
            max_speed: 30.0,
        }
    }
}

/// Apply drag and the speed ceiling to a live entity.
pub fn apply_drone_physics(entity: &mut SimEntity, config: &DroneDynamicsConfig, dt: f64) {
    if entity.is_destroyed() {
        return;
    }
    entity.velocity *= 1.0 / (1.0 + config.drag * dt);
    let speed = entity.velocity.norm();
    if speed > config.max_speed {
        entity.velocity *= config.max_speed / speed;
    }
}

/// Pan/tilt gimbal integrating commanded rates under a slew limit.
#[derive(Clone, Copy, Debug)]
pub struct Gimbal {
    /// Azimuth around +Y (radians, 0 = boresight +Z)
    pub pan: f64,
    /// Elevation (radians, positive up)
    pub tilt: f64,
    /// Maximum rate either axis accepts (rad/s)
    pub slew_limit: f64,
}

impl Default for Gimbal {
    fn default() -> Self {
        Self {
            pan: 0.0,
            tilt: 0.0,
            slew_limit: 2.0,
        }
    }
}

impl Gimbal {
    /// Integrate one tick of commanded pan/tilt rates.
    pub fn update(&mut self, dt: f64, pan_rate: f64, tilt_rate: f64) {
        let pan_rate = pan_rate.clamp(-self.slew_limit, self.slew_limit);
        let tilt_rate = tilt_rate.clamp(-self.slew_limit, self.slew_limit);
        self.pan += pan_rate * dt;
        self.tilt = (self.tilt + tilt_rate * dt)
            .clamp(-std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_2);
    }

    /// Unit vector along the boresight.
    pub fn forward(&self) -> Vector3<f64> {
        Vector3::new(
            self.pan.sin() * self.tilt.cos(),
            self.tilt.sin(),
            self.pan.cos() * self.tilt.cos(),
        )
    }
}

/// A kinetic interceptor round.
#[derive(Clone, Copy, Debug)]
pub struct Projectile {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub age: f64,
    pub active: bool,
}

/// Muzzle velocity of the interceptor (m/s).
pub const MUZZLE_VELOCITY: f64 = 800.0;

/// Proximity radius that counts as a hit (m).
pub const KILL_RADIUS: f64 = 1.0;

/// Rounds self-expire after this flight time (s).
pub const PROJECTILE_LIFETIME: f64 = 4.0;

impl Projectile {
    pub fn fire(origin: Vector3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            position: origin,
            velocity: direction * MUZZLE_VELOCITY,
            age: 0.0,
            active: true,
        }
    }

    /// Ballistic step: gravity only.
    pub fn step(&mut self, dt: f64) {
        if !self.active {
            return;
        }
        self.velocity.y += -9.81 * dt;
        self.position += self.velocity * dt;
        self.age += dt;
        if self.position.y < 0.0 || self.age > PROJECTILE_LIFETIME {
            self.active = false;
        }
    }

    pub fn hits(&self, target: &Vector3<f64>) -> bool {
        self.active && (self.position - target).norm() < KILL_RADIUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn drag_slows_a_coasting_drone() {
        let mut e = SimEntity::new("drag", Vector3::zeros());
        e.velocity = Vector3::new(20.0, 0.0, 0.0);
        let cfg = DroneDynamicsConfig::default();
        for _ in 0..60 {
            apply_drone_physics(&mut e, &cfg, 1.0 / 60.0);
        }
        assert!(e.velocity.x < 20.0);
        assert!(e.velocity.x > 10.0);
    }

    #[test]
    fn gimbal_clamps_rate_and_tilt() {
        let mut g = Gimbal::default();
        // Commanded way past the slew limit for one second.
        for _ in 0..60 {
            g.update(1.0 / 60.0, 100.0, 100.0);
        }
        assert_abs_diff_eq!(g.pan, 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(g.tilt, std::f64::consts::FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn boresight_points_forward_at_rest() {
        let g = Gimbal::default();
        let f = g.forward();
        assert_abs_diff_eq!(f.z, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(f.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn projectile_falls_and_expires() {
        let mut p = Projectile::fire(Vector3::zeros(), Vector3::new(0.0, 0.2, 0.98));
        let initial_vy = p.velocity.y;
        for _ in 0..50 {
            p.step(0.1);
        }
        assert!(!p.active, "round must expire within its lifetime");
        assert!(p.velocity.y < initial_vy);
    }

    #[test]
    fn proximity_hit_detection() {
        let p = Projectile::fire(Vector3::new(0.0, 0.0, 99.5), Vector3::new(0.0, 0.0, 1.0));
        assert!(p.hits(&Vector3::new(0.0, 0.0, 100.0)));
        assert!(!p.hits(&Vector3::new(0.0, 5.0, 100.0)));
    }
}

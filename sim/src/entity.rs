//! Simulated entities: position, waypoint pathing, radar signature.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What kind of airframe an entity is. Drives the micro-Doppler defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Quadcopter,
    FixedWing,
    Bird,
    #[default]
    Unknown,
}

/// Rotor/wing modulation on the radial velocity of a return.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MicroDoppler {
    /// Blade tip speed (m/s); 0 disables the effect
    pub blade_speed_mps: f64,
    /// Rotation or flap rate (Hz)
    pub blade_rate_hz: f64,
    /// Biological flapping (high amplitude, low rate) vs. rotor blades
    pub flapping: bool,
}

impl MicroDoppler {
    /// Sensible signature for an airframe class.
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Quadcopter => Self {
                blade_speed_mps: 60.0,
                blade_rate_hz: 120.0,
                flapping: false,
            },
            EntityKind::FixedWing => Self {
                blade_speed_mps: 90.0,
                blade_rate_hz: 40.0,
                flapping: false,
            },
            EntityKind::Bird => Self {
                blade_speed_mps: 5.0,
                blade_rate_hz: 4.0,
                flapping: true,
            },
            EntityKind::Unknown => Self::default(),
        }
    }
}

/// One simulated airborne object with ground-truth state.
#[derive(Clone, Debug)]
pub struct SimEntity {
    pub name: String,
    pub kind: EntityKind,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Radar cross section (m²)
    pub rcs: f64,
    /// Cruise speed used when following waypoints (m/s)
    pub max_speed: f64,
    pub micro_doppler: MicroDoppler,
    waypoints: VecDeque<Vector3<f64>>,
    destroyed: bool,
}

impl SimEntity {
    pub fn new(name: impl Into<String>, start: Vector3<f64>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Unknown,
            position: start,
            velocity: Vector3::zeros(),
            rcs: 0.01, // small drone
            max_speed: 10.0,
            micro_doppler: MicroDoppler::default(),
            waypoints: VecDeque::new(),
            destroyed: false,
        }
    }

    pub fn add_waypoint(&mut self, wp: Vector3<f64>) {
        self.waypoints.push_back(wp);
    }

    /// A destroyed entity stops flying and falls.
    pub fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.velocity = Vector3::new(0.0, -9.81, 0.0);
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Down on the ground after being destroyed: no longer radar-relevant.
    pub fn is_down(&self) -> bool {
        self.destroyed && self.position.y <= 0.0
    }

    /// Integrate one step of waypoint following.
    pub fn update(&mut self, dt: f64) {
        if self.destroyed {
            self.velocity.y += -9.81 * dt;
            self.position += self.velocity * dt;
            if self.position.y < 0.0 {
                self.position.y = 0.0;
                self.velocity = Vector3::zeros();
            }
            return;
        }

        if let Some(&target) = self.waypoints.front() {
            let dir = target - self.position;
            let dist = dir.norm();
            if dist < 2.0 {
                self.waypoints.pop_front();
            } else {
                self.velocity = dir / dist * self.max_speed;
            }
        }

        self.position += self.velocity * dt;
    }

    /// Instantaneous micro-Doppler contribution to the radial velocity.
    pub fn instant_doppler_mod(&self, time: f64) -> f64 {
        let md = &self.micro_doppler;
        if md.blade_speed_mps <= 0.0 {
            return 0.0;
        }
        let phase = time * md.blade_rate_hz * std::f64::consts::TAU;
        if md.flapping {
            // Biological: large slow modulation
            phase.sin() * 2.0
        } else {
            // Blade flash: radial component of the tip velocity
            phase.sin() * md.blade_speed_mps * 0.15
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waypoint_following_reaches_and_pops() {
        let mut e = SimEntity::new("wp", Vector3::zeros());
        e.max_speed = 10.0;
        e.add_waypoint(Vector3::new(20.0, 0.0, 0.0));

        for _ in 0..30 {
            e.update(0.1);
        }
        // 3 seconds at 10 m/s: arrived and popped the waypoint.
        assert!((e.position.x - 20.0).abs() < 2.5);
    }

    #[test]
    fn destroyed_entity_falls_to_ground() {
        let mut e = SimEntity::new("kill", Vector3::new(0.0, 50.0, 100.0));
        e.destroy();
        for _ in 0..600 {
            e.update(0.016);
        }
        assert!(e.is_down());
        assert_eq!(e.position.y, 0.0);
    }

    #[test]
    fn rotor_doppler_oscillates_flapping_is_bounded() {
        let mut e = SimEntity::new("md", Vector3::zeros());
        e.micro_doppler = MicroDoppler::for_kind(EntityKind::Quadcopter);
        let a = e.instant_doppler_mod(0.001);
        let b = e.instant_doppler_mod(0.003);
        assert_ne!(a, b);

        e.micro_doppler = MicroDoppler::for_kind(EntityKind::Bird);
        for i in 0..100 {
            assert!(e.instant_doppler_mod(i as f64 * 0.01).abs() <= 2.0);
        }
    }
}

//! Command policy: merge operator input with auto-aim into one actuator
//! command per tick.
//!
//! # Rules
//! - **Operator override**: a non-zero pan/tilt received within the last
//!   500 ms wins outright.
//! - **Auto-aim**: otherwise a proportional controller steers toward the
//!   primary track's azimuth/elevation.
//! - **Fire gating**: the trigger is live iff the most recent operator
//!   packet has both the arm flag and the fire flag set, regardless of who
//!   is steering.
//! - `timestamp_ms` on the emitted command never decreases.

use crate::tracking::Track;
use bridge_ipc::layout::ControlCommand;
use bridge_ipc::station::CommandPacket;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Policy tuning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// How long a manual steering input keeps override (ms)
    pub operator_hold_ms: u64,
    /// Proportional gain from angular error to commanded rate
    pub aim_gain: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            operator_hold_ms: 500,
            aim_gain: 0.5,
        }
    }
}

/// Stateful command merger.
pub struct CommandPolicy {
    config: PolicyConfig,
    /// Most recent operator packet, motion or not; gates the trigger.
    latest: CommandPacket,
    /// Held steering input and its expiry.
    held_motion: CommandPacket,
    override_until_ms: u64,
    last_timestamp_ms: u64,
    firing: bool,
}

impl CommandPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            latest: CommandPacket::default(),
            held_motion: CommandPacket::default(),
            override_until_ms: 0,
            last_timestamp_ms: 0,
            firing: false,
        }
    }

    /// Feed a freshly received operator packet.
    pub fn ingest(&mut self, packet: CommandPacket, now_ms: u64) {
        self.latest = packet;
        if packet.has_motion() {
            self.held_motion = packet;
            self.override_until_ms = now_ms.saturating_add(self.config.operator_hold_ms);
        }
    }

    /// Produce this tick's actuator command.
    pub fn decide(&mut self, now_ms: u64, primary: Option<&Track>) -> ControlCommand {
        let (pan, tilt) = if now_ms < self.override_until_ms {
            (self.held_motion.pan_velocity, self.held_motion.tilt_velocity)
        } else if let Some(track) = primary {
            let [x, y, z] = track.position();
            let azimuth = x.atan2(z);
            let elevation = y.atan2((x * x + z * z).sqrt());
            (self.config.aim_gain * azimuth, self.config.aim_gain * elevation)
        } else {
            (0.0, 0.0)
        };

        let fire = self.latest.arm_system && self.latest.fire_trigger;
        if fire && !self.firing {
            warn!("WEAPONS RELEASE AUTHORIZED");
        }
        self.firing = fire;

        // Emitted timestamps never move backwards.
        self.last_timestamp_ms = self.last_timestamp_ms.max(now_ms);

        ControlCommand {
            timestamp_ms: self.last_timestamp_ms,
            pan_velocity: pan,
            tilt_velocity: tilt,
            fire_trigger: fire,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::kalman::{KalmanConfig, KalmanState};

    fn track_at(x: f32, y: f32, z: f32) -> Track {
        let filter = KalmanState::new(x, y, z, 0.0, KalmanConfig::default());
        let mut t = Track::new(1, filter, 0.9);
        t.confirmed = true;
        t
    }

    #[test]
    fn operator_override_wins_over_auto_aim() {
        let mut policy = CommandPolicy::new(PolicyConfig::default());
        // Auto-aim alone would command pan ≈ 0.3 for this geometry.
        let target = track_at(68.4, 0.0, 100.0);
        policy.ingest(
            CommandPacket {
                pan_velocity: -0.1,
                ..Default::default()
            },
            1000,
        );
        let cmd = policy.decide(1100, Some(&target));
        assert_eq!(cmd.pan_velocity, -0.1);
    }

    #[test]
    fn override_expires_after_hold_window() {
        let mut policy = CommandPolicy::new(PolicyConfig::default());
        let target = track_at(0.0, 0.0, 100.0);
        policy.ingest(
            CommandPacket {
                pan_velocity: -0.1,
                ..Default::default()
            },
            1000,
        );
        // 600 ms later the hold has lapsed; target is dead ahead → zero rate.
        let cmd = policy.decide(1600, Some(&target));
        assert_eq!(cmd.pan_velocity, 0.0);
    }

    #[test]
    fn auto_aim_is_proportional_to_azimuth() {
        let mut policy = CommandPolicy::new(PolicyConfig::default());
        // atan2(100, 100) = π/4; gain 0.5 → ~0.3927 rad/s
        let cmd = policy.decide(0, Some(&track_at(100.0, 0.0, 100.0)));
        assert!((cmd.pan_velocity - 0.5 * std::f32::consts::FRAC_PI_4).abs() < 1e-5);
        assert_eq!(cmd.tilt_velocity, 0.0);
    }

    #[test]
    fn no_target_no_override_means_zero_rates() {
        let mut policy = CommandPolicy::new(PolicyConfig::default());
        let cmd = policy.decide(0, None);
        assert_eq!(cmd.pan_velocity, 0.0);
        assert_eq!(cmd.tilt_velocity, 0.0);
        assert!(!cmd.fire_trigger);
    }

    #[test]
    fn fire_requires_arm_and_trigger_in_the_same_packet() {
        let mut policy = CommandPolicy::new(PolicyConfig::default());

        policy.ingest(
            CommandPacket {
                fire_trigger: true,
                ..Default::default()
            },
            0,
        );
        assert!(!policy.decide(10, None).fire_trigger, "trigger without arm");

        policy.ingest(
            CommandPacket {
                arm_system: true,
                ..Default::default()
            },
            20,
        );
        assert!(!policy.decide(30, None).fire_trigger, "arm without trigger");

        policy.ingest(
            CommandPacket {
                arm_system: true,
                fire_trigger: true,
                ..Default::default()
            },
            40,
        );
        assert!(policy.decide(50, None).fire_trigger);

        // Fire state follows the most recent packet.
        policy.ingest(CommandPacket::default(), 60);
        assert!(!policy.decide(70, None).fire_trigger);
    }

    #[test]
    fn fire_gating_is_independent_of_steering_source() {
        let mut policy = CommandPolicy::new(PolicyConfig::default());
        let target = track_at(50.0, 0.0, 100.0);
        policy.ingest(
            CommandPacket {
                arm_system: true,
                fire_trigger: true,
                ..Default::default()
            },
            0,
        );
        // No motion in the packet: auto-aim steers, operator still fires.
        let cmd = policy.decide(10, Some(&target));
        assert!(cmd.fire_trigger);
        assert!(cmd.pan_velocity > 0.0);
    }

    #[test]
    fn timestamps_never_decrease() {
        let mut policy = CommandPolicy::new(PolicyConfig::default());
        let a = policy.decide(100, None);
        let b = policy.decide(90, None); // clock hiccup
        let c = policy.decide(110, None);
        assert_eq!(a.timestamp_ms, 100);
        assert_eq!(b.timestamp_ms, 100);
        assert_eq!(c.timestamp_ms, 110);
    }
}

//! Radar phenomenology: per-entity returns with the radar equation, weather
//! attenuation, measurement noise, multipath ghosts, micro-Doppler
//! sidebands, and background clutter.

use crate::entity::SimEntity;
use crate::weather::WeatherSystem;
use bridge_ipc::layout::SimRadarPoint;
use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Radar channel configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RadarModelConfig {
    /// Maximum instrumented range (m)
    pub max_range: f64,
    /// Range noise σ (m)
    pub sigma_range: f64,
    /// Angle noise σ (rad), applied to azimuth and elevation
    pub sigma_angle: f64,
    /// Radial velocity noise σ (m/s)
    pub sigma_velocity: f64,
    /// Transmit power term of the radar equation (arbitrary units)
    pub tx_power: f64,
    /// Receiver gain folded into the SNR budget (dB)
    pub system_gain_db: f64,
    /// Returns below this SNR are not detected (dB)
    pub detection_floor_db: f64,
    /// Mean clutter returns per scan (Poisson)
    pub clutter_rate: f64,
    /// Emit ground-bounce ghost returns
    pub multipath: bool,
    /// Minimum target altitude for a ghost to form (m)
    pub multipath_min_altitude: f64,
}

impl Default for RadarModelConfig {
    fn default() -> Self {
        Self {
            max_range: 2000.0,
            sigma_range: 0.5,
            sigma_angle: 0.01,
            sigma_velocity: 0.2,
            tx_power: 1000.0,
            system_gain_db: 115.0,
            detection_floor_db: 0.0,
            clutter_rate: 0.5,
            multipath: true,
            multipath_min_altitude: 5.0,
        }
    }
}

/// One return before cartesian conversion.
#[derive(Clone, Copy, Debug)]
pub struct RadarReturn {
    pub range: f64,
    pub azimuth: f64,
    pub elevation: f64,
    /// Radial velocity (m/s, positive = receding)
    pub velocity: f64,
    pub snr_db: f64,
}

/// Scan one entity. Produces the direct return plus optional multipath
/// ghost and micro-Doppler sideband, or nothing when out of range or below
/// the detection floor.
pub fn scan_target(
    rng: &mut ChaCha8Rng,
    sensor_pos: Vector3<f64>,
    entity: &SimEntity,
    config: &RadarModelConfig,
    weather: &WeatherSystem,
    time: f64,
) -> Vec<RadarReturn> {
    let mut returns = Vec::new();

    let to_target = entity.position - sensor_pos;
    let range = to_target.norm();
    if range < 1e-6 || range > config.max_range {
        return returns;
    }

    // Radar equation: received power falls with range⁴, scaled by RCS.
    let r4 = range.powi(4);
    let power = config.tx_power * entity.rcs / (r4 + 1e-6);
    let mut snr_db = 10.0 * power.log10() + config.system_gain_db;

    // Weather: two-way path loss through rain.
    snr_db -= weather.radar_attenuation_db_per_km() * 2.0 * range / 1000.0;

    if snr_db < config.detection_floor_db {
        return returns;
    }

    let los = to_target / range;
    let azimuth = los.x.atan2(los.z);
    let elevation = los.y.asin();

    // Doppler: target velocity projected on the line of sight.
    let radial_velocity = entity.velocity.dot(&los);

    let noise_r = Normal::new(0.0, config.sigma_range).unwrap();
    let noise_a = Normal::new(0.0, config.sigma_angle).unwrap();
    let noise_v = Normal::new(0.0, config.sigma_velocity).unwrap();

    let mut noisy = |range: f64, az: f64, el: f64, vel: f64, snr: f64| RadarReturn {
        range: range + noise_r.sample(rng),
        azimuth: az + noise_a.sample(rng),
        elevation: el + noise_a.sample(rng),
        velocity: vel + noise_v.sample(rng),
        snr_db: snr,
    };

    // Direct return.
    returns.push(noisy(range, azimuth, elevation, radial_velocity, snr_db));

    // Micro-Doppler sideband: blade/wing modulation shows up as a second
    // return offset in velocity, a few dB down.
    let doppler_mod = entity.instant_doppler_mod(time);
    if doppler_mod.abs() > 1e-9 {
        returns.push(noisy(
            range,
            azimuth,
            elevation,
            radial_velocity + doppler_mod,
            snr_db - 8.0,
        ));
    }

    // Multipath: ground bounce arrives on a longer path, mirrored below the
    // horizon and well down in power.
    let sensor_height = sensor_pos.y.max(1.0);
    let target_height = entity.position.y;
    if config.multipath && target_height > config.multipath_min_altitude {
        let bounce_extra = 2.0 * sensor_height * target_height / range;
        let ghost_range = range + bounce_extra;
        let ghost_elevation = -((target_height + 2.0 * sensor_height) / range).asin().abs();
        if ghost_range <= config.max_range && ghost_elevation.is_finite() {
            returns.push(noisy(
                ghost_range,
                azimuth,
                ghost_elevation,
                radial_velocity,
                snr_db - 12.0,
            ));
        }
    }

    returns
}

/// Background clutter: a Poisson-distributed handful of weak, slow returns
/// scattered through the instrumented volume.
pub fn clutter_returns(rng: &mut ChaCha8Rng, config: &RadarModelConfig) -> Vec<RadarReturn> {
    let lambda = config.clutter_rate;
    if lambda <= 0.0 {
        return Vec::new();
    }

    // Knuth inversion, capped for pathological rates.
    let threshold = (-lambda).exp();
    let mut count = 0usize;
    let mut product: f64 = rng.gen();
    while product > threshold && count < 50 {
        product *= rng.gen::<f64>();
        count += 1;
    }

    let noise_v = Normal::new(0.0, config.sigma_velocity * 2.0).unwrap();
    (0..count)
        .map(|_| RadarReturn {
            range: config.max_range * 0.5 * rng.gen::<f64>().sqrt(),
            azimuth: rng.gen_range(-1.0..1.0),
            elevation: rng.gen_range(0.0..0.5),
            velocity: noise_v.sample(rng),
            snr_db: rng.gen_range(2.0..9.0),
        })
        .collect()
}

/// Spherical → sensor-frame cartesian, matching the bridge convention:
/// Z forward, Y up, X right.
pub fn to_cartesian(ret: &RadarReturn) -> SimRadarPoint {
    SimRadarPoint {
        x: (ret.range * ret.azimuth.sin() * ret.elevation.cos()) as f32,
        y: (ret.range * ret.elevation.sin()) as f32,
        z: (ret.range * ret.azimuth.cos() * ret.elevation.cos()) as f32,
        velocity: ret.velocity as f32,
        snr_db: ret.snr_db as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityKind, MicroDoppler};
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn drone_at(z: f64, y: f64) -> SimEntity {
        let mut e = SimEntity::new("t", Vector3::new(0.0, y, z));
        e.velocity = Vector3::new(0.0, 0.0, -12.0);
        e
    }

    #[test]
    fn close_target_is_detected_with_healthy_snr() {
        let mut rng = rng();
        let cfg = RadarModelConfig::default();
        let returns = scan_target(
            &mut rng,
            Vector3::zeros(),
            &drone_at(100.0, 2.0),
            &cfg,
            &WeatherSystem::default(),
            0.0,
        );
        assert!(!returns.is_empty());
        // ~45 dB at 100 m for a 0.01 m² target with the default budget.
        assert!(returns[0].snr_db > 35.0 && returns[0].snr_db < 55.0);
        // Closing target: negative radial velocity, within noise.
        assert!(returns[0].velocity < -10.0);
    }

    #[test]
    fn snr_decreases_with_range() {
        let cfg = RadarModelConfig::default();
        let w = WeatherSystem::default();
        let mut rng1 = rng();
        let near = scan_target(&mut rng1, Vector3::zeros(), &drone_at(100.0, 2.0), &cfg, &w, 0.0);
        let mut rng2 = rng();
        let far = scan_target(&mut rng2, Vector3::zeros(), &drone_at(400.0, 2.0), &cfg, &w, 0.0);
        assert!(near[0].snr_db > far[0].snr_db + 20.0, "range⁴ law");
    }

    #[test]
    fn out_of_range_target_vanishes() {
        let mut rng = rng();
        let cfg = RadarModelConfig::default();
        let returns = scan_target(
            &mut rng,
            Vector3::zeros(),
            &drone_at(3000.0, 2.0),
            &cfg,
            &WeatherSystem::default(),
            0.0,
        );
        assert!(returns.is_empty());
    }

    #[test]
    fn rain_attenuates_the_return() {
        let cfg = RadarModelConfig::default();
        let mut storm = WeatherSystem::default();
        storm.set_condition(50.0, 0.5, 10.0);

        let mut rng1 = rng();
        let clear = scan_target(
            &mut rng1,
            Vector3::zeros(),
            &drone_at(500.0, 2.0),
            &cfg,
            &WeatherSystem::default(),
            0.0,
        );
        let mut rng2 = rng();
        let wet = scan_target(&mut rng2, Vector3::zeros(), &drone_at(500.0, 2.0), &cfg, &storm, 0.0);
        assert!(clear[0].snr_db > wet[0].snr_db);
    }

    #[test]
    fn rotorcraft_emits_a_sideband() {
        let mut rng = rng();
        let cfg = RadarModelConfig::default();
        let mut e = drone_at(150.0, 2.0);
        e.micro_doppler = MicroDoppler::for_kind(EntityKind::Quadcopter);
        // Pick a phase where the modulation is non-zero.
        let returns = scan_target(
            &mut rng,
            Vector3::zeros(),
            &e,
            &cfg,
            &WeatherSystem::default(),
            0.00123,
        );
        assert!(returns.len() >= 2, "direct + sideband expected");
        assert!(returns[1].snr_db < returns[0].snr_db);
    }

    #[test]
    fn high_target_spawns_multipath_ghost() {
        let mut rng = rng();
        let cfg = RadarModelConfig::default();
        let returns = scan_target(
            &mut rng,
            Vector3::new(0.0, 10.0, 0.0),
            &drone_at(300.0, 40.0),
            &cfg,
            &WeatherSystem::default(),
            0.0,
        );
        // Direct + ghost; the ghost is longer-range, below the horizon, and
        // weaker.
        let ghost = returns
            .iter()
            .find(|r| r.elevation < 0.0)
            .expect("ghost return expected");
        assert!(ghost.range > returns[0].range);
        assert!(ghost.snr_db < returns[0].snr_db);
    }

    #[test]
    fn clutter_count_follows_the_rate() {
        let mut rng = rng();
        let mut cfg = RadarModelConfig::default();
        cfg.clutter_rate = 5.0;
        let total: usize = (0..200)
            .map(|_| clutter_returns(&mut rng, &cfg).len())
            .sum();
        let mean = total as f64 / 200.0;
        assert!((mean - 5.0).abs() < 1.0, "poisson mean ≈ rate, got {mean}");
    }

    #[test]
    fn cartesian_conversion_matches_convention() {
        let ret = RadarReturn {
            range: 100.0,
            azimuth: 0.0,
            elevation: 0.0,
            velocity: -5.0,
            snr_db: 30.0,
        };
        let p = to_cartesian(&ret);
        assert!((p.z - 100.0).abs() < 1e-4);
        assert!(p.x.abs() < 1e-4 && p.y.abs() < 1e-4);
    }
}

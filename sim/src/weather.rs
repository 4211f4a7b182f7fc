//! Weather state and its effect on the radar channel.

use serde::{Deserialize, Serialize};

/// Current environmental conditions.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct WeatherState {
    /// Rain rate (mm/hr). 0 = clear, 10 = heavy, 50 = monsoon.
    pub rain_intensity: f64,
    /// Fog density in [0,1] (visibility reduction)
    pub fog_density: f64,
    /// Mean wind speed (m/s)
    pub wind_speed: f64,
}

/// Owns the weather state over a run.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeatherSystem {
    state: WeatherState,
}

impl WeatherSystem {
    pub fn set_condition(&mut self, rain: f64, fog: f64, wind: f64) {
        self.state.rain_intensity = rain;
        self.state.fog_density = fog;
        self.state.wind_speed = wind;
    }

    pub fn state(&self) -> &WeatherState {
        &self.state
    }

    /// Radar attenuation from rain (dB per km, one way).
    /// ITU-R P.838 X-band approximation: ~0.02 dB/km per mm/hr.
    pub fn radar_attenuation_db_per_km(&self) -> f64 {
        if self.state.rain_intensity <= 0.0 {
            return 0.0;
        }
        0.02 * self.state.rain_intensity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_sky_does_not_attenuate() {
        let w = WeatherSystem::default();
        assert_eq!(w.radar_attenuation_db_per_km(), 0.0);
    }

    #[test]
    fn rain_attenuation_scales_with_intensity() {
        let mut w = WeatherSystem::default();
        w.set_condition(20.0, 0.2, 5.0);
        assert!((w.radar_attenuation_db_per_km() - 0.4).abs() < 1e-9);
    }
}

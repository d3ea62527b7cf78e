//! Outdoor weather simulator for local development.
//!
//! Each field follows an independent uniform random walk. Wind speed and
//! solar radiation are floored at zero; the wind direction is held.

use serde::Serialize;

/// Peak-to-peak width of one temperature step (°C).
const TEMP_STEP: f64 = 0.1;
/// Peak-to-peak width of one wind speed step (m/s).
const WIND_STEP: f64 = 0.5;
/// Peak-to-peak width of one solar radiation step (W/m²).
const RADIATION_STEP: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weather {
    pub temperature: f64,
    pub wind_speed: f64,
    pub wind_direction: String,
    pub solar_radiation: f64,
}

impl Default for Weather {
    fn default() -> Self {
        Self {
            temperature: 15.0,
            wind_speed: 3.5,
            wind_direction: "NE".into(),
            solar_radiation: 450.0,
        }
    }
}

pub struct WeatherSim {
    rng: fastrand::Rng,
    current: Weather,
}

impl WeatherSim {
    pub fn new(rng: fastrand::Rng) -> Self {
        Self {
            rng,
            current: Weather::default(),
        }
    }

    /// Uniform sample in `[-width/2, width/2)`.
    fn step_of(&mut self, width: f64) -> f64 {
        (self.rng.f64() - 0.5) * width
    }

    /// Advance one sample and return the new reading.
    pub fn sample(&mut self) -> &Weather {
        let dt = self.step_of(TEMP_STEP);
        let dw = self.step_of(WIND_STEP);
        let dr = self.step_of(RADIATION_STEP);
        let w = &mut self.current;
        w.temperature += dt;
        w.wind_speed = (w.wind_speed + dw).max(0.0);
        w.solar_radiation = (w.solar_radiation + dr).max(0.0);
        &self.current
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! Per-block climate drift and heater/vent hysteresis.
//!
//! Temperature and humidity follow a bounded random walk; devices that were
//! on during the previous tick push them in a fixed direction. With
//! `auto_mode` the heater and vents are then re-commanded with a deadband so
//! they do not chatter around their thresholds.

use crate::block::{ClimateConfig, Devices, Sensors};
use crate::config::SimulationConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateOutcome {
    pub temperature: f64,
    pub humidity: f64,
    pub heater: bool,
    pub vents: bool,
}

/// Uniform sample in `[-width/2, width/2)`.
fn jitter(rng: &mut fastrand::Rng, width: f64) -> f64 {
    (rng.f64() - 0.5) * width
}

/// Switch on below `on_below`, off above `off_above`, otherwise hold.
fn hysteresis_low(value: f64, on_below: f64, off_above: f64, current: bool) -> bool {
    if value < on_below {
        true
    } else if value > off_above {
        false
    } else {
        current
    }
}

/// Switch on above `on_above`, off below `off_below`, otherwise hold.
fn hysteresis_high(value: f64, on_above: f64, off_below: f64, current: bool) -> bool {
    if value > on_above {
        true
    } else if value < off_below {
        false
    } else {
        current
    }
}

/// Advance one block's climate by a tick. `devices` is the previous tick's
/// committed actuator state.
pub fn step(
    sensors: &Sensors,
    devices: &Devices,
    cfg: &ClimateConfig,
    sim: &SimulationConfig,
    rng: &mut fastrand::Rng,
) -> ClimateOutcome {
    let mut temperature = sensors.temperature + jitter(rng, sim.temp_jitter);
    let mut humidity = sensors.humidity + jitter(rng, sim.humidity_jitter);

    if devices.heater {
        temperature += sim.heater_delta;
    }
    if devices.vents {
        temperature -= sim.vent_delta;
    }
    if devices.any_valve_open() {
        humidity += sim.valve_humidity_delta;
    }

    let (heater, vents) = if cfg.auto_mode {
        (
            hysteresis_low(
                temperature,
                cfg.heater_start_threshold,
                cfg.heater_start_threshold + sim.heater_deadband,
                devices.heater,
            ),
            hysteresis_high(
                temperature,
                cfg.vent_open_threshold,
                cfg.vent_open_threshold - sim.vent_deadband,
                devices.vents,
            ),
        )
    } else {
        (devices.heater, devices.vents)
    };

    ClimateOutcome {
        temperature,
        humidity: humidity.clamp(0.0, 100.0),
        heater,
        vents,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sensors(temperature: f64, humidity: f64) -> Sensors {
        Sensors {
            temperature,
            humidity,
            soil_moisture: 50.0,
            co2_level: 400.0,
            light_level: 500.0,
            current_ec: 2.0,
            current_ph: 6.0,
            timestamp: datetime!(2026-05-01 12:00 UTC),
        }
    }

    fn cfg(auto_mode: bool) -> ClimateConfig {
        ClimateConfig {
            target_temp_day: 24.0,
            target_temp_night: 18.0,
            vent_open_threshold: 26.0,
            heater_start_threshold: 20.0,
            curtain_close_light_level: 10000.0,
            auto_mode,
        }
    }

    /// No random drift, so device coupling and hysteresis are exact.
    fn calm() -> SimulationConfig {
        SimulationConfig {
            temp_jitter: 0.0,
            humidity_jitter: 0.0,
            ..SimulationConfig::default()
        }
    }

    fn rng() -> fastrand::Rng {
        fastrand::Rng::with_seed(1)
    }

    #[test]
    fn drift_stays_within_bounds() {
        let sim = SimulationConfig::default();
        let mut r = rng();
        let s = sensors(22.0, 60.0);
        for _ in 0..1000 {
            let out = step(&s, &Devices::default(), &cfg(false), &sim, &mut r);
            assert!((out.temperature - 22.0).abs() <= sim.temp_jitter / 2.0 + 1e-9);
            assert!((out.humidity - 60.0).abs() <= sim.humidity_jitter / 2.0 + 1e-9);
        }
    }

    #[test]
    fn same_seed_reproduces_walk() {
        let sim = SimulationConfig::default();
        let walk = |seed| {
            let mut r = fastrand::Rng::with_seed(seed);
            let mut s = sensors(22.0, 60.0);
            for _ in 0..50 {
                let out = step(&s, &Devices::default(), &cfg(true), &sim, &mut r);
                s.temperature = out.temperature;
                s.humidity = out.humidity;
            }
            (s.temperature, s.humidity)
        };
        assert_eq!(walk(99), walk(99));
        assert_ne!(walk(99), walk(100));
    }

    #[test]
    fn heater_and_vents_couple_into_temperature() {
        let sim = calm();
        let heating = Devices {
            heater: true,
            ..Devices::default()
        };
        let out = step(&sensors(22.0, 60.0), &heating, &cfg(false), &sim, &mut rng());
        assert!((out.temperature - 22.15).abs() < 1e-9);

        let venting = Devices {
            vents: true,
            ..Devices::default()
        };
        let out = step(&sensors(22.0, 60.0), &venting, &cfg(false), &sim, &mut rng());
        assert!((out.temperature - 21.8).abs() < 1e-9);
    }

    #[test]
    fn open_valve_raises_humidity() {
        let sim = calm();
        let watering = Devices {
            pump: true,
            valve_b: true,
            ..Devices::default()
        };
        let out = step(&sensors(22.0, 60.0), &watering, &cfg(false), &sim, &mut rng());
        assert!((out.humidity - 60.3).abs() < 1e-9);
    }

    #[test]
    fn humidity_is_clamped() {
        let sim = calm();
        let watering = Devices {
            valve_a: true,
            ..Devices::default()
        };
        let out = step(&sensors(22.0, 99.9), &watering, &cfg(false), &sim, &mut rng());
        assert_eq!(out.humidity, 100.0);
    }

    #[test]
    fn heater_turns_on_below_threshold_and_holds_in_deadband() {
        let sim = calm();
        let out = step(&sensors(19.9, 60.0), &Devices::default(), &cfg(true), &sim, &mut rng());
        assert!(out.heater);

        // Inside [20.0, 21.5] the heater keeps its last commanded state.
        let on = Devices {
            heater: true,
            ..Devices::default()
        };
        let mut s = sensors(20.85, 60.0);
        let out = step(&s, &on, &cfg(true), &sim, &mut rng());
        assert!(out.heater, "holds on inside deadband");

        let out = step(&s, &Devices::default(), &cfg(true), &sim, &mut rng());
        assert!(!out.heater, "holds off inside deadband");

        // Heating pushes past 21.5: switches off.
        s.temperature = 21.4;
        let out = step(&s, &on, &cfg(true), &sim, &mut rng());
        assert!(!out.heater);
    }

    #[test]
    fn vents_open_above_threshold_and_close_below_deadband() {
        let sim = calm();
        let out = step(&sensors(26.5, 60.0), &Devices::default(), &cfg(true), &sim, &mut rng());
        assert!(out.vents);

        let open = Devices {
            vents: true,
            ..Devices::default()
        };
        // 25.7 - 0.2 = 25.5: inside [25.0, 26.0].
        let out = step(&sensors(25.7, 60.0), &open, &cfg(true), &sim, &mut rng());
        assert!(out.vents);

        // 25.1 - 0.2 = 24.9: below 25.0.
        let out = step(&sensors(25.1, 60.0), &open, &cfg(true), &sim, &mut rng());
        assert!(!out.vents);
    }

    #[test]
    fn manual_mode_keeps_last_commanded_state() {
        let sim = calm();
        let out = step(&sensors(10.0, 60.0), &Devices::default(), &cfg(false), &sim, &mut rng());
        assert!(!out.heater);

        let venting = Devices {
            vents: true,
            ..Devices::default()
        };
        let out = step(&sensors(10.0, 60.0), &venting, &cfg(false), &sim, &mut rng());
        assert!(out.vents);
    }
}

//! Bang-bang EC and pH dosing while the pump is running.

use crate::block::IrrigationConfig;
use crate::config::SimulationConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DosingOutcome {
    pub ec: f64,
    pub ph: f64,
    pub nutrient_a: bool,
    pub nutrient_b: bool,
    pub acid: bool,
    pub base: bool,
}

/// One control step. With the pump off nothing is injected and the readings
/// are carried through unchanged.
pub fn step(
    ec: f64,
    ph: f64,
    pump_on: bool,
    cfg: &IrrigationConfig,
    sim: &SimulationConfig,
) -> DosingOutcome {
    if !pump_on {
        return DosingOutcome {
            ec,
            ph,
            ..DosingOutcome::default()
        };
    }

    let band = sim.dosing_deadband;
    let mut out = DosingOutcome {
        ec,
        ph,
        ..DosingOutcome::default()
    };

    // EC: dosing up is active, drifting down is passive and slower.
    if ec < cfg.target_ec - band {
        out.nutrient_a = true;
        out.nutrient_b = true;
        out.ec += sim.ec_dose_step;
    } else if ec > cfg.target_ec + band {
        out.ec -= sim.ec_drift_step;
    }

    if ph > cfg.target_ph + band {
        out.acid = true;
        out.ph -= sim.ph_step;
    } else if ph < cfg.target_ph - band {
        out.base = true;
        out.ph += sim.ph_step;
    }

    out.ec = out.ec.max(0.0);
    out.ph = out.ph.clamp(0.0, 14.0);
    out
}

//! Per-valve water volume from irrigation geometry. Shared by the dispatcher
//! at promotion time and by the irrigation view so both agree.

use crate::block::IrrigationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Valve {
    A,
    B,
}

/// Drippers served by `valve`, proportional to its share of the total area.
pub fn drippers_for_valve(cfg: &IrrigationConfig, valve: Valve) -> f64 {
    let total_area = cfg.valve_a_area + cfg.valve_b_area;
    if total_area == 0.0 {
        return 0.0;
    }
    let area = match valve {
        Valve::A => cfg.valve_a_area,
        Valve::B => cfg.valve_b_area,
    };
    f64::from(cfg.total_drippers) * (area / total_area)
}

/// Litres to deliver through `valve` for one full fertigation run.
pub fn volume_for_valve(cfg: &IrrigationConfig, valve: Valve) -> f64 {
    drippers_for_valve(cfg, valve) * cfg.target_volume_per_dripper / 1000.0
}

//! Read-only irrigation summary for a single block, as shown on the
//! irrigation panel.

use serde::Serialize;

use crate::block::{Block, BlockId, IrrigationMode, Status};
use crate::volume::{drippers_for_valve, volume_for_valve, Valve};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValvePlan {
    pub drippers: f64,
    /// Litres per run at the current configuration.
    pub planned_l: f64,
    pub remaining_l: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrrigationView {
    pub block: BlockId,
    pub name: String,
    pub mode: IrrigationMode,
    pub status: Status,
    pub active_valve: Option<&'static str>,
    pub valve_a: ValvePlan,
    pub valve_b: ValvePlan,
    /// Remaining litres of the active phase.
    pub remaining_l: f64,
    /// Completion of the active phase.
    pub progress_pct: f64,
    pub flow_rate: f64,
    /// 1-based place in the dispatch queue.
    pub queue_position: Option<usize>,
}

impl IrrigationView {
    /// `queue_index` is the block's 0-based queue index, if waiting.
    pub fn for_block(block: &Block, queue_index: Option<usize>) -> Self {
        let cfg = &block.config.irrigation;
        let f = &block.fertigation;
        let valve_a = ValvePlan {
            drippers: drippers_for_valve(cfg, Valve::A),
            planned_l: volume_for_valve(cfg, Valve::A),
            remaining_l: f.remaining_volume_a,
        };
        let valve_b = ValvePlan {
            drippers: drippers_for_valve(cfg, Valve::B),
            planned_l: volume_for_valve(cfg, Valve::B),
            remaining_l: f.remaining_volume_b,
        };

        let (active_valve, phase) = match f.status {
            Status::Idle => (None, None),
            Status::WateringA => (Some("A"), Some(&valve_a)),
            Status::WateringB => (Some("B"), Some(&valve_b)),
        };
        let remaining_l = phase.map_or(0.0, |p| p.remaining_l);
        // Config may change mid-run, so clamp rather than trust the ratio.
        let progress_pct = match phase {
            Some(p) if p.planned_l > 0.0 => {
                ((p.planned_l - p.remaining_l) / p.planned_l * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        };

        Self {
            block: block.id.clone(),
            name: block.name.clone(),
            mode: cfg.mode,
            status: f.status,
            active_valve,
            valve_a,
            valve_b,
            remaining_l,
            progress_pct,
            flow_rate: f.current_flow_rate,
            queue_position: queue_index.map(|i| i + 1),
        }
    }
}

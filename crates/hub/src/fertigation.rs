//! Per-block two-phase fertigation state machine.
//!
//! ```text
//! Idle ──[promoted by dispatcher]──▶ WateringA ──[volume A spent]──▶ WateringB
//!  ▲                                                                     │
//!  └──────────────────────────[volume B spent]───────────────────────────┘
//!  ▲
//!  └──[operator stop, from any state]
//! ```
//!
//! Everything here is a pure function of the previous committed state. The
//! dispatcher owns the queue and is the only caller of [`promote`].

use time::Time;

use crate::block::{BlockId, Devices, FertigationState, IrrigationConfig, IrrigationMode, Status};
use crate::error::TickError;

/// What happened to the process during one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// Valve A finished and valve B took over.
    SwitchedToB,
    /// Valve B finished; the main line is free again.
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub state: FertigationState,
    pub transition: Transition,
}

/// Advance one block's process by a tick, draining `decrement` litres from
/// the active valve.
pub fn step(
    id: &BlockId,
    state: &FertigationState,
    decrement: f64,
) -> Result<StepOutcome, TickError> {
    let mut next = state.clone();
    let transition = match state.status {
        Status::Idle => {
            next.current_flow_rate = 0.0;
            Transition::None
        }
        Status::WateringA => {
            check_finite(id, state.status, state.remaining_volume_a)?;
            next.remaining_volume_a -= decrement;
            if next.remaining_volume_a <= 0.0 && next.remaining_volume_b <= 0.0 {
                next = FertigationState::default();
                Transition::Finished
            } else if next.remaining_volume_a <= 0.0 {
                next.remaining_volume_a = 0.0;
                next.status = Status::WateringB;
                Transition::SwitchedToB
            } else {
                Transition::None
            }
        }
        Status::WateringB => {
            check_finite(id, state.status, state.remaining_volume_b)?;
            next.remaining_volume_b -= decrement;
            if next.remaining_volume_b <= 0.0 {
                next.remaining_volume_b = 0.0;
                next.status = Status::Idle;
                next.current_flow_rate = 0.0;
                Transition::Finished
            } else {
                Transition::None
            }
        }
    };
    Ok(StepOutcome {
        state: next,
        transition,
    })
}

fn check_finite(id: &BlockId, status: Status, volume: f64) -> Result<(), TickError> {
    if volume.is_finite() {
        Ok(())
    } else {
        Err(TickError::NonFiniteVolume {
            block: id.clone(),
            status,
        })
    }
}

/// Start a run: valve A first, both volumes loaded. An empty valve A
/// starts straight on valve B.
pub fn promote(volume_a: f64, volume_b: f64, flow_rate: f64) -> FertigationState {
    FertigationState {
        status: if volume_a <= 0.0 {
            Status::WateringB
        } else {
            Status::WateringA
        },
        remaining_volume_a: volume_a,
        remaining_volume_b: volume_b,
        current_flow_rate: flow_rate,
    }
}

/// Operator stop: straight to idle, nothing left to deliver.
pub fn cancelled() -> FertigationState {
    FertigationState::default()
}

/// Set pump and valves for `status`. Injectors are left to the dosing
/// controller, except that they are forced off whenever the pump is.
pub fn apply_devices(status: Status, devices: &mut Devices) {
    match status {
        Status::Idle => devices.irrigation_off(),
        Status::WateringA => {
            devices.pump = true;
            devices.valve_a = true;
            devices.valve_b = false;
        }
        Status::WateringB => {
            devices.pump = true;
            devices.valve_a = false;
            devices.valve_b = true;
        }
    }
}

/// Ids of schedule entries due at `now` for a block that could start.
/// Repeated ticks within the same minute keep reporting the same entries;
/// the dispatcher decides what has already fired.
pub fn due_schedule_entries<'a>(
    cfg: &'a IrrigationConfig,
    status: Status,
    now: Time,
) -> impl Iterator<Item = &'a str> + 'a {
    let eligible = cfg.mode == IrrigationMode::Auto && status == Status::Idle;
    cfg.schedule
        .iter()
        .filter(move |s| eligible && s.matches(now))
        .map(|s| s.id.as_str())
}

// ===========================================================================
// Tests
// ===========================================================================

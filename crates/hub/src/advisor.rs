//! Advisory text for a block, behind a trait so a remote service can be
//! plugged in. Whatever the advisor does, it only ever sees a copy of the
//! block's data and never touches simulation state.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::warn;

use crate::block::{Block, ClimateConfig, IrrigationConfig, Sensors};

pub const FALLBACK: &str = "advisory service unavailable";

#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryRequest {
    pub name: String,
    pub sensors: Sensors,
    pub climate: ClimateConfig,
    pub irrigation: IrrigationConfig,
}

impl AdvisoryRequest {
    pub fn for_block(block: &Block) -> Self {
        Self {
            name: block.name.clone(),
            sensors: block.sensors.clone(),
            climate: block.config.climate.clone(),
            irrigation: block.config.irrigation.clone(),
        }
    }
}

pub trait Advisor: Send + Sync {
    fn advise(&self, req: &AdvisoryRequest) -> Result<String>;
}

/// Advice with failures folded into the fallback text.
pub fn advise_or_fallback(advisor: &dyn Advisor, req: &AdvisoryRequest) -> String {
    match advisor.advise(req) {
        Ok(text) => text,
        Err(e) => {
            warn!(block = %req.name, "advisor failed: {e:#}");
            FALLBACK.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// No advisory backend configured.
pub struct Unconfigured;

impl Advisor for Unconfigured {
    fn advise(&self, _req: &AdvisoryRequest) -> Result<String> {
        bail!("no advisory service configured")
    }
}

/// Pick the advisor named by `ADVISOR`: `off` disables advice, anything
/// else (or unset) uses the offline thresholds.
pub fn select(name: Option<&str>, dosing_deadband: f64) -> Arc<dyn Advisor> {
    match name {
        Some(n) if n.eq_ignore_ascii_case("off") => Arc::new(Unconfigured),
        _ => Arc::new(ThresholdAdvisor { dosing_deadband }),
    }
}

/// Offline rule-based advice from thresholds and dosing targets.
pub struct ThresholdAdvisor {
    pub dosing_deadband: f64,
}

impl Advisor for ThresholdAdvisor {
    fn advise(&self, req: &AdvisoryRequest) -> Result<String> {
        let s = &req.sensors;
        let c = &req.climate;
        let i = &req.irrigation;
        let band = self.dosing_deadband;
        let mut notes = Vec::new();

        if s.temperature < c.heater_start_threshold {
            notes.push(format!(
                "temperature {:.1} °C is below the heater threshold of {:.1} °C",
                s.temperature, c.heater_start_threshold
            ));
        } else if s.temperature > c.vent_open_threshold {
            notes.push(format!(
                "temperature {:.1} °C is above the vent threshold of {:.1} °C",
                s.temperature, c.vent_open_threshold
            ));
        }

        if s.humidity > 85.0 {
            notes.push(format!("humidity {:.0}% is high, risk of fungal disease", s.humidity));
        } else if s.humidity < 40.0 {
            notes.push(format!("humidity {:.0}% is low, plants may stress", s.humidity));
        }

        if (s.current_ec - i.target_ec).abs() > band {
            notes.push(format!(
                "EC {:.2} is off target {:.2}",
                s.current_ec, i.target_ec
            ));
        }
        if (s.current_ph - i.target_ph).abs() > band {
            notes.push(format!(
                "pH {:.2} is off target {:.2}",
                s.current_ph, i.target_ph
            ));
        }

        if notes.is_empty() {
            Ok(format!("climate in {} is optimal", req.name))
        } else {
            Ok(format!("{}: {}", req.name, notes.join("; ")))
        }
    }
}

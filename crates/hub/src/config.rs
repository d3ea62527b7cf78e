//! TOML config file loading and validation, plus the raw entry shapes that
//! every configuration update (file or HTTP) must pass through before it can
//! reach a block.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use time::macros::format_description;
use time::{Time, UtcOffset};

use crate::block::{ClimateConfig, IrrigationConfig, IrrigationMode, ScheduleEntry};
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub blocks: Vec<BlockEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockEntry {
    pub id: String,
    pub name: String,
    pub climate: ClimateConfigEntry,
    pub irrigation: IrrigationConfigEntry,
    #[serde(default)]
    pub sensors: SensorsEntry,
}

/// Simulation constants shared by every block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_ms: u64,
    pub history_every_ms: u64,
    pub history_capacity: usize,
    /// Seeds the climate random walk; unseeded when absent.
    pub seed: Option<u64>,
    /// Offset applied to UTC before schedule matching.
    pub utc_offset_minutes: i32,
    /// Litres drained from the active valve per tick.
    pub flow_decrement_l: f64,
    pub display_flow_rate: f64,
    pub heater_deadband: f64,
    pub vent_deadband: f64,
    pub dosing_deadband: f64,
    pub ec_dose_step: f64,
    pub ec_drift_step: f64,
    pub ph_step: f64,
    /// Peak-to-peak width of the per-tick temperature perturbation.
    pub temp_jitter: f64,
    pub humidity_jitter: f64,
    pub heater_delta: f64,
    pub vent_delta: f64,
    pub valve_humidity_delta: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            history_every_ms: 3000,
            history_capacity: 20,
            seed: None,
            utc_offset_minutes: 0,
            flow_decrement_l: 2.0,
            display_flow_rate: 50.0,
            heater_deadband: 1.5,
            vent_deadband: 1.0,
            dosing_deadband: 0.1,
            ec_dose_step: 0.05,
            ec_drift_step: 0.01,
            ph_step: 0.05,
            temp_jitter: 0.3,
            humidity_jitter: 0.6,
            heater_delta: 0.15,
            vent_delta: 0.2,
            valve_humidity_delta: 0.3,
        }
    }
}

impl SimulationConfig {
    pub fn utc_offset(&self) -> Result<UtcOffset> {
        UtcOffset::from_whole_seconds(self.utc_offset_minutes.saturating_mul(60))
            .with_context(|| format!("utc_offset_minutes {} out of range", self.utc_offset_minutes))
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if self.tick_ms == 0 {
            errors.push("simulation: tick_ms must be positive".into());
        }
        if self.history_every_ms == 0 {
            errors.push("simulation: history_every_ms must be positive".into());
        }
        if self.history_capacity == 0 {
            errors.push("simulation: history_capacity must be positive".into());
        }
        if self.utc_offset().is_err() {
            errors.push(format!(
                "simulation: utc_offset_minutes {} out of range",
                self.utc_offset_minutes
            ));
        }

        let strictly_positive = [
            ("flow_decrement_l", self.flow_decrement_l),
            ("ec_dose_step", self.ec_dose_step),
            ("ec_drift_step", self.ec_drift_step),
            ("ph_step", self.ph_step),
        ];
        for (name, v) in strictly_positive {
            if !(v.is_finite() && v > 0.0) {
                errors.push(format!("simulation: {name} must be positive, got {v}"));
            }
        }

        let non_negative = [
            ("display_flow_rate", self.display_flow_rate),
            ("heater_deadband", self.heater_deadband),
            ("vent_deadband", self.vent_deadband),
            ("dosing_deadband", self.dosing_deadband),
            ("temp_jitter", self.temp_jitter),
            ("humidity_jitter", self.humidity_jitter),
            ("heater_delta", self.heater_delta),
            ("vent_delta", self.vent_delta),
            ("valve_humidity_delta", self.valve_humidity_delta),
        ];
        for (name, v) in non_negative {
            if !(v.is_finite() && v >= 0.0) {
                errors.push(format!("simulation: {name} must be >= 0, got {v}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entries (raw shapes from TOML and HTTP)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClimateConfigEntry {
    pub target_temp_day: f64,
    pub target_temp_night: f64,
    pub vent_open_threshold: f64,
    pub heater_start_threshold: f64,
    pub curtain_close_light_level: f64,
    pub auto_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IrrigationConfigEntry {
    pub mode: IrrigationMode,
    pub total_drippers: i64,
    pub valve_a_area: f64,
    pub valve_b_area: f64,
    pub target_volume_per_dripper: f64,
    pub target_ec: f64,
    pub target_ph: f64,
    #[serde(default)]
    pub schedule: Vec<ScheduleItemEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduleItemEntry {
    pub id: String,
    /// "HH:MM", 24h.
    pub start_time: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Initial readings for a block; anything omitted takes the stock value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorsEntry {
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    pub co2_level: f64,
    pub light_level: f64,
    pub current_ec: f64,
    pub current_ph: f64,
    pub curtains: bool,
}

impl Default for SensorsEntry {
    fn default() -> Self {
        Self {
            temperature: 22.0,
            humidity: 60.0,
            soil_moisture: 50.0,
            co2_level: 400.0,
            light_level: 500.0,
            current_ec: 2.0,
            current_ph: 6.0,
            curtains: false,
        }
    }
}

/// Parse a strict 24h "HH:MM" start time.
pub fn parse_start_time(s: &str) -> Option<Time> {
    Time::parse(s, format_description!("[hour]:[minute]")).ok()
}

// ---------------------------------------------------------------------------
// Entry validation
// ---------------------------------------------------------------------------

impl ClimateConfigEntry {
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let temps = [
            ("target_temp_day", self.target_temp_day),
            ("target_temp_night", self.target_temp_night),
            ("vent_open_threshold", self.vent_open_threshold),
            ("heater_start_threshold", self.heater_start_threshold),
        ];
        for (name, v) in temps {
            if !v.is_finite() {
                errors.push(format!("{name} must be a finite number, got {v}"));
            }
        }
        if self.heater_start_threshold.is_finite()
            && self.vent_open_threshold.is_finite()
            && self.heater_start_threshold >= self.vent_open_threshold
        {
            errors.push(format!(
                "heater_start_threshold ({}) must be below vent_open_threshold ({})",
                self.heater_start_threshold, self.vent_open_threshold
            ));
        }
        if !(self.curtain_close_light_level.is_finite() && self.curtain_close_light_level >= 0.0) {
            errors.push(format!(
                "curtain_close_light_level must be >= 0, got {}",
                self.curtain_close_light_level
            ));
        }
        errors
    }
}

impl TryFrom<ClimateConfigEntry> for ClimateConfig {
    type Error = ConfigError;

    fn try_from(e: ClimateConfigEntry) -> Result<Self, Self::Error> {
        let violations = e.violations();
        if !violations.is_empty() {
            return Err(ConfigError::Invalid {
                what: "climate config",
                violations,
            });
        }
        Ok(Self {
            target_temp_day: e.target_temp_day,
            target_temp_night: e.target_temp_night,
            vent_open_threshold: e.vent_open_threshold,
            heater_start_threshold: e.heater_start_threshold,
            curtain_close_light_level: e.curtain_close_light_level,
            auto_mode: e.auto_mode,
        })
    }
}

impl IrrigationConfigEntry {
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // ── Geometry ────────────────────────────────────────────
        if !(0..=i64::from(u32::MAX)).contains(&self.total_drippers) {
            errors.push(format!(
                "total_drippers must be >= 0, got {}",
                self.total_drippers
            ));
        }
        let non_negative = [
            ("valve_a_area", self.valve_a_area),
            ("valve_b_area", self.valve_b_area),
            ("target_volume_per_dripper", self.target_volume_per_dripper),
            ("target_ec", self.target_ec),
        ];
        for (name, v) in non_negative {
            if !(v.is_finite() && v >= 0.0) {
                errors.push(format!("{name} must be >= 0, got {v}"));
            }
        }

        // ── Chemistry ───────────────────────────────────────────
        if !(0.0..=14.0).contains(&self.target_ph) {
            errors.push(format!(
                "target_ph {} out of range [0, 14]",
                self.target_ph
            ));
        }

        // ── Schedule ────────────────────────────────────────────
        let mut seen: HashSet<&str> = HashSet::new();
        for (i, s) in self.schedule.iter().enumerate() {
            if s.id.trim().is_empty() {
                errors.push(format!("schedule[{i}]: id is empty"));
            } else if !seen.insert(&s.id) {
                errors.push(format!("schedule[{i}]: duplicate id '{}'", s.id));
            }
            if parse_start_time(&s.start_time).is_none() {
                errors.push(format!(
                    "schedule[{i}]: start_time '{}' is not a valid HH:MM time",
                    s.start_time
                ));
            }
        }
        errors
    }
}

impl TryFrom<IrrigationConfigEntry> for IrrigationConfig {
    type Error = ConfigError;

    fn try_from(e: IrrigationConfigEntry) -> Result<Self, Self::Error> {
        let violations = e.violations();
        let total_drippers = u32::try_from(e.total_drippers).ok();
        let schedule: Option<Vec<ScheduleEntry>> = e
            .schedule
            .iter()
            .map(|s| {
                parse_start_time(&s.start_time).map(|start_time| ScheduleEntry {
                    id: s.id.clone(),
                    start_time,
                    enabled: s.enabled,
                })
            })
            .collect();

        match (violations.is_empty(), total_drippers, schedule) {
            (true, Some(total_drippers), Some(schedule)) => Ok(Self {
                mode: e.mode,
                total_drippers,
                valve_a_area: e.valve_a_area,
                valve_b_area: e.valve_b_area,
                target_volume_per_dripper: e.target_volume_per_dripper,
                target_ec: e.target_ec,
                target_ph: e.target_ph,
                schedule,
            }),
            _ => Err(ConfigError::Invalid {
                what: "irrigation config",
                violations,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// File validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.simulation.validate(&mut errors);
        self.validate_blocks(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_blocks(&self, errors: &mut Vec<String>) {
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for (i, b) in self.blocks.iter().enumerate() {
            let ctx = || {
                if b.id.is_empty() {
                    format!("blocks[{i}]")
                } else {
                    format!("block '{}'", b.id)
                }
            };

            // ── Identity ────────────────────────────────────────
            if b.id.trim().is_empty() {
                errors.push(format!("{}: id is empty", ctx()));
            } else if !seen_ids.insert(&b.id) {
                errors.push(format!("{}: duplicate id", ctx()));
            }
            if b.name.trim().is_empty() {
                errors.push(format!("{}: name is empty", ctx()));
            }

            // ── Nested configuration ────────────────────────────
            for v in b.climate.violations() {
                errors.push(format!("{}: climate: {v}", ctx()));
            }
            for v in b.irrigation.violations() {
                errors.push(format!("{}: irrigation: {v}", ctx()));
            }

            // ── Initial chemistry ───────────────────────────────
            if !(b.sensors.current_ec.is_finite() && b.sensors.current_ec >= 0.0) {
                errors.push(format!(
                    "{}: sensors: current_ec must be >= 0, got {}",
                    ctx(),
                    b.sensors.current_ec
                ));
            }
            if !(0.0..=14.0).contains(&b.sensors.current_ph) {
                errors.push(format!(
                    "{}: sensors: current_ph {} out of range [0, 14]",
                    ctx(),
                    b.sensors.current_ph
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    parse(&contents).with_context(|| format!("invalid config: {path}"))
}

/// Parse and validate TOML config text.
pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("failed to parse config")?;
    config.validate()?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

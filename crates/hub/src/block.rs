//! Greenhouse block data model: sensors, devices, validated configuration,
//! fertigation process state and the bounded reading history.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use time::{OffsetDateTime, Time};

time::serde::format_description!(hhmm, Time, "[hour]:[minute]");

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Sensors & devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensors {
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    pub co2_level: f64,
    pub light_level: f64,
    pub current_ec: f64,
    pub current_ph: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Actuator flags. Irrigation fields are owned by the fertigation state
/// machine and the dosing controller; heater and vents by the climate model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Devices {
    pub heater: bool,
    pub vents: bool,
    pub curtains: bool,
    pub pump: bool,
    pub valve_a: bool,
    pub valve_b: bool,
    pub injector_acid: bool,
    pub injector_base: bool,
    pub injector_nutrient_a: bool,
    pub injector_nutrient_b: bool,
}

impl Devices {
    pub fn injectors_off(&mut self) {
        self.injector_acid = false;
        self.injector_base = false;
        self.injector_nutrient_a = false;
        self.injector_nutrient_b = false;
    }

    /// Pump, both valves and every injector off.
    pub fn irrigation_off(&mut self) {
        self.pump = false;
        self.valve_a = false;
        self.valve_b = false;
        self.injectors_off();
    }

    pub fn any_valve_open(&self) -> bool {
        self.valve_a || self.valve_b
    }
}

// ---------------------------------------------------------------------------
// Validated configuration (built from entries in `config`)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateConfig {
    pub target_temp_day: f64,
    pub target_temp_night: f64,
    pub vent_open_threshold: f64,
    pub heater_start_threshold: f64,
    pub curtain_close_light_level: f64,
    pub auto_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IrrigationMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub id: String,
    #[serde(with = "hhmm")]
    pub start_time: Time,
    pub enabled: bool,
}

impl ScheduleEntry {
    /// Minute-resolution match against a wall-clock time.
    pub fn matches(&self, now: Time) -> bool {
        self.enabled
            && self.start_time.hour() == now.hour()
            && self.start_time.minute() == now.minute()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrrigationConfig {
    pub mode: IrrigationMode,
    pub total_drippers: u32,
    /// Only the ratio between the two areas matters.
    pub valve_a_area: f64,
    pub valve_b_area: f64,
    /// Millilitres.
    pub target_volume_per_dripper: f64,
    pub target_ec: f64,
    pub target_ph: f64,
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockConfig {
    pub climate: ClimateConfig,
    pub irrigation: IrrigationConfig,
}

// ---------------------------------------------------------------------------
// Fertigation process
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Idle,
    WateringA,
    WateringB,
}

impl Status {
    /// Drawing from the shared main line.
    pub fn is_active(self) -> bool {
        matches!(self, Self::WateringA | Self::WateringB)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FertigationState {
    pub status: Status,
    /// Litres, non-increasing while active.
    pub remaining_volume_a: f64,
    pub remaining_volume_b: f64,
    /// L/min, display only.
    pub current_flow_rate: f64,
}

impl Default for FertigationState {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            remaining_volume_a: 0.0,
            remaining_volume_b: 0.0,
            current_flow_rate: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub temperature: f64,
    pub humidity: f64,
}

/// Drop-oldest ring of climate samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct History {
    #[serde(skip)]
    capacity: usize,
    points: VecDeque<HistoryPoint>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: HistoryPoint) {
        if self.capacity == 0 {
            return;
        }
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[cfg(test)]
    pub fn points(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub sensors: Sensors,
    pub devices: Devices,
    pub config: BlockConfig,
    pub fertigation: FertigationState,
    pub history: History,
}

impl Block {
    /// A freshly commissioned block with stock settings.
    pub fn with_defaults(
        id: BlockId,
        name: String,
        rng: &mut fastrand::Rng,
        now: OffsetDateTime,
        history_capacity: usize,
    ) -> Self {
        Self {
            id,
            name,
            sensors: Sensors {
                temperature: 20.0 + rng.f64() * 5.0,
                humidity: 60.0,
                soil_moisture: 50.0,
                co2_level: 400.0,
                light_level: 500.0,
                current_ec: 2.0,
                current_ph: 6.0,
                timestamp: now,
            },
            devices: Devices::default(),
            config: BlockConfig {
                climate: ClimateConfig {
                    target_temp_day: 24.0,
                    target_temp_night: 18.0,
                    vent_open_threshold: 26.0,
                    heater_start_threshold: 20.0,
                    curtain_close_light_level: 10000.0,
                    auto_mode: true,
                },
                irrigation: IrrigationConfig {
                    mode: IrrigationMode::Auto,
                    total_drippers: 1000,
                    valve_a_area: 100.0,
                    valve_b_area: 100.0,
                    target_volume_per_dripper: 100.0,
                    target_ec: 2.5,
                    target_ph: 6.0,
                    schedule: Vec::new(),
                },
            },
            fertigation: FertigationState::default(),
            history: History::new(history_capacity),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! The block fleet and the tick that advances it.
//!
//! A tick is two sequential passes. First every block is advanced from the
//! previous committed state (climate, fertigation, dosing) and the results
//! are committed together, so no block sees another's in-progress update.
//! Then the dispatcher consumes the schedule triggers and, using the
//! post-update busy flag, promotes at most one queued block.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::{debug, error, info};

use crate::block::{
    Block, BlockConfig, BlockId, ClimateConfig, Devices, FertigationState, History,
    HistoryPoint, IrrigationConfig, Sensors,
};
use crate::config::{ClimateConfigEntry, Config, IrrigationConfigEntry, SimulationConfig};
use crate::dispatcher::{Dispatcher, Minute, ScheduleTrigger};
use crate::error::{ConfigError, TickError};
use crate::fertigation::{self, Transition};
use crate::view::IrrigationView;
use crate::{climate, dosing};

// ---------------------------------------------------------------------------
// External weather (opaque upstream feed)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalWeather {
    pub temperature: f64,
    /// m/s
    pub wind_speed: f64,
    pub wind_direction: String,
    /// W/m²
    pub solar_radiation: f64,
}

impl Default for ExternalWeather {
    fn default() -> Self {
        Self {
            temperature: 15.0,
            wind_speed: 3.5,
            wind_direction: "NE".into(),
            solar_radiation: 450.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tick results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    Scheduled { block: BlockId },
    Promoted { block: BlockId, volume_a: f64, volume_b: f64 },
    SwitchedToB { block: BlockId },
    Finished { block: BlockId },
    Faulted { error: TickError },
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub blocks: Vec<Block>,
    pub queue: Vec<BlockId>,
    pub weather: ExternalWeather,
}

struct Advanced {
    block: Block,
    transition: Transition,
    due: Vec<String>,
}

// ---------------------------------------------------------------------------
// Greenhouse
// ---------------------------------------------------------------------------

pub struct Greenhouse {
    sim: SimulationConfig,
    offset: UtcOffset,
    blocks: Vec<Block>,
    dispatcher: Dispatcher,
    weather: ExternalWeather,
    rng: fastrand::Rng,
    next_seq: u64,
}

impl Greenhouse {
    pub fn new(sim: SimulationConfig) -> Result<Self> {
        let offset = sim.utc_offset()?;
        let rng = sim.seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        Ok(Self {
            sim,
            offset,
            blocks: Vec::new(),
            dispatcher: Dispatcher::new(),
            weather: ExternalWeather::default(),
            rng,
            next_seq: 1,
        })
    }

    /// Build the fleet from a validated config file.
    pub fn from_config(config: &Config, now: OffsetDateTime) -> Result<Self> {
        let mut gh = Self::new(config.simulation.clone())?;
        for entry in &config.blocks {
            let climate = ClimateConfig::try_from(entry.climate.clone())?;
            let irrigation = IrrigationConfig::try_from(entry.irrigation.clone())?;
            let s = &entry.sensors;
            gh.blocks.push(Block {
                id: BlockId::from(entry.id.as_str()),
                name: entry.name.clone(),
                sensors: Sensors {
                    temperature: s.temperature,
                    humidity: s.humidity,
                    soil_moisture: s.soil_moisture,
                    co2_level: s.co2_level,
                    light_level: s.light_level,
                    current_ec: s.current_ec,
                    current_ph: s.current_ph,
                    timestamp: now,
                },
                devices: Devices {
                    curtains: s.curtains,
                    ..Devices::default()
                },
                config: BlockConfig {
                    climate,
                    irrigation,
                },
                fertigation: FertigationState::default(),
                history: History::new(gh.sim.history_capacity),
            });
        }
        Ok(gh)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    fn block_mut(&mut self, id: &BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| &b.id == id)
    }

    pub fn queue(&self) -> Vec<BlockId> {
        self.dispatcher.queue().cloned().collect()
    }

    pub fn weather(&self) -> &ExternalWeather {
        &self.weather
    }

    pub fn set_weather(&mut self, weather: ExternalWeather) {
        self.weather = weather;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            blocks: self.blocks.clone(),
            queue: self.queue(),
            weather: self.weather().clone(),
        }
    }

    pub fn irrigation_view(&self, id: &BlockId) -> Option<IrrigationView> {
        self.block(id)
            .map(|b| IrrigationView::for_block(b, self.dispatcher.position(id)))
    }

    // -- Tick ----------------------------------------------------------------

    /// Advance every block by one tick at wall-clock `now`.
    pub fn tick(&mut self, now: OffsetDateTime) -> Vec<TickEvent> {
        let local = now.to_offset(self.offset);
        let wall = PrimitiveDateTime::new(local.date(), local.time());
        let mut events = Vec::new();
        let mut triggers = Vec::new();
        let mut released = false;

        // Pass 1: per-block update from committed state.
        let Self {
            sim, blocks, rng, ..
        } = self;
        let next: Vec<Block> = blocks
            .iter()
            .map(|b| match advance(b, sim, rng, now, wall) {
                Ok(a) => {
                    match a.transition {
                        Transition::None => {}
                        Transition::SwitchedToB => {
                            info!(block = %b.id, "fertigation: valve A done, switching to valve B");
                            events.push(TickEvent::SwitchedToB { block: b.id.clone() });
                        }
                        Transition::Finished => {
                            info!(block = %b.id, "fertigation: run complete");
                            released = true;
                            events.push(TickEvent::Finished { block: b.id.clone() });
                        }
                    }
                    triggers.extend(a.due.into_iter().map(|entry| ScheduleTrigger {
                        block: b.id.clone(),
                        entry,
                        minute: Minute::from(wall),
                    }));
                    a.block
                }
                Err(e) => {
                    error!(block = %b.id, "tick failed, block forced idle: {e}");
                    released |= b.fertigation.status.is_active();
                    events.push(TickEvent::Faulted { error: e });
                    fail_safe(b)
                }
            })
            .collect();
        self.blocks = next;

        // Pass 2: dispatcher.
        for block in self.dispatcher.record_triggers(triggers, &self.blocks) {
            events.push(TickEvent::Scheduled { block });
        }
        if released {
            debug!("dispatcher: main line released this tick, admission deferred");
        } else if let Some(p) = self.dispatcher.admit(&mut self.blocks, &self.sim) {
            events.push(TickEvent::Promoted {
                block: p.block,
                volume_a: p.volume_a,
                volume_b: p.volume_b,
            });
        }
        events
    }

    /// Append one history point per block from committed readings.
    pub fn record_history(&mut self, now: OffsetDateTime) {
        for b in &mut self.blocks {
            b.history.push(HistoryPoint {
                time: now,
                temperature: b.sensors.temperature,
                humidity: b.sensors.humidity,
            });
        }
    }

    // -- Queue ---------------------------------------------------------------

    pub fn enqueue<I>(&mut self, ids: I) -> Vec<BlockId>
    where
        I: IntoIterator<Item = BlockId>,
    {
        self.dispatcher.enqueue(ids, &self.blocks)
    }

    /// Queue every block in fleet order.
    pub fn enqueue_all(&mut self) -> Vec<BlockId> {
        let ids: Vec<BlockId> = self.blocks.iter().map(|b| b.id.clone()).collect();
        self.enqueue(ids)
    }

    pub fn dequeue(&mut self, id: &BlockId) -> bool {
        self.dispatcher.dequeue(id)
    }

    /// Operator stop: leave the queue and force the process idle right away.
    /// Safe to repeat. False only for unknown blocks.
    pub fn cancel(&mut self, id: &BlockId) -> bool {
        self.dispatcher.dequeue(id);
        let Some(block) = self.block_mut(id) else {
            return false;
        };
        block.fertigation = fertigation::cancelled();
        fertigation::apply_devices(block.fertigation.status, &mut block.devices);
        true
    }

    // -- Fleet ---------------------------------------------------------------

    pub fn add_block(&mut self, name: &str, now: OffsetDateTime) -> Result<BlockId, ConfigError> {
        let name = validate_name(name)?;
        let id = loop {
            let candidate = BlockId::from(format!("block-{}", self.next_seq));
            self.next_seq += 1;
            if self.block(&candidate).is_none() {
                break candidate;
            }
        };
        let block = Block::with_defaults(
            id.clone(),
            name,
            &mut self.rng,
            now,
            self.sim.history_capacity,
        );
        self.blocks.push(block);
        Ok(id)
    }

    pub fn remove_block(&mut self, id: &BlockId) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| &b.id != id);
        self.dispatcher.forget(id);
        self.blocks.len() != before
    }

    pub fn rename_block(&mut self, id: &BlockId, name: &str) -> Result<bool, ConfigError> {
        let name = validate_name(name)?;
        Ok(self.block_mut(id).map(|b| b.name = name).is_some())
    }

    // -- Configuration -------------------------------------------------------

    /// Replace a block's climate settings. Invalid entries are rejected before
    /// the block is looked up; `Ok(false)` means the block is unknown.
    pub fn update_climate_config(
        &mut self,
        id: &BlockId,
        entry: ClimateConfigEntry,
    ) -> Result<bool, ConfigError> {
        let cfg = ClimateConfig::try_from(entry)?;
        Ok(self.block_mut(id).map(|b| b.config.climate = cfg).is_some())
    }

    pub fn update_irrigation_config(
        &mut self,
        id: &BlockId,
        entry: IrrigationConfigEntry,
    ) -> Result<bool, ConfigError> {
        let cfg = IrrigationConfig::try_from(entry)?;
        Ok(self.block_mut(id).map(|b| b.config.irrigation = cfg).is_some())
    }
}

fn validate_name(name: &str) -> Result<String, ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid {
            what: "block name",
            violations: vec!["name is empty".into()],
        });
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Per-block pass
// ---------------------------------------------------------------------------

fn check_sensors(b: &Block) -> Result<(), TickError> {
    let readings = [
        ("temperature", b.sensors.temperature),
        ("humidity", b.sensors.humidity),
        ("current_ec", b.sensors.current_ec),
        ("current_ph", b.sensors.current_ph),
    ];
    for (sensor, v) in readings {
        if !v.is_finite() {
            return Err(TickError::NonFiniteSensor {
                block: b.id.clone(),
                sensor,
            });
        }
    }
    Ok(())
}

/// Pure with respect to every other block: reads only `b`'s committed state.
fn advance(
    b: &Block,
    sim: &SimulationConfig,
    rng: &mut fastrand::Rng,
    now: OffsetDateTime,
    wall: PrimitiveDateTime,
) -> Result<Advanced, TickError> {
    check_sensors(b)?;

    let climate = climate::step(&b.sensors, &b.devices, &b.config.climate, sim, rng);
    let fert = fertigation::step(&b.id, &b.fertigation, sim.flow_decrement_l)?;

    let mut devices = b.devices.clone();
    devices.heater = climate.heater;
    devices.vents = climate.vents;
    fertigation::apply_devices(fert.state.status, &mut devices);

    let dose = dosing::step(
        b.sensors.current_ec,
        b.sensors.current_ph,
        devices.pump,
        &b.config.irrigation,
        sim,
    );
    devices.injector_nutrient_a = dose.nutrient_a;
    devices.injector_nutrient_b = dose.nutrient_b;
    devices.injector_acid = dose.acid;
    devices.injector_base = dose.base;

    let due = fertigation::due_schedule_entries(&b.config.irrigation, b.fertigation.status, wall.time())
        .map(str::to_string)
        .collect();

    let mut next = b.clone();
    next.sensors.temperature = climate.temperature;
    next.sensors.humidity = climate.humidity;
    next.sensors.current_ec = dose.ec;
    next.sensors.current_ph = dose.ph;
    next.sensors.timestamp = now;
    next.devices = devices;
    next.fertigation = fert.state;

    Ok(Advanced {
        block: next,
        transition: fert.transition,
        due,
    })
}

/// A block that could not be advanced keeps its readings but releases the
/// main line.
fn fail_safe(b: &Block) -> Block {
    let mut next = b.clone();
    next.fertigation = fertigation::cancelled();
    fertigation::apply_devices(next.fertigation.status, &mut next.devices);
    next
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{IrrigationMode, Status};
    use crate::config::tests::{valid_block, valid_climate, valid_irrigation};
    use crate::config::ScheduleItemEntry;
    use time::macros::datetime;
    use time::Duration;

    const T0: OffsetDateTime = datetime!(2026-05-01 7:59:58 UTC);

    fn seeded() -> SimulationConfig {
        SimulationConfig {
            seed: Some(42),
            ..SimulationConfig::default()
        }
    }

    /// Two AUTO blocks both scheduled at 08:00, 100 L per valve each.
    fn greenhouse() -> Greenhouse {
        let config = Config {
            simulation: seeded(),
            blocks: vec![valid_block("block-1"), valid_block("block-2")],
        };
        Greenhouse::from_config(&config, T0).unwrap()
    }

    fn status(gh: &Greenhouse, id: &str) -> Status {
        gh.block(&BlockId::from(id)).unwrap().fertigation.status
    }

    fn active_count(gh: &Greenhouse) -> usize {
        gh.blocks()
            .iter()
            .filter(|b| b.fertigation.status.is_active())
            .count()
    }

    fn queue(gh: &Greenhouse) -> Vec<String> {
        gh.queue().iter().map(|id| id.to_string()).collect()
    }

    // -- Construction --------------------------------------------------------

    #[test]
    fn from_config_builds_idle_fleet() {
        let gh = greenhouse();
        assert_eq!(gh.blocks().len(), 2);
        assert!(gh.blocks().iter().all(|b| b.fertigation.status == Status::Idle));
        assert!(gh.queue().is_empty());
        assert_eq!(gh.weather(), &ExternalWeather::default());
    }

    // -- Schedule + admission ------------------------------------------------

    #[test]
    fn same_minute_schedule_serializes_blocks() {
        let mut gh = greenhouse();
        let mut now = T0;

        // 07:59:58, 07:59:59: nothing due.
        for _ in 0..2 {
            assert!(gh.tick(now).is_empty());
            now += Duration::seconds(1);
        }

        // 08:00:00: both enqueued, only the head starts.
        let events = gh.tick(now);
        assert!(events.contains(&TickEvent::Scheduled { block: BlockId::from("block-1") }));
        assert!(events.contains(&TickEvent::Scheduled { block: BlockId::from("block-2") }));
        assert_eq!(status(&gh, "block-1"), Status::WateringA);
        assert_eq!(status(&gh, "block-2"), Status::Idle);
        assert_eq!(queue(&gh), vec!["block-2"]);

        // Further ticks in the same minute do not re-enqueue block-1.
        now += Duration::seconds(1);
        gh.tick(now);
        assert_eq!(queue(&gh), vec!["block-2"]);

        // block-1 runs 50 + 50 ticks. block-2 waits at the head throughout.
        let mut ticks = 1;
        while status(&gh, "block-1") != Status::Idle {
            assert_eq!(active_count(&gh), 1);
            assert_eq!(queue(&gh), vec!["block-2"]);
            now += Duration::seconds(1);
            gh.tick(now);
            ticks += 1;
        }
        assert_eq!(ticks, 100);
        assert_eq!(status(&gh, "block-2"), Status::Idle, "no same-tick re-promotion");

        now += Duration::seconds(1);
        gh.tick(now);
        assert_eq!(status(&gh, "block-2"), Status::WateringA);
        assert!(queue(&gh).is_empty());
    }

    #[test]
    fn at_most_one_block_active_every_tick() {
        let mut gh = greenhouse();
        gh.add_block("Third", T0).unwrap();
        let mut now = T0;
        gh.enqueue_all();
        for _ in 0..600 {
            gh.tick(now);
            assert!(active_count(&gh) <= 1);
            for id in gh.queue() {
                assert_eq!(status(&gh, id.as_str()), Status::Idle, "queued block must be idle");
            }
            now += Duration::seconds(1);
        }
    }

    #[test]
    fn promoted_run_takes_ceil_ticks_through_greenhouse() {
        let mut gh = greenhouse();
        let mut irrigation = valid_irrigation();
        irrigation.schedule.clear();
        irrigation.total_drippers = 1000; // 50 L per valve
        irrigation.valve_a_area = 3.0; // 75 L on A
        irrigation.valve_b_area = 1.0; // 25 L on B
        let id = BlockId::from("block-1");
        gh.update_irrigation_config(&id, irrigation).unwrap();

        gh.enqueue([id.clone()]);
        let events = gh.tick(T0);
        assert!(matches!(events.last(), Some(TickEvent::Promoted { .. })));

        let mut ticks = 0;
        let mut now = T0;
        while status(&gh, "block-1") != Status::Idle {
            now += Duration::seconds(1);
            gh.tick(now);
            ticks += 1;
        }
        assert_eq!(ticks, (75.0_f64 / 2.0).ceil() as usize + (25.0_f64 / 2.0).ceil() as usize);
    }

    #[test]
    fn manual_mode_ignores_schedule() {
        let mut gh = greenhouse();
        let mut irrigation = valid_irrigation();
        irrigation.mode = IrrigationMode::Manual;
        gh.update_irrigation_config(&BlockId::from("block-1"), irrigation).unwrap();
        gh.tick(datetime!(2026-05-01 8:00:05 UTC));
        assert_eq!(status(&gh, "block-1"), Status::Idle);
        assert_eq!(status(&gh, "block-2"), Status::WateringA);
    }

    #[test]
    fn schedule_uses_configured_offset() {
        let config = Config {
            simulation: SimulationConfig {
                utc_offset_minutes: 180,
                ..seeded()
            },
            blocks: vec![valid_block("block-1")],
        };
        let mut gh = Greenhouse::from_config(&config, T0).unwrap();
        gh.tick(datetime!(2026-05-01 8:00 UTC));
        assert_eq!(status(&gh, "block-1"), Status::Idle);
        gh.tick(datetime!(2026-05-01 5:00 UTC));
        assert_eq!(status(&gh, "block-1"), Status::WateringA);
    }

    // -- Devices -------------------------------------------------------------

    #[test]
    fn pump_runs_with_dosing_while_watering() {
        let mut gh = greenhouse();
        let id = BlockId::from("block-1");
        gh.enqueue([id.clone()]);
        gh.tick(T0);
        {
            let b = gh.block(&id).unwrap();
            assert!(b.devices.pump && b.devices.valve_a);
        }

        // EC 2.0 against target 2.5: nutrient injectors on, EC rises.
        let before = gh.block(&id).unwrap().sensors.current_ec;
        gh.tick(T0 + Duration::seconds(1));
        let b = gh.block(&id).unwrap();
        assert!(b.devices.injector_nutrient_a && b.devices.injector_nutrient_b);
        assert!(b.sensors.current_ec > before);
        // pH 6.0 against 5.8: acid.
        assert!(b.devices.injector_acid && !b.devices.injector_base);

        let idle = gh.block(&BlockId::from("block-2")).unwrap();
        assert!(!idle.devices.pump && !idle.devices.injector_nutrient_a);
    }

    // -- Cancellation --------------------------------------------------------

    #[test]
    fn cancel_mid_watering_b_releases_immediately() {
        let mut gh = greenhouse();
        let id = BlockId::from("block-1");
        gh.enqueue([id.clone(), BlockId::from("block-2")]);
        let mut now = T0;
        gh.tick(now);
        while status(&gh, "block-1") != Status::WateringB {
            now += Duration::seconds(1);
            gh.tick(now);
        }
        now += Duration::seconds(1);
        gh.tick(now);

        assert!(gh.cancel(&id));
        let b = gh.block(&id).unwrap();
        assert_eq!(b.fertigation.status, Status::Idle);
        assert_eq!(b.fertigation.remaining_volume_a, 0.0);
        assert_eq!(b.fertigation.remaining_volume_b, 0.0);
        assert!(!b.devices.pump && !b.devices.valve_a && !b.devices.valve_b);
        assert!(!b.devices.injector_acid && !b.devices.injector_nutrient_a);

        assert!(gh.cancel(&id), "stopping twice is safe");
        assert_eq!(gh.block(&id).unwrap().fertigation, FertigationState::default());

        // Next tick the waiting block is promoted.
        gh.tick(now + Duration::seconds(1));
        assert_eq!(status(&gh, "block-2"), Status::WateringA);
    }

    #[test]
    fn cancel_queued_block_only_leaves_queue() {
        let mut gh = greenhouse();
        let a = BlockId::from("block-1");
        let b = BlockId::from("block-2");
        gh.enqueue([a.clone(), b.clone()]);
        gh.tick(T0);
        assert!(gh.cancel(&b));
        assert!(gh.queue().is_empty());
        assert_eq!(status(&gh, "block-2"), Status::Idle);
        assert_eq!(status(&gh, "block-1"), Status::WateringA, "others untouched");
    }

    #[test]
    fn cancel_unknown_block_is_noop() {
        let mut gh = greenhouse();
        assert!(!gh.cancel(&BlockId::from("ghost")));
    }

    // -- Queue ---------------------------------------------------------------

    #[test]
    fn enqueue_twice_yields_one_entry() {
        let mut gh = greenhouse();
        let id = BlockId::from("block-2");
        gh.enqueue([id.clone()]);
        gh.enqueue([id.clone()]);
        assert_eq!(queue(&gh), vec!["block-2"]);
    }

    #[test]
    fn enqueue_active_block_is_noop() {
        let mut gh = greenhouse();
        let id = BlockId::from("block-1");
        gh.enqueue([id.clone()]);
        gh.tick(T0);
        assert!(gh.enqueue([id]).is_empty());
        assert!(gh.queue().is_empty());
    }

    // -- Fleet ---------------------------------------------------------------

    #[test]
    fn removed_block_in_queue_is_tolerated() {
        let mut gh = greenhouse();
        let a = BlockId::from("block-1");
        gh.enqueue([a.clone()]);
        assert!(gh.remove_block(&a));
        assert!(!gh.remove_block(&a));
        assert!(gh.queue().is_empty());
        gh.tick(T0);
        assert_eq!(active_count(&gh), 0);
    }

    #[test]
    fn add_block_generates_unique_ids() {
        let mut gh = greenhouse();
        let first = gh.add_block("Cucumbers", T0).unwrap();
        let second = gh.add_block("Peppers", T0).unwrap();
        assert_ne!(first, second);
        assert_ne!(first.as_str(), "block-1");
        assert_ne!(first.as_str(), "block-2");
        assert_eq!(gh.blocks().len(), 4);
        assert!(gh.add_block("   ", T0).is_err());
    }

    #[test]
    fn rename_trims_and_rejects_empty() {
        let mut gh = greenhouse();
        let id = BlockId::from("block-1");
        assert_eq!(gh.rename_block(&id, "  Tomatoes "), Ok(true));
        assert_eq!(gh.block(&id).unwrap().name, "Tomatoes");
        assert!(gh.rename_block(&id, "").is_err());
        assert_eq!(gh.rename_block(&BlockId::from("ghost"), "X"), Ok(false));
    }

    // -- Configuration -------------------------------------------------------

    #[test]
    fn invalid_config_update_is_rejected_and_not_applied() {
        let mut gh = greenhouse();
        let id = BlockId::from("block-1");
        let before = gh.block(&id).unwrap().config.clone();

        let mut irrigation = valid_irrigation();
        irrigation.valve_a_area = -5.0;
        irrigation.schedule.push(ScheduleItemEntry {
            id: "late".into(),
            start_time: "25:00".into(),
            enabled: true,
        });
        let err = gh.update_irrigation_config(&id, irrigation).unwrap_err();
        assert_eq!(err.violations().len(), 2);

        let mut climate = valid_climate();
        climate.vent_open_threshold = 10.0;
        assert!(gh.update_climate_config(&id, climate).is_err());

        assert_eq!(gh.block(&id).unwrap().config, before);
    }

    #[test]
    fn config_update_for_unknown_block_reports_false() {
        let mut gh = greenhouse();
        let ghost = BlockId::from("ghost");
        assert_eq!(gh.update_climate_config(&ghost, valid_climate()), Ok(false));
        assert_eq!(gh.update_irrigation_config(&ghost, valid_irrigation()), Ok(false));
    }

    // -- Failure isolation ---------------------------------------------------

    #[test]
    fn faulted_block_is_isolated_and_forced_idle() {
        let mut gh = greenhouse();
        gh.enqueue([BlockId::from("block-1"), BlockId::from("block-2")]);
        gh.tick(T0);
        let bad = gh.block_mut(&BlockId::from("block-1")).unwrap();
        bad.fertigation.remaining_volume_a = f64::NAN;

        let events = gh.tick(T0 + Duration::seconds(1));
        assert!(events
            .iter()
            .any(|e| matches!(e, TickEvent::Faulted { error: TickError::NonFiniteVolume { .. } })));
        let b = gh.block(&BlockId::from("block-1")).unwrap();
        assert_eq!(b.fertigation, FertigationState::default());
        assert!(!b.devices.pump);

        // The rest of the fleet keeps going, but waits a tick for the line.
        let other = gh.block(&BlockId::from("block-2")).unwrap();
        assert_eq!(other.sensors.timestamp, T0 + Duration::seconds(1));
        assert_eq!(other.fertigation.status, Status::Idle);

        gh.tick(T0 + Duration::seconds(2));
        let other = gh.block(&BlockId::from("block-2")).unwrap();
        assert_eq!(other.fertigation.status, Status::WateringA);
    }

    // -- History -------------------------------------------------------------

    #[test]
    fn history_samples_committed_readings_without_touching_state() {
        let mut gh = greenhouse();
        let before: Vec<(Sensors, Devices, FertigationState)> = gh
            .blocks()
            .iter()
            .map(|b| (b.sensors.clone(), b.devices.clone(), b.fertigation.clone()))
            .collect();
        for i in 0..25 {
            gh.record_history(T0 + Duration::seconds(i));
        }
        for (b, (s, d, f)) in gh.blocks().iter().zip(before) {
            assert_eq!(b.history.len(), 20);
            assert_eq!((&b.sensors, &b.devices, &b.fertigation), (&s, &d, &f));
            assert_eq!(b.history.points().last().unwrap().temperature, s.temperature);
        }
    }

    // -- Determinism ---------------------------------------------------------

    #[test]
    fn seeded_runs_are_reproducible() {
        let run = || {
            let mut gh = greenhouse();
            for i in 0..30 {
                gh.tick(T0 + Duration::seconds(i));
            }
            gh.blocks()
                .iter()
                .map(|b| (b.sensors.temperature, b.sensors.humidity))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}

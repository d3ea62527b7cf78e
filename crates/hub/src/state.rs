use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::block::{Block, BlockId};
use crate::config::{ClimateConfigEntry, IrrigationConfigEntry};
use crate::dispatcher::global_busy;
use crate::error::ConfigError;
use crate::greenhouse::{ExternalWeather, Greenhouse, TickEvent};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Everything the clock, the MQTT intake and the web API share. Every
/// mutation goes through here so it lands in the event log.
pub struct SystemState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    pub greenhouse: Greenhouse,
    pub events: VecDeque<SystemEvent>,
    /// Station whose feed was last logged as an event.
    weather_station: Option<String>,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    System,
    Dispatch,
    Irrigation,
    Weather,
    Error,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub global_busy: bool,
    pub blocks: Vec<Block>,
    pub queue: Vec<BlockId>,
    pub weather: ExternalWeather,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new(greenhouse: Greenhouse) -> Self {
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            greenhouse,
            events: VecDeque::with_capacity(MAX_EVENTS),
            weather_station: None,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    // ── Clock ───────────────────────────────────────────────────────

    /// Advance the simulation one tick and log what happened.
    pub fn tick(&mut self, now: OffsetDateTime) {
        for event in self.greenhouse.tick(now) {
            match event {
                TickEvent::Scheduled { block } => {
                    self.push_event(EventKind::Dispatch, format!("{block} queued by schedule"));
                }
                TickEvent::Promoted {
                    block,
                    volume_a,
                    volume_b,
                } => self.push_event(
                    EventKind::Irrigation,
                    format!("{block} started: A {volume_a:.1} L, B {volume_b:.1} L"),
                ),
                TickEvent::SwitchedToB { block } => {
                    self.push_event(EventKind::Irrigation, format!("{block} switched to valve B"));
                }
                TickEvent::Finished { block } => {
                    self.push_event(EventKind::Irrigation, format!("{block} finished"));
                }
                TickEvent::Faulted { error } => {
                    self.push_event(EventKind::Error, format!("{error}; forced idle"));
                }
            }
        }
    }

    pub fn sample_history(&mut self, now: OffsetDateTime) {
        self.greenhouse.record_history(now);
    }

    // ── Operator commands ───────────────────────────────────────────

    /// Queue `ids` on behalf of `source` ("http", "mqtt").
    pub fn enqueue(&mut self, ids: Vec<BlockId>, source: &str) -> Vec<BlockId> {
        let added = self.greenhouse.enqueue(ids);
        self.record_queued(&added, source);
        added
    }

    pub fn enqueue_all(&mut self, source: &str) -> Vec<BlockId> {
        let added = self.greenhouse.enqueue_all();
        self.record_queued(&added, source);
        added
    }

    fn record_queued(&mut self, added: &[BlockId], source: &str) {
        if added.is_empty() {
            return;
        }
        let ids: Vec<&str> = added.iter().map(BlockId::as_str).collect();
        info!(source, blocks = ?ids, "dispatcher: enqueued");
        self.push_event(
            EventKind::Dispatch,
            format!("{} queued by {source}", ids.join(", ")),
        );
    }

    pub fn dequeue(&mut self, id: &BlockId, source: &str) -> bool {
        let removed = self.greenhouse.dequeue(id);
        if removed {
            self.push_event(EventKind::Dispatch, format!("{id} removed from queue by {source}"));
        }
        removed
    }

    pub fn stop(&mut self, id: &BlockId, source: &str) -> bool {
        let was_active = self
            .greenhouse
            .block(id)
            .is_some_and(|b| b.fertigation.status.is_active());
        let found = self.greenhouse.cancel(id);
        if found {
            info!(block = %id, source, was_active, "fertigation: stopped");
            self.push_event(EventKind::Irrigation, format!("{id} stopped by {source}"));
        }
        found
    }

    // ── Fleet ───────────────────────────────────────────────────────

    pub fn add_block(&mut self, name: &str) -> Result<BlockId, ConfigError> {
        let id = self.greenhouse.add_block(name, OffsetDateTime::now_utc())?;
        self.push_event(EventKind::System, format!("{id} added"));
        Ok(id)
    }

    pub fn remove_block(&mut self, id: &BlockId) -> bool {
        let removed = self.greenhouse.remove_block(id);
        if removed {
            self.push_event(EventKind::System, format!("{id} removed"));
        }
        removed
    }

    pub fn rename_block(&mut self, id: &BlockId, name: &str) -> Result<bool, ConfigError> {
        let renamed = self.greenhouse.rename_block(id, name)?;
        if renamed {
            self.push_event(EventKind::System, format!("{id} renamed to '{}'", name.trim()));
        }
        Ok(renamed)
    }

    pub fn update_climate(
        &mut self,
        id: &BlockId,
        entry: ClimateConfigEntry,
    ) -> Result<bool, ConfigError> {
        let applied = self.greenhouse.update_climate_config(id, entry)?;
        if applied {
            self.push_event(EventKind::System, format!("{id} climate config updated"));
        }
        Ok(applied)
    }

    pub fn update_irrigation(
        &mut self,
        id: &BlockId,
        entry: IrrigationConfigEntry,
    ) -> Result<bool, ConfigError> {
        let applied = self.greenhouse.update_irrigation_config(id, entry)?;
        if applied {
            self.push_event(EventKind::System, format!("{id} irrigation config updated"));
        }
        Ok(applied)
    }

    // ── Feeds ───────────────────────────────────────────────────────

    /// Apply a weather sample. Only the first sample from a station (after
    /// startup, a reconnect or a station change) lands in the event log.
    pub fn record_weather(&mut self, station: &str, weather: ExternalWeather) {
        let detail = format!(
            "{station}: {:.1} °C, wind {:.1} m/s {}, {:.0} W/m²",
            weather.temperature,
            weather.wind_speed,
            weather.wind_direction,
            weather.solar_radiation
        );
        self.greenhouse.set_weather(weather);
        if self.weather_station.as_deref() == Some(station) {
            debug!(station, "weather: {detail}");
            return;
        }
        self.weather_station = Some(station.to_string());
        self.push_event(EventKind::Weather, detail);
    }

    /// Mark the broker connection state. A fresh connection logs the next
    /// weather sample again.
    pub fn set_mqtt_connected(&mut self, connected: bool) {
        self.mqtt_connected = connected;
        self.weather_station = None;
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        let snapshot = self.greenhouse.snapshot();
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            global_busy: global_busy(&snapshot.blocks),
            blocks: snapshot.blocks,
            queue: snapshot.queue,
            weather: snapshot.weather,
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::block::BlockId;
use crate::greenhouse::ExternalWeather;
use crate::state::SharedState;

// ---------------------------------------------------------------------------
// MQTT message types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct WeatherMsg {
    pub(crate) ts: i64,
    #[serde(flatten)]
    pub(crate) weather: ExternalWeather,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IrrigationCommand {
    Start,
    Stop,
}

// ---------------------------------------------------------------------------
// Topic / payload helpers
// ---------------------------------------------------------------------------

/// Middle segment of a three-part `<prefix>/<id>/<suffix>` topic.
fn middle_segment<'a>(topic: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        [p, id, s] if *p == prefix && *s == suffix && !id.is_empty() => Some(*id),
        _ => None,
    }
}

/// Extract station_id from "tele/<station_id>/weather".
pub(crate) fn extract_station_id(topic: &str) -> Option<&str> {
    middle_segment(topic, "tele", "weather")
}

/// Extract block_id from "block/<block_id>/irrigation".
pub(crate) fn extract_block_id(topic: &str) -> Option<&str> {
    middle_segment(topic, "block", "irrigation")
}

/// Parse a "START"/"STOP" payload (case-insensitive, trims whitespace).
pub(crate) fn parse_irrigation_command(payload: &[u8]) -> Result<IrrigationCommand, String> {
    let s = String::from_utf8_lossy(payload).trim().to_uppercase();
    match s.as_str() {
        "START" => Ok(IrrigationCommand::Start),
        "STOP" => Ok(IrrigationCommand::Stop),
        _ => Err(format!("unknown irrigation command '{s}'")),
    }
}

// ---------------------------------------------------------------------------
// Dispatch of incoming publishes
// ---------------------------------------------------------------------------

pub(crate) async fn handle_publish(shared: &SharedState, topic: &str, payload: &[u8]) {
    if let Some(station) = extract_station_id(topic) {
        match serde_json::from_slice::<WeatherMsg>(payload) {
            Ok(msg) => {
                debug!(station, ts = msg.ts, weather = ?msg.weather, "weather telemetry");
                let mut st = shared.write().await;
                st.record_weather(station, msg.weather);
            }
            Err(e) => {
                warn!(%topic, "bad weather json: {e}");
                let mut st = shared.write().await;
                st.record_error(format!("bad weather json: {e}"));
            }
        }
    } else if let Some(block) = extract_block_id(topic) {
        let id = BlockId::from(block);
        match parse_irrigation_command(payload) {
            Ok(IrrigationCommand::Start) => {
                let mut st = shared.write().await;
                if st.enqueue(vec![id.clone()], "mqtt").is_empty() {
                    info!(block = %id, "START ignored: unknown, active or already queued");
                }
            }
            Ok(IrrigationCommand::Stop) => {
                let mut st = shared.write().await;
                if !st.stop(&id, "mqtt") {
                    info!(block = %id, "STOP ignored: unknown block");
                }
            }
            Err(msg) => {
                warn!(block = %id, "{msg} (use START/STOP)");
                let mut st = shared.write().await;
                st.record_error(format!("{id}: {msg}"));
            }
        }
    } else {
        debug!(%topic, "unhandled topic");
    }
}

// ===========================================================================
// Tests
// ===========================================================================

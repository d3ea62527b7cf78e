mod sim;

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::{env, time::Duration};
use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use sim::{Weather, WeatherSim};

#[derive(Debug, Serialize)]
struct WeatherMsg<'a> {
    ts: i64,
    #[serde(flatten)]
    weather: &'a Weather,
}

fn weather_topic(station_id: &str) -> String {
    format!("tele/{station_id}/weather")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Env config
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let station_id = env::var("STATION_ID").unwrap_or_else(|_| "weather-1".to_string());

    let sample_every_s: u64 = env::var("SAMPLE_EVERY_S")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let client_id = format!("greenhouse-weather-{station_id}");

    let mut mqttoptions = MqttOptions::new(client_id, broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    // Publish only, but the eventloop must run to keep the connection alive.
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("station connected to mqtt");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("mqtt error: {e}. retrying...");
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    let topic = weather_topic(&station_id);
    info!(%topic, sample_every_s, "publishing weather");

    let mut sim = WeatherSim::new(fastrand::Rng::new());

    loop {
        let msg = WeatherMsg {
            ts: OffsetDateTime::now_utc().unix_timestamp(),
            weather: sim.sample(),
        };
        let payload = serde_json::to_vec(&msg)?;

        if let Err(e) = client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            warn!("publish error: {e}");
        } else {
            debug!(ts = msg.ts, "published weather");
        }

        sleep(Duration::from_secs(sample_every_s)).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

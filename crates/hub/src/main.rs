mod advisor;
mod block;
mod climate;
mod clock;
mod config;
mod dispatcher;
mod dosing;
mod error;
mod fertigation;
mod greenhouse;
mod mqtt;
mod state;
mod view;
mod volume;
mod web;

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use greenhouse::Greenhouse;
use state::SystemState;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);

    // ── Config file (simulation constants + initial fleet) ───────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    let sim = cfg.simulation.clone();

    let greenhouse = Greenhouse::from_config(&cfg, OffsetDateTime::now_utc())?;
    if greenhouse.blocks().is_empty() {
        warn!("no blocks configured; add them over the http api");
    }
    info!(
        blocks = greenhouse.blocks().len(),
        tick_ms = sim.tick_ms,
        seeded = sim.seed.is_some(),
        "greenhouse ready"
    );

    // ── Shared state ────────────────────────────────────────────────
    let shared = SystemState::new(greenhouse).shared();
    {
        let mut st = shared.write().await;
        st.record_system("hub started".to_string());
    }

    // ── Simulation clock & history ──────────────────────────────────
    tokio::spawn(clock::run(
        Arc::clone(&shared),
        Duration::from_millis(sim.tick_ms),
    ));
    tokio::spawn(clock::run_history(
        Arc::clone(&shared),
        Duration::from_millis(sim.history_every_ms),
    ));

    // ── Web server ──────────────────────────────────────────────────
    let web_state = AppState {
        shared: Arc::clone(&shared),
        advisor: advisor::select(env::var("ADVISOR").ok().as_deref(), sim.dosing_deadband),
    };
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_state).await {
            error!("web server stopped: {e:#}");
        }
    });

    // ── MQTT ────────────────────────────────────────────────────────
    let client_id = "greenhouse-hub";
    let mut mqttoptions = MqttOptions::new(client_id, broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    client.subscribe("tele/+/weather", QoS::AtLeastOnce).await?;
    client.subscribe("block/+/irrigation", QoS::AtLeastOnce).await?;
    info!("hub subscribed to tele/+/weather and block/+/irrigation");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                mqtt::handle_publish(&shared, &p.topic, &p.payload).await;
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                let mut st = shared.write().await;
                st.set_mqtt_connected(true);
                st.record_system("mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
                let mut st = shared.write().await;
                st.set_mqtt_connected(false);
                st.record_system("mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                // The clock keeps ticking; only the command/telemetry feed is down.
                error!("mqtt error: {e}. reconnecting...");
                let mut st = shared.write().await;
                st.set_mqtt_connected(false);
                st.record_error(format!("mqtt error: {e}"));
                drop(st);

                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

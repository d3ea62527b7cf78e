//! Simulation clock and history sampler.
//!
//! Both loops take the write lock only for the duration of one step, so HTTP
//! and MQTT handlers always observe a fully committed tick.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::state::SharedState;

/// Run the per-block tick loop. Intended to be `tokio::spawn`-ed from main.
pub async fn run(shared: SharedState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // A stalled runtime should not replay a burst of ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(tick_ms = every.as_millis() as u64, "simulation clock started");
    {
        let mut st = shared.write().await;
        st.record_system(format!("simulation clock started ({} ms)", every.as_millis()));
    }

    loop {
        ticker.tick().await;
        let mut st = shared.write().await;
        st.tick(OffsetDateTime::now_utc());
    }
}

/// Sample climate history on its own, slower cadence.
pub async fn run_history(shared: SharedState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(every_ms = every.as_millis() as u64, "history sampler started");

    loop {
        ticker.tick().await;
        let mut st = shared.write().await;
        st.sample_history(OffsetDateTime::now_utc());
    }
}

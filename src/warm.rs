use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::constants::DEFAULT_WINDOW_MINUTES;
use crate::magnetometer::{self, default_station};
use crate::types::{AppState, DataSource};
use crate::{kp, radio_blackout, solar_wind};

pub fn spawn_warmup(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(state.cfg.warm_start_delay).await;
        info!(
            "Cache warming every {}s for static-key resources",
            state.cfg.warm_interval.as_secs()
        );
        loop {
            warm_once(&state).await;
            sleep(state.cfg.warm_interval).await;
        }
    })
}

pub async fn warm_once(state: &AppState) -> usize {
    let started = Instant::now();
    let caches = &state.caches;
    let station = default_station();
    let magnetometer_key = magnetometer::cache_key(station, DEFAULT_WINDOW_MINUTES);

    // radio blackout has no live feed and is not counted
    let (wind, kp_index, _, ground) = futures::join!(
        caches
            .solar_wind
            .refresh(solar_wind::CACHE_KEY, || solar_wind::fetch(state)),
        caches.kp.refresh(kp::CACHE_KEY, || kp::fetch(state)),
        caches
            .radio_blackout
            .refresh(radio_blackout::CACHE_KEY, || async {
                Arc::new(radio_blackout::synthetic())
            }),
        caches.magnetometer.refresh(&magnetometer_key, || {
            magnetometer::fetch(state, station, DEFAULT_WINDOW_MINUTES)
        }),
    );

    let live = [wind.source, kp_index.source, ground.source]
        .into_iter()
        .filter(|source| *source == DataSource::Live)
        .count();
    debug!(
        live,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "cache warm pass finished"
    );
    live
}

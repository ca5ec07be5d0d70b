use std::sync::Arc;

use axum::body::Bytes;
use reqwest::Client;
use serde::Serialize;

use crate::cache::{Clock, ReadThroughCache};
use crate::config::Config;
use crate::kp::KpPayload;
use crate::magnetometer::{MagnetometerDayPayload, MagnetometerPayload};
use crate::radio_blackout::RadioBlackoutPayload;
use crate::solar_wind::SolarWindPayload;
use crate::weather::WeatherPayload;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub http: Client,
    pub caches: Arc<Caches>,
}

impl AppState {
    pub fn new(cfg: Arc<Config>, http: Client, clock: Arc<dyn Clock>) -> Self {
        let caches = Arc::new(Caches::new(&cfg, clock));
        Self { cfg, http, caches }
    }
}

pub struct Caches {
    pub solar_wind: ReadThroughCache<Arc<SolarWindPayload>>,
    pub kp: ReadThroughCache<Arc<KpPayload>>,
    pub radio_blackout: ReadThroughCache<Arc<RadioBlackoutPayload>>,
    pub magnetometer: ReadThroughCache<Arc<MagnetometerPayload>>,
    pub magnetometer_day: ReadThroughCache<Arc<MagnetometerDayPayload>>,
    pub weather: ReadThroughCache<Arc<WeatherPayload>>,
    pub radar_tiles: ReadThroughCache<CachedImage>,
    pub image: ReadThroughCache<CachedImage>,
}

impl Caches {
    pub fn new(cfg: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            solar_wind: ReadThroughCache::new("solar_wind", cfg.realtime_ttl, clock.clone()),
            kp: ReadThroughCache::new("kp", cfg.realtime_ttl, clock.clone()),
            radio_blackout: ReadThroughCache::new(
                "radio_blackout",
                cfg.realtime_ttl,
                clock.clone(),
            ),
            magnetometer: ReadThroughCache::new("magnetometer", cfg.realtime_ttl, clock.clone()),
            magnetometer_day: ReadThroughCache::new(
                "magnetometer_day",
                cfg.realtime_ttl,
                clock.clone(),
            ),
            weather: ReadThroughCache::new("weather", cfg.slow_ttl, clock.clone())
                .with_max_entries(cfg.tile_cache_max_entries),
            radar_tiles: ReadThroughCache::new("radar_tiles", cfg.tile_ttl, clock.clone())
                .with_max_entries(cfg.tile_cache_max_entries),
            image: ReadThroughCache::new("image", cfg.realtime_ttl, clock),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Synthetic,
}

#[derive(Clone, Debug)]
pub struct CachedImage {
    pub content_type: String,
    pub body: Bytes,
}

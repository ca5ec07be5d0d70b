use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use reqwest::Client;

use crate::cache::SystemClock;
use crate::config::Config;
use crate::types::AppState;

// nothing listens on the discard port
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test upstream");
    let addr = listener.local_addr().expect("test upstream address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

pub fn test_config(customize: impl FnOnce(&mut Config)) -> Config {
    let mut cfg = Config::from_lookup(|_| None).expect("default config");
    cfg.request_timeout = Duration::from_secs(2);
    cfg.static_dir = std::env::temp_dir().join("space-weather-api-test-static");
    let upstreams = &mut cfg.upstreams;
    upstreams.plasma_url = format!("{UNREACHABLE_URL}/plasma");
    upstreams.mag_url = format!("{UNREACHABLE_URL}/mag");
    upstreams.kp_url = format!("{UNREACHABLE_URL}/kp");
    upstreams.magnetometer_wfs_url = format!("{UNREACHABLE_URL}/wfs");
    upstreams.magnetometer_text_template = format!("{UNREACHABLE_URL}/{{station}}.txt");
    upstreams.weather_url = format!("{UNREACHABLE_URL}/forecast");
    upstreams.radar_wms_url = format!("{UNREACHABLE_URL}/wms");
    upstreams.proxied_image_url = format!("{UNREACHABLE_URL}/latest.jpg");
    customize(&mut cfg);
    cfg
}

pub fn test_state(customize: impl FnOnce(&mut Config)) -> AppState {
    let http = Client::builder()
        .build()
        .expect("reqwest client");
    AppState::new(
        Arc::new(test_config(customize)),
        http,
        Arc::new(SystemClock),
    )
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ApiError, UpstreamError};
use crate::http_client::fetch_json;
use crate::types::{AppState, DataSource};
use crate::utils::{iso_utc, parse_time_utc, round1, round2, to_finite_number};

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    current: Option<OpenMeteoCurrent>,
    #[serde(default)]
    current_units: Option<OpenMeteoUnits>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoCurrent {
    time: Option<String>,
    temperature_2m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoUnits {
    temperature_2m: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WeatherPayload {
    pub source: DataSource,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: Option<f64>,
    pub unit: String,
    pub time: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn parse(lat: Option<&str>, lon: Option<&str>) -> Result<Self, ApiError> {
        let lat = to_finite_number(lat).filter(|value| (-90.0..=90.0).contains(value));
        let lon = to_finite_number(lon).filter(|value| (-180.0..=180.0).contains(value));
        match (lat, lon) {
            (Some(lat), Some(lon)) => Ok(Self {
                lat: round2(lat),
                lon: round2(lon),
            }),
            _ => Err(ApiError::BadRequest(
                "Invalid lat/lon query parameters. Expected decimal degrees.".to_string(),
            )),
        }
    }

    fn cache_key(&self) -> String {
        format!("{:.2}:{:.2}", self.lat, self.lon)
    }
}

pub async fn load(state: &AppState, at: Coordinates) -> Arc<WeatherPayload> {
    state
        .caches
        .weather
        .get_or_fetch(&at.cache_key(), || fetch(state, at))
        .await
}

pub async fn fetch(state: &AppState, at: Coordinates) -> Arc<WeatherPayload> {
    match fetch_live(state, at).await {
        Ok(payload) => Arc::new(payload),
        Err(reason) => {
            warn!("Weather at {:.2},{:.2} degraded: {reason}", at.lat, at.lon);
            Arc::new(WeatherPayload {
                source: DataSource::Synthetic,
                latitude: at.lat,
                longitude: at.lon,
                temperature: None,
                unit: "°C".to_string(),
                time: None,
            })
        }
    }
}

async fn fetch_live(state: &AppState, at: Coordinates) -> Result<WeatherPayload, UpstreamError> {
    let mut url = reqwest::Url::parse(&state.cfg.upstreams.weather_url)
        .map_err(|error| UpstreamError::Malformed(format!("invalid weather url: {error}")))?;
    url.query_pairs_mut()
        .append_pair("latitude", &at.lat.to_string())
        .append_pair("longitude", &at.lon.to_string())
        .append_pair("current", "temperature_2m")
        .append_pair("timezone", "UTC");

    let response: OpenMeteoResponse =
        fetch_json(&state.http, url.as_str(), state.cfg.request_timeout).await?;
    build_payload(response, at)
}

fn build_payload(
    response: OpenMeteoResponse,
    at: Coordinates,
) -> Result<WeatherPayload, UpstreamError> {
    let current = response.current.ok_or_else(|| {
        UpstreamError::Malformed("weather response has no current block".to_string())
    })?;
    let temperature = current
        .temperature_2m
        .filter(|value| value.is_finite())
        .ok_or_else(|| {
            UpstreamError::Malformed("weather response has no temperature".to_string())
        })?;

    Ok(WeatherPayload {
        source: DataSource::Live,
        latitude: at.lat,
        longitude: at.lon,
        temperature: Some(round1(temperature)),
        unit: response
            .current_units
            .and_then(|units| units.temperature_2m)
            .unwrap_or_else(|| "°C".to_string()),
        time: current
            .time
            .as_deref()
            .and_then(parse_time_utc)
            .map(iso_utc),
    })
}

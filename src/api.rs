use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::constants::STATIONS;
use crate::error::ApiError;
use crate::magnetometer::{clamp_minutes, find_station, resolve_station};
use crate::radar::{TileQuery, TileRequest};
use crate::types::{AppState, CachedImage};
use crate::utils::{iso_utc, now_iso};
use crate::weather::Coordinates;
use crate::{
    ephemeris, image_proxy, kp, magnetometer, radar, radio_blackout, solar_wind, weather,
};

#[derive(Debug, Deserialize)]
pub(crate) struct LocationQuery {
    #[serde(default)]
    lat: Option<String>,
    #[serde(default)]
    lon: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MagnetometerQuery {
    #[serde(default)]
    station: Option<String>,
    #[serde(default)]
    minutes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageQuery {
    #[serde(default)]
    src: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheSummary {
    name: &'static str,
    entries: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    time: String,
    solar_wind_fetched_at: Option<String>,
    caches: Vec<CacheSummary>,
}

#[derive(Debug, Serialize)]
struct StationSummary {
    code: &'static str,
    name: &'static str,
    fmisid: u32,
}

pub fn router(state: AppState) -> Router {
    let static_dir = state.cfg.static_dir.clone();
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/solar-wind", get(get_solar_wind))
        .route("/api/kp", get(get_kp))
        .route("/api/radio-blackout", get(get_radio_blackout))
        .route("/api/weather", get(get_weather))
        .route("/api/magnetometer", get(get_magnetometer))
        .route("/api/magnetometer/{station}/day", get(get_magnetometer_day))
        .route("/api/ephemeris", get(get_ephemeris))
        .route("/api/radar", get(get_radar_tile))
        .route("/api/image", get(get_image))
        .route("/api/stations", get(get_stations))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

fn no_store_response<T: Serialize>(payload: &T) -> Response {
    let mut response = Json(payload).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn image_response(image: CachedImage, max_age: Duration) -> Response {
    let content_type = HeaderValue::from_str(&image.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let cache_control = HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs()))
        .unwrap_or_else(|_| HeaderValue::from_static("no-store"));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, cache_control),
        ],
        image.body,
    )
        .into_response()
}

async fn healthz(State(state): State<AppState>) -> Response {
    let caches = &state.caches;
    let solar_wind_fetched_at = caches
        .solar_wind
        .peek(solar_wind::CACHE_KEY)
        .await
        .and_then(|entry| chrono::DateTime::from_timestamp_millis(entry.fetched_at_ms))
        .map(iso_utc);
    let summary = vec![
        CacheSummary {
            name: "solarWind",
            entries: caches.solar_wind.len().await,
        },
        CacheSummary {
            name: "kp",
            entries: caches.kp.len().await,
        },
        CacheSummary {
            name: "magnetometer",
            entries: caches.magnetometer.len().await + caches.magnetometer_day.len().await,
        },
        CacheSummary {
            name: "weather",
            entries: caches.weather.len().await,
        },
        CacheSummary {
            name: "radarTiles",
            entries: caches.radar_tiles.len().await,
        },
    ];
    no_store_response(&HealthResponse {
        status: "ok",
        time: now_iso(),
        solar_wind_fetched_at,
        caches: summary,
    })
}

async fn get_solar_wind(State(state): State<AppState>) -> Response {
    no_store_response(solar_wind::load(&state).await.as_ref())
}

async fn get_kp(State(state): State<AppState>) -> Response {
    no_store_response(kp::load(&state).await.as_ref())
}

async fn get_radio_blackout(State(state): State<AppState>) -> Response {
    no_store_response(radio_blackout::load(&state).await.as_ref())
}

async fn get_weather(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<Response, ApiError> {
    let at = Coordinates::parse(query.lat.as_deref(), query.lon.as_deref())?;
    Ok(no_store_response(weather::load(&state, at).await.as_ref()))
}

async fn get_magnetometer(
    State(state): State<AppState>,
    Query(query): Query<MagnetometerQuery>,
) -> Response {
    let station = resolve_station(query.station.as_deref());
    let minutes = clamp_minutes(query.minutes.as_deref());
    no_store_response(magnetometer::load(&state, station, minutes).await.as_ref())
}

async fn get_magnetometer_day(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    let station = find_station(&code)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown magnetometer station: {code}")))?;
    Ok(no_store_response(
        magnetometer::load_day(&state, station).await.as_ref(),
    ))
}

async fn get_ephemeris(Query(query): Query<LocationQuery>) -> Result<Response, ApiError> {
    let at = Coordinates::parse(query.lat.as_deref(), query.lon.as_deref())?;
    let date = ephemeris::parse_date(query.date.as_deref())?;
    Ok(no_store_response(&ephemeris::compute(date, at.lat, at.lon)))
}

async fn get_radar_tile(
    State(state): State<AppState>,
    Query(query): Query<TileQuery>,
) -> Result<Response, ApiError> {
    let request = TileRequest::from_query(&query)?;
    let image = radar::load(&state, &request).await?;
    Ok(image_response(image, state.cfg.tile_ttl))
}

async fn get_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Result<Response, ApiError> {
    image_proxy::check_source(&state, query.src.as_deref())?;
    let image = image_proxy::load(&state).await?;
    Ok(image_response(image, state.cfg.realtime_ttl))
}

async fn get_stations(State(state): State<AppState>) -> Json<Vec<StationSummary>> {
    Json(
        STATIONS
            .iter()
            .map(|station| StationSummary {
                code: station.code,
                name: station.name,
                fmisid: state.cfg.fmisid(station),
            })
            .collect(),
    )
}

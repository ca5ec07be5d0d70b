use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::constants::{
    Station, DEFAULT_STATION, DEFAULT_WINDOW_MINUTES, FMI_MAGNETOMETER_STORED_QUERY,
    MAGNETOMETER_X_PARAMETER, MAGNETOMETER_Z_PARAMETER, MAX_WINDOW_MINUTES, MIN_WINDOW_MINUTES,
    STATIONS,
};
use crate::error::UpstreamError;
use crate::http_client::fetch_text;
use crate::magnetometer_text::parse_day_dump;
use crate::magnetometer_xml::parse_wfs_observations;
use crate::normalize::NormalizedRecord;
use crate::synthetic::{trailing_times, wave};
use crate::types::{AppState, DataSource};
use crate::utils::{clamp_i64, iso_utc, now_iso, parse_time_utc, round1};

#[derive(Clone, Debug, Serialize)]
pub struct StationInfo {
    pub code: &'static str,
    pub name: &'static str,
}

impl From<&Station> for StationInfo {
    fn from(station: &Station) -> Self {
        Self {
            code: station.code,
            name: station.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MagnetometerPoint {
    pub time: String,
    pub x: Option<f64>,
    pub z: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MagnetometerPayload {
    pub source: DataSource,
    pub station: StationInfo,
    pub minutes: i64,
    pub updated_at: String,
    pub series: Vec<MagnetometerPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MagnetometerDayPoint {
    pub time: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MagnetometerDayPayload {
    pub source: DataSource,
    pub station: StationInfo,
    pub updated_at: String,
    pub series: Vec<MagnetometerDayPoint>,
}

pub fn find_station(code: &str) -> Option<&'static Station> {
    let code = code.trim();
    STATIONS
        .iter()
        .find(|station| station.code.eq_ignore_ascii_case(code))
}

pub fn default_station() -> &'static Station {
    find_station(DEFAULT_STATION).unwrap_or(&STATIONS[0])
}

/// Unknown or missing codes fall back to the default station.
pub fn resolve_station(code: Option<&str>) -> &'static Station {
    code.and_then(find_station).unwrap_or_else(default_station)
}

pub fn clamp_minutes(raw: Option<&str>) -> i64 {
    let requested = raw
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .map(|value| value.round() as i64)
        .unwrap_or(DEFAULT_WINDOW_MINUTES);
    clamp_i64(requested, MIN_WINDOW_MINUTES, MAX_WINDOW_MINUTES)
}

pub fn cache_key(station: &Station, minutes: i64) -> String {
    format!("{}:{minutes}", station.code)
}

pub async fn load(
    state: &AppState,
    station: &'static Station,
    minutes: i64,
) -> Arc<MagnetometerPayload> {
    state
        .caches
        .magnetometer
        .get_or_fetch(&cache_key(station, minutes), || fetch(state, station, minutes))
        .await
}

pub async fn fetch(
    state: &AppState,
    station: &'static Station,
    minutes: i64,
) -> Arc<MagnetometerPayload> {
    let now = Utc::now();
    let result = async {
        let url = build_wfs_url(
            &state.cfg.upstreams.magnetometer_wfs_url,
            state.cfg.fmisid(station),
            now,
            minutes,
        )?;
        let xml = fetch_text(&state.http, &url, state.cfg.request_timeout).await?;
        let records = parse_wfs_observations(
            &xml,
            &[(MAGNETOMETER_X_PARAMETER, "x"), (MAGNETOMETER_Z_PARAMETER, "z")],
        )?;
        let series = window_series(&records, now, minutes);
        if series.is_empty() {
            return Err(UpstreamError::Malformed(format!(
                "no magnetometer samples for {} in the last {minutes} minutes",
                station.code
            )));
        }
        Ok(series)
    }
    .await;

    let (source, series) = match result {
        Ok(series) => (DataSource::Live, series),
        Err(reason) => {
            warn!("Magnetometer {} degraded to synthetic data: {reason}", station.code);
            (DataSource::Synthetic, synthetic_series(now, minutes))
        }
    };

    Arc::new(MagnetometerPayload {
        source,
        station: station.into(),
        minutes,
        updated_at: now_iso(),
        series,
    })
}

fn wfs_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn build_wfs_url(
    base_url: &str,
    fmisid: u32,
    now: DateTime<Utc>,
    minutes: i64,
) -> Result<String, UpstreamError> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|error| UpstreamError::Malformed(format!("invalid WFS url {base_url}: {error}")))?;
    url.query_pairs_mut()
        .append_pair("service", "WFS")
        .append_pair("version", "2.0.0")
        .append_pair("request", "getFeature")
        .append_pair("storedquery_id", FMI_MAGNETOMETER_STORED_QUERY)
        .append_pair("fmisid", &fmisid.to_string())
        .append_pair("starttime", &wfs_time(now - Duration::minutes(minutes)))
        .append_pair("endtime", &wfs_time(now));
    Ok(url.to_string())
}

pub fn window_series(
    records: &[NormalizedRecord],
    now: DateTime<Utc>,
    minutes: i64,
) -> Vec<MagnetometerPoint> {
    let start = now - Duration::minutes(minutes);
    let mut samples = records
        .iter()
        .filter_map(|record| {
            let time = parse_time_utc(&record.time_tag)?;
            (time >= start && time <= now).then_some((time, record))
        })
        .collect::<Vec<_>>();
    samples.sort_by_key(|(time, _)| *time);

    samples
        .into_iter()
        .map(|(time, record)| MagnetometerPoint {
            time: iso_utc(time),
            x: record.number("x").map(round1),
            z: record.number("z").map(round1),
        })
        .collect()
}

fn synthetic_series(now: DateTime<Utc>, minutes: i64) -> Vec<MagnetometerPoint> {
    let mut rng = rand::thread_rng();
    trailing_times(now, minutes.max(1) as usize, Duration::minutes(1))
        .into_iter()
        .enumerate()
        .map(|(step, time)| MagnetometerPoint {
            time: iso_utc(time),
            x: Some(round1(wave(&mut rng, step, 11_500.0, 25.0, 90.0, 4.0))),
            z: Some(round1(wave(&mut rng, step, 50_400.0, 10.0, 120.0, 2.0))),
        })
        .collect()
}

pub async fn load_day(
    state: &AppState,
    station: &'static Station,
) -> Arc<MagnetometerDayPayload> {
    state
        .caches
        .magnetometer_day
        .get_or_fetch(station.code, || fetch_day(state, station))
        .await
}

pub async fn fetch_day(
    state: &AppState,
    station: &'static Station,
) -> Arc<MagnetometerDayPayload> {
    let result = async {
        let url = state
            .cfg
            .upstreams
            .magnetometer_text_template
            .replace("{station}", &urlencoding::encode(station.code));
        let text = fetch_text(&state.http, &url, state.cfg.request_timeout).await?;
        let records = parse_day_dump(&text);
        if records.is_empty() {
            return Err(UpstreamError::Malformed(format!(
                "day dump for {} had no sample lines",
                station.code
            )));
        }
        Ok(day_series(&records))
    }
    .await;

    let (source, series) = match result {
        Ok(series) => (DataSource::Live, series),
        Err(reason) => {
            warn!("Magnetometer day dump {} degraded to synthetic data: {reason}", station.code);
            (DataSource::Synthetic, synthetic_day_series(Utc::now()))
        }
    };

    Arc::new(MagnetometerDayPayload {
        source,
        station: station.into(),
        updated_at: now_iso(),
        series,
    })
}

fn day_series(records: &[NormalizedRecord]) -> Vec<MagnetometerDayPoint> {
    records
        .iter()
        .map(|record| MagnetometerDayPoint {
            time: record.time_tag.clone(),
            x: record.number("x").map(round1),
            y: record.number("y").map(round1),
            z: record.number("z").map(round1),
        })
        .collect()
}

fn synthetic_day_series(now: DateTime<Utc>) -> Vec<MagnetometerDayPoint> {
    let mut rng = rand::thread_rng();
    trailing_times(now, 24 * 60, Duration::minutes(1))
        .into_iter()
        .enumerate()
        .map(|(step, time)| MagnetometerDayPoint {
            time: iso_utc(time),
            x: Some(round1(wave(&mut rng, step, 11_500.0, 40.0, 720.0, 4.0))),
            y: Some(round1(wave(&mut rng, step, 850.0, 15.0, 540.0, 2.0))),
            z: Some(round1(wave(&mut rng, step, 50_400.0, 12.0, 1440.0, 2.0))),
        })
        .collect()
}

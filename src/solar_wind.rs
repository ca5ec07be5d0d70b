use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::warn;

use crate::alignment::{
    align, AlignedPoint, AlignmentOptions, CurrentBasis, Feed, FieldSpec,
};
use crate::constants::{BT_KEYS, BZ_KEYS, DEFAULT_INSTRUMENT, DENSITY_KEYS, SOURCE_KEYS, SPEED_KEYS};
use crate::error::UpstreamError;
use crate::http_client::fetch_text;
use crate::synthetic::{trailing_times, wave};
use crate::tabular::parse_feed_text;
use crate::types::{AppState, DataSource};
use crate::utils::{iso_utc, now_iso, round1, round2};

pub const CACHE_KEY: &str = "solar-wind";

const FIELDS: [FieldSpec; 4] = [
    FieldSpec {
        feed: Feed::Primary,
        candidates: &SPEED_KEYS,
        decimals: 1,
    },
    FieldSpec {
        feed: Feed::Primary,
        candidates: &DENSITY_KEYS,
        decimals: 2,
    },
    FieldSpec {
        feed: Feed::Secondary,
        candidates: &BZ_KEYS,
        decimals: 1,
    },
    FieldSpec {
        feed: Feed::Secondary,
        candidates: &BT_KEYS,
        decimals: 1,
    },
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SolarWindPoint {
    pub time: String,
    pub speed: Option<f64>,
    pub density: Option<f64>,
    pub bz: Option<f64>,
    pub bt: Option<f64>,
}

impl From<AlignedPoint> for SolarWindPoint {
    fn from(point: AlignedPoint) -> Self {
        let value = |index: usize| point.values.get(index).copied().flatten();
        Self {
            speed: value(0),
            density: value(1),
            bz: value(2),
            bt: value(3),
            time: point.time,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolarWindPayload {
    pub source: DataSource,
    pub instrument: String,
    pub current_aligned: bool,
    pub updated_at: String,
    pub current: SolarWindPoint,
    pub series: Vec<SolarWindPoint>,
}

pub async fn load(state: &AppState) -> Arc<SolarWindPayload> {
    state
        .caches
        .solar_wind
        .get_or_fetch(CACHE_KEY, || fetch(state))
        .await
}

pub async fn fetch(state: &AppState) -> Arc<SolarWindPayload> {
    match fetch_live(state).await {
        Ok(payload) => Arc::new(payload),
        Err(reason) => {
            warn!("Solar wind degraded to synthetic data: {reason}");
            Arc::new(synthetic(state.cfg.chart_window))
        }
    }
}

async fn fetch_live(state: &AppState) -> Result<SolarWindPayload, UpstreamError> {
    let timeout = state.cfg.request_timeout;
    let upstreams = &state.cfg.upstreams;
    let (plasma, mag) = tokio::try_join!(
        fetch_text(&state.http, &upstreams.plasma_url, timeout),
        fetch_text(&state.http, &upstreams.mag_url, timeout),
    )?;

    build_payload(
        &plasma,
        &mag,
        state.cfg.chart_window,
        state.cfg.solar_wind_offset_minutes,
    )
}

pub fn build_payload(
    plasma_text: &str,
    mag_text: &str,
    window: usize,
    offset_minutes: i64,
) -> Result<SolarWindPayload, UpstreamError> {
    let plasma = parse_feed_text(plasma_text)?;
    let mag = parse_feed_text(mag_text)?;

    let aligned = align(
        &plasma,
        &mag,
        &FIELDS,
        &AlignmentOptions {
            window,
            offset_minutes,
            source_keys: &SOURCE_KEYS,
            default_source: DEFAULT_INSTRUMENT,
        },
    )?;

    Ok(SolarWindPayload {
        source: DataSource::Live,
        instrument: aligned.source,
        current_aligned: aligned.basis == CurrentBasis::Joined,
        updated_at: now_iso(),
        current: aligned.current.into(),
        series: aligned.series.into_iter().map(Into::into).collect(),
    })
}

pub fn synthetic(window: usize) -> SolarWindPayload {
    let mut rng = rand::thread_rng();
    let series = trailing_times(Utc::now(), window, Duration::minutes(1))
        .into_iter()
        .enumerate()
        .map(|(step, time)| SolarWindPoint {
            time: iso_utc(time),
            speed: Some(round1(wave(&mut rng, step, 420.0, 40.0, 45.0, 8.0).max(250.0))),
            density: Some(round2(wave(&mut rng, step, 5.0, 1.5, 30.0, 0.4).max(0.1))),
            bz: Some(round1(wave(&mut rng, step, -1.0, 4.0, 20.0, 1.0))),
            bt: Some(round1(wave(&mut rng, step, 6.0, 1.5, 25.0, 0.5).max(0.5))),
        })
        .collect::<Vec<_>>();

    let current = series.last().cloned().unwrap_or(SolarWindPoint {
        time: now_iso(),
        speed: None,
        density: None,
        bz: None,
        bt: None,
    });

    SolarWindPayload {
        source: DataSource::Synthetic,
        instrument: DEFAULT_INSTRUMENT.to_string(),
        current_aligned: true,
        updated_at: now_iso(),
        current,
        series,
    }
}

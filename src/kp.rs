use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::warn;

use crate::constants::{KP_KEYS, KP_LOOKBACK_ROWS};
use crate::error::UpstreamError;
use crate::http_client::fetch_text;
use crate::normalize::pick;
use crate::synthetic::trailing_times;
use crate::tabular::parse_feed_text;
use crate::types::{AppState, DataSource};
use crate::utils::{iso_utc, now_iso, parse_time_utc, round2};

pub const CACHE_KEY: &str = "kp";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KpPoint {
    pub time: String,
    pub kp: f64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpPayload {
    pub source: DataSource,
    pub updated_at: String,
    pub current: Option<KpPoint>,
    pub series: Vec<KpPoint>,
}

pub async fn load(state: &AppState) -> Arc<KpPayload> {
    state
        .caches
        .kp
        .get_or_fetch(CACHE_KEY, || fetch(state))
        .await
}

pub async fn fetch(state: &AppState) -> Arc<KpPayload> {
    let result = async {
        let text = fetch_text(
            &state.http,
            &state.cfg.upstreams.kp_url,
            state.cfg.request_timeout,
        )
        .await?;
        build_payload(&text)
    }
    .await;

    match result {
        Ok(payload) => Arc::new(payload),
        Err(reason) => {
            warn!("Kp degraded to synthetic data: {reason}");
            Arc::new(synthetic())
        }
    }
}

pub fn build_payload(text: &str) -> Result<KpPayload, UpstreamError> {
    let records = parse_feed_text(text)?;
    let mut rows = records
        .iter()
        .filter_map(|record| Some((parse_time_utc(&record.time_tag)?, record)))
        .collect::<Vec<_>>();
    rows.sort_by_key(|(time, _)| *time);

    // the lookback covers feed rows, so a row without a Kp value leaves a gap
    let skip = rows.len().saturating_sub(KP_LOOKBACK_ROWS);
    let series = rows
        .into_iter()
        .skip(skip)
        .filter_map(|(time, record)| {
            Some(KpPoint {
                time: iso_utc(time),
                kp: round2(pick(record, &KP_KEYS)?),
            })
        })
        .collect::<Vec<_>>();

    if series.is_empty() {
        return Err(UpstreamError::Malformed(
            "Kp feed contained no usable rows".to_string(),
        ));
    }

    Ok(KpPayload {
        source: DataSource::Live,
        updated_at: now_iso(),
        current: series.last().cloned(),
        series,
    })
}

pub fn synthetic() -> KpPayload {
    let mut rng = rand::thread_rng();
    let series = trailing_times(Utc::now(), KP_LOOKBACK_ROWS, Duration::hours(3))
        .into_iter()
        .map(|time| KpPoint {
            time: iso_utc(time),
            kp: round2(rng.gen_range(0.67..=4.33)),
        })
        .collect::<Vec<_>>();

    KpPayload {
        source: DataSource::Synthetic,
        updated_at: now_iso(),
        current: series.last().cloned(),
        series,
    }
}

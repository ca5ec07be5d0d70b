use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::constants::{
    DEFAULT_TILE_SIZE_PX, MAX_TILE_SIZE_PX, MIN_TILE_SIZE_PX, RADAR_LAYER_ALLOWLIST,
    WEB_MERCATOR_EXTENT, WMS_CRS, WMS_VERSION,
};
use crate::error::{ApiError, UpstreamError};
use crate::http_client::fetch_bytes;
use crate::types::{AppState, CachedImage};
use crate::utils::{clamp, to_finite_number};

static TIME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}(:\d{2}(\.\d{1,3})?)?Z?)?$")
        .inspect_err(|error| warn!("Radar time pattern failed to compile: {error}"))
        .ok()
});

/// Raw query as sent by map clients, which may use upper-case WMS names.
#[derive(Debug, Default, Deserialize)]
pub struct TileQuery {
    #[serde(default, alias = "LAYERS")]
    pub layers: Option<String>,
    #[serde(default, alias = "BBOX")]
    pub bbox: Option<String>,
    #[serde(default, alias = "STYLES")]
    pub styles: Option<String>,
    #[serde(default, alias = "TIME")]
    pub time: Option<String>,
    #[serde(default, alias = "WIDTH")]
    pub width: Option<String>,
    #[serde(default, alias = "HEIGHT")]
    pub height: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TileRequest {
    pub layers: Vec<&'static str>,
    pub bbox: [f64; 4],
    pub styles: String,
    pub time: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl TileRequest {
    pub fn from_query(query: &TileQuery) -> Result<Self, ApiError> {
        Ok(Self {
            layers: parse_layers(query.layers.as_deref())?,
            bbox: parse_bbox(query.bbox.as_deref())?,
            styles: parse_styles(query.styles.as_deref())?,
            time: parse_time(query.time.as_deref())?,
            width: tile_size(query.width.as_deref()),
            height: tile_size(query.height.as_deref()),
        })
    }

    pub fn cache_key(&self) -> String {
        let [min_x, min_y, max_x, max_y] = self.bbox;
        format!(
            "{}|{min_x},{min_y},{max_x},{max_y}|{}|{}|{}x{}",
            self.layers.join(","),
            self.styles,
            self.time.as_deref().unwrap_or(""),
            self.width,
            self.height
        )
    }

    pub fn upstream_url(&self, base: &str) -> Result<String, UpstreamError> {
        let mut url = reqwest::Url::parse(base)
            .map_err(|error| UpstreamError::Malformed(format!("invalid radar url: {error}")))?;
        let [min_x, min_y, max_x, max_y] = self.bbox;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("SERVICE", "WMS")
                .append_pair("VERSION", WMS_VERSION)
                .append_pair("REQUEST", "GetMap")
                .append_pair("LAYERS", &self.layers.join(","))
                .append_pair("STYLES", &self.styles)
                .append_pair("CRS", WMS_CRS)
                .append_pair("BBOX", &format!("{min_x},{min_y},{max_x},{max_y}"))
                .append_pair("WIDTH", &self.width.to_string())
                .append_pair("HEIGHT", &self.height.to_string())
                .append_pair("FORMAT", "image/png")
                .append_pair("TRANSPARENT", "TRUE");
            if let Some(time) = self.time.as_deref() {
                pairs.append_pair("TIME", time);
            }
        }
        Ok(url.into())
    }
}

fn parse_layers(raw: Option<&str>) -> Result<Vec<&'static str>, ApiError> {
    let mut layers = Vec::new();
    for requested in raw.unwrap_or_default().split(',').map(str::trim) {
        if let Some(allowed) = RADAR_LAYER_ALLOWLIST
            .iter()
            .find(|candidate| **candidate == requested)
        {
            if !layers.contains(allowed) {
                layers.push(*allowed);
            }
        }
    }
    if layers.is_empty() {
        return Err(ApiError::BadRequest(
            "No supported radar layers requested.".to_string(),
        ));
    }
    Ok(layers)
}

fn parse_bbox(raw: Option<&str>) -> Result<[f64; 4], ApiError> {
    let invalid = || {
        ApiError::BadRequest(
            "Invalid bbox. Expected minx,miny,maxx,maxy in EPSG:3857 metres.".to_string(),
        )
    };
    let values = raw
        .unwrap_or_default()
        .split(',')
        .map(|part| to_finite_number(Some(part)))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(invalid)?;
    let bbox: [f64; 4] = values.try_into().map_err(|_| invalid())?;
    let bbox = bbox.map(|value| clamp(value, -WEB_MERCATOR_EXTENT, WEB_MERCATOR_EXTENT));
    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
        return Err(invalid());
    }
    Ok(bbox)
}

fn parse_styles(raw: Option<&str>) -> Result<String, ApiError> {
    let styles = raw.map(str::trim).unwrap_or_default();
    let valid = styles.split(',').all(|style| {
        style
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | ':'))
    });
    if !valid {
        return Err(ApiError::BadRequest("Invalid styles parameter.".to_string()));
    }
    Ok(styles.to_string())
}

fn parse_time(raw: Option<&str>) -> Result<Option<String>, ApiError> {
    let Some(time) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    let matches = TIME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(time));
    if !matches {
        return Err(ApiError::BadRequest(
            "Invalid time parameter. Expected an ISO-8601 UTC timestamp.".to_string(),
        ));
    }
    Ok(Some(time.to_string()))
}

fn tile_size(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_TILE_SIZE_PX)
        .clamp(MIN_TILE_SIZE_PX, MAX_TILE_SIZE_PX)
}

pub async fn load(state: &AppState, request: &TileRequest) -> Result<CachedImage, UpstreamError> {
    state
        .caches
        .radar_tiles
        .try_get_or_fetch(&request.cache_key(), || fetch(state, request))
        .await
        .inspect_err(|error| warn!("Radar tile proxy failed: {error}"))
}

async fn fetch(state: &AppState, request: &TileRequest) -> Result<CachedImage, UpstreamError> {
    let url = request.upstream_url(&state.cfg.upstreams.radar_wms_url)?;
    let fetched = fetch_bytes(&state.http, &url, state.cfg.request_timeout).await?;
    let content_type = fetched.content_type.unwrap_or_default();
    // WMS servers report errors as 200 with an XML service exception body
    if !content_type.to_ascii_lowercase().starts_with("image/") {
        return Err(UpstreamError::Malformed(format!(
            "radar tile had content type {:?}",
            content_type
        )));
    }
    Ok(CachedImage {
        content_type,
        body: fetched.body,
    })
}

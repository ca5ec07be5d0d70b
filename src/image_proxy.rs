use tracing::warn;

use crate::error::{ApiError, UpstreamError};
use crate::http_client::fetch_bytes;
use crate::types::{AppState, CachedImage};

pub const CACHE_KEY: &str = "image";

pub fn check_source(state: &AppState, src: Option<&str>) -> Result<(), ApiError> {
    match src.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) if value != state.cfg.upstreams.proxied_image_url => Err(
            ApiError::BadRequest("Requested image is not on the proxy allowlist.".to_string()),
        ),
        _ => Ok(()),
    }
}

pub async fn load(state: &AppState) -> Result<CachedImage, UpstreamError> {
    state
        .caches
        .image
        .try_get_or_fetch(CACHE_KEY, || fetch(state))
        .await
        .inspect_err(|error| warn!("Image proxy failed: {error}"))
}

async fn fetch(state: &AppState) -> Result<CachedImage, UpstreamError> {
    let url = &state.cfg.upstreams.proxied_image_url;
    let fetched = fetch_bytes(&state.http, url, state.cfg.request_timeout).await?;
    if fetched.body.is_empty() {
        return Err(UpstreamError::Malformed(format!("{url}: empty image body")));
    }
    Ok(CachedImage {
        content_type: fetched
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        body: fetched.body,
    })
}

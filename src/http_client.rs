use std::time::Duration;

use axum::body::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::UpstreamError;

pub struct FetchedBytes {
    pub content_type: Option<String>,
    pub body: Bytes,
}

async fn send(
    http: &Client,
    url: &str,
    timeout: Duration,
) -> Result<reqwest::Response, UpstreamError> {
    let response = http
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|error| UpstreamError::from_reqwest(url, error))?;

    if !response.status().is_success() {
        return Err(UpstreamError::Status {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }

    Ok(response)
}

pub async fn fetch_text(
    http: &Client,
    url: &str,
    timeout: Duration,
) -> Result<String, UpstreamError> {
    send(http, url, timeout)
        .await?
        .text()
        .await
        .map_err(|error| UpstreamError::from_reqwest(url, error))
}

pub async fn fetch_json<T: DeserializeOwned>(
    http: &Client,
    url: &str,
    timeout: Duration,
) -> Result<T, UpstreamError> {
    let text = fetch_text(http, url, timeout).await?;
    serde_json::from_str(&text).map_err(|error| UpstreamError::Malformed(format!("{url}: {error}")))
}

pub async fn fetch_bytes(
    http: &Client,
    url: &str,
    timeout: Duration,
) -> Result<FetchedBytes, UpstreamError> {
    let response = send(http, url, timeout).await?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = response
        .bytes()
        .await
        .map_err(|error| UpstreamError::from_reqwest(url, error))?;
    Ok(FetchedBytes { content_type, body })
}

//! Shared HTTP plumbing for the network adapters.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::UpstreamMeter;
use crate::errors::AdapterError;

/// Transport-level timeout. The engine applies its own, shorter bound on top.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Charge the meter, send a request and classify transport and status failures.
pub(crate) async fn send(
    meter: &UpstreamMeter,
    request: RequestBuilder,
) -> Result<Response, AdapterError> {
    let provider = meter.provider_id();
    meter.acquire()?;

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            AdapterError::timeout(provider)
        } else {
            AdapterError::server_error(provider, format!("Request failed: {}", e))
        }
    })?;

    let status = response.status();
    debug!("{} responded with {}", provider, status);

    if status.is_success() {
        return Ok(response);
    }

    Err(classify_status(
        provider,
        status,
        retry_after(&response),
    ))
}

/// Send a request and decode its JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    meter: &UpstreamMeter,
    request: RequestBuilder,
) -> Result<T, AdapterError> {
    let provider = meter.provider_id();
    let response = send(meter, request).await?;
    let body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            AdapterError::timeout(provider)
        } else {
            AdapterError::server_error(provider, format!("Failed to read body: {}", e))
        }
    })?;
    decode(provider, &body)
}

pub(crate) fn decode<T: DeserializeOwned>(provider: &str, body: &str) -> Result<T, AdapterError> {
    serde_json::from_str(body)
        .map_err(|e| AdapterError::malformed(provider, format!("Failed to parse response: {}", e)))
}

pub(crate) fn classify_status(
    provider: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
) -> AdapterError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AdapterError::unauthorized(provider, "Invalid or missing API key")
        }
        StatusCode::TOO_MANY_REQUESTS => AdapterError::rate_limited(provider, retry_after),
        s if s.is_server_error() => {
            AdapterError::server_error(provider, format!("Upstream returned {}", s))
        }
        s => AdapterError::malformed(provider, format!("Unexpected status {}", s)),
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Parse a decimal that upstreams send either as a JSON string or number.
pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

pub(crate) fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::try_from(value).ok()
}

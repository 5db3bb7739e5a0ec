//! Twelve Data provider.
//!
//! Uses the `/quote` endpoint with a comma-separated batch of pairs.
//! A single-symbol request answers with one quote object; a batch answers
//! with an object keyed by symbol. Errors come back in the body with HTTP 200:
//! `{"code": 429, "message": "...", "status": "error"}`.
//!
//! API documentation: https://twelvedata.com/docs#quote

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::http;
use crate::errors::AdapterError;
use crate::models::{NormalizedQuote, RequestParams};
use crate::provider::{QuoteAdapter, UpstreamMeter};
use crate::registry::ProviderDescriptor;

const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";
const ADAPTER_NAME: &str = "twelve_data";

/// One quote object from /quote
#[derive(Debug, Deserialize)]
struct QuoteItem {
    symbol: String,
    /// Last price, sent as a string
    close: Option<String>,
    change: Option<String>,
    percent_change: Option<String>,
    /// Unix seconds of the last bar
    timestamp: Option<i64>,
}

/// In-body error object
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    message: Option<String>,
}

pub struct TwelveDataAdapter {
    client: Client,
}

impl TwelveDataAdapter {
    pub fn new() -> Self {
        Self {
            client: http::build_client(),
        }
    }

    fn is_error(value: &Value) -> bool {
        value.get("status").and_then(Value::as_str) == Some("error")
    }

    /// Classify an in-body error by its code.
    fn classify_error(provider_id: &str, value: &Value) -> AdapterError {
        let body: ErrorBody = serde_json::from_value(value.clone()).unwrap_or_default();
        let message = body.message.unwrap_or_else(|| "unknown error".to_string());
        match body.code {
            Some(401) | Some(403) => AdapterError::unauthorized(provider_id, message),
            Some(429) => AdapterError::rate_limited(provider_id, None),
            Some(code) if code >= 500 => AdapterError::server_error(provider_id, message),
            _ => AdapterError::malformed(provider_id, message),
        }
    }

    fn map_item(provider_id: &str, value: &Value) -> Option<NormalizedQuote> {
        if Self::is_error(value) {
            return None;
        }
        let item: QuoteItem = serde_json::from_value(value.clone()).ok()?;
        let price = http::parse_decimal(item.close.as_deref()?)?;
        let as_of: DateTime<Utc> = item
            .timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);

        Some(
            NormalizedQuote::new(&item.symbol, price, as_of, provider_id).with_change(
                item.change.as_deref().and_then(http::parse_decimal),
                item.percent_change.as_deref().and_then(http::parse_decimal),
            ),
        )
    }

    /// Map a /quote body for the requested symbols.
    fn map_body(
        provider_id: &str,
        body: &Value,
        params: &RequestParams,
    ) -> Result<Vec<NormalizedQuote>, AdapterError> {
        if Self::is_error(body) {
            return Err(Self::classify_error(provider_id, body));
        }

        if params.symbols.len() == 1 {
            return Ok(Self::map_item(provider_id, body).into_iter().collect());
        }

        let object = body.as_object().ok_or_else(|| {
            AdapterError::malformed(provider_id, "Expected an object keyed by symbol")
        })?;

        Ok(params
            .symbols
            .iter()
            .filter_map(|symbol| object.get(symbol))
            .filter_map(|value| Self::map_item(provider_id, value))
            .collect())
    }
}

impl Default for TwelveDataAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteAdapter for TwelveDataAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn requires_credential(&self) -> bool {
        true
    }

    async fn adapt(
        &self,
        provider: &ProviderDescriptor,
        _role: &str,
        params: &RequestParams,
        meter: &UpstreamMeter,
    ) -> Result<Vec<NormalizedQuote>, AdapterError> {
        let provider_id = provider.id.as_ref();
        let api_key = provider.require_credential()?;
        let base_url = provider.endpoint.as_deref().unwrap_or(DEFAULT_BASE_URL);

        if params.symbols.is_empty() {
            return Ok(Vec::new());
        }

        let symbols = params.symbols.join(",");
        debug!("Twelve Data request for {}", symbols);

        let request = self
            .client
            .get(format!("{}/quote", base_url.trim_end_matches('/')))
            .query(&[("symbol", symbols.as_str()), ("apikey", api_key.as_str())]);

        let body: Value = http::get_json(meter, request).await?;
        Self::map_body(provider_id, &body, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AdapterErrorKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_single_symbol_body() {
        let body: Value = serde_json::from_str(
            r#"{"symbol":"EUR/USD","close":"1.08450","change":"0.00120","percent_change":"0.11","timestamp":1705312800}"#,
        )
        .unwrap();
        let quotes =
            TwelveDataAdapter::map_body("twelve_data", &body, &RequestParams::new(["EURUSD"]))
                .unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].value, dec!(1.0845));
        assert_eq!(quotes[0].change, Some(dec!(0.0012)));
        assert_eq!(quotes[0].change_percent, Some(dec!(0.11)));
        assert_eq!(quotes[0].as_of.timestamp(), 1705312800);
    }

    #[test]
    fn test_batch_body_omits_failed_items() {
        let body: Value = serde_json::from_str(
            r#"{
                "EUR/USD": {"symbol":"EUR/USD","close":"1.0845"},
                "GBP/USD": {"code":400,"message":"symbol not found","status":"error"},
                "USD/JPY": {"symbol":"USD/JPY","close":"n/a"}
            }"#,
        )
        .unwrap();
        let params = RequestParams::new(["EUR/USD", "GBP/USD", "USD/JPY"]);
        let quotes = TwelveDataAdapter::map_body("twelve_data", &body, &params).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "EUR/USD");
    }

    #[test]
    fn test_in_body_errors_are_classified() {
        let params = RequestParams::new(["EUR/USD", "GBP/USD"]);
        let cases = [
            (429, AdapterErrorKind::RateLimited),
            (401, AdapterErrorKind::Unauthorized),
            (500, AdapterErrorKind::ServerError),
            (400, AdapterErrorKind::Malformed),
        ];
        for (code, kind) in cases {
            let body = serde_json::json!({"code": code, "message": "x", "status": "error"});
            let err = TwelveDataAdapter::map_body("twelve_data", &body, &params).unwrap_err();
            assert_eq!(err.kind, kind, "code {}", code);
        }
    }
}

//! Alpha Vantage provider.
//!
//! Uses `function=CURRENCY_EXCHANGE_RATE`, one request per pair. The free tier
//! allows 25 calls per day, so this provider is usually configured with a tight
//! budget. Quota exhaustion is reported in the body with HTTP 200 as a `Note`
//! or `Information` field rather than a 429.
//!
//! API documentation: https://www.alphavantage.co/documentation/#fx

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::http;
use crate::errors::AdapterError;
use crate::models::{NormalizedQuote, RequestParams};
use crate::provider::{QuoteAdapter, UpstreamMeter};
use crate::registry::ProviderDescriptor;
use crate::symbol::split_pair;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
const ADAPTER_NAME: &str = "alpha_vantage";

#[derive(Debug, Deserialize)]
struct ExchangeRate {
    #[serde(rename = "1. From_Currency Code")]
    from: String,
    #[serde(rename = "3. To_Currency Code")]
    to: String,
    #[serde(rename = "5. Exchange Rate")]
    rate: String,
    #[serde(rename = "6. Last Refreshed")]
    last_refreshed: Option<String>,
    #[serde(rename = "8. Bid Price")]
    bid: Option<String>,
    #[serde(rename = "9. Ask Price")]
    ask: Option<String>,
}

pub struct AlphaVantageAdapter {
    client: Client,
}

impl AlphaVantageAdapter {
    pub fn new() -> Self {
        Self {
            client: http::build_client(),
        }
    }

    /// Map one response body. `Ok(None)` means the pair is unknown upstream and
    /// should be omitted; `Err` aborts the whole call.
    fn map_body(provider_id: &str, body: &Value) -> Result<Option<NormalizedQuote>, AdapterError> {
        if body.get("Note").is_some() || body.get("Information").is_some() {
            return Err(AdapterError::rate_limited(provider_id, None));
        }
        if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
            debug!("Alpha Vantage rejected pair: {}", message);
            return Ok(None);
        }

        let payload = body.get("Realtime Currency Exchange Rate").ok_or_else(|| {
            AdapterError::malformed(provider_id, "Missing 'Realtime Currency Exchange Rate'")
        })?;
        let rate: ExchangeRate = serde_json::from_value(payload.clone())
            .map_err(|e| AdapterError::malformed(provider_id, e.to_string()))?;

        let Some(value) = http::parse_decimal(&rate.rate) else {
            return Ok(None);
        };

        let as_of = rate
            .last_refreshed
            .as_deref()
            .and_then(Self::parse_timestamp)
            .unwrap_or_else(Utc::now);

        Ok(Some(
            NormalizedQuote::new(&format!("{}/{}", rate.from, rate.to), value, as_of, provider_id)
                .with_bid_ask(
                    rate.bid.as_deref().and_then(http::parse_decimal),
                    rate.ask.as_deref().and_then(http::parse_decimal),
                ),
        ))
    }

    /// "Last Refreshed" is reported in UTC as `YYYY-MM-DD HH:MM:SS`.
    fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|dt| dt.and_utc())
    }
}

impl Default for AlphaVantageAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteAdapter for AlphaVantageAdapter {
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
        let url = format!("{}/query", base_url.trim_end_matches('/'));

        let mut quotes = Vec::with_capacity(params.symbols.len());
        for symbol in &params.symbols {
            let (from, Some(to)) = split_pair(symbol) else {
                debug!("Alpha Vantage: skipping non-pair symbol {}", symbol);
                continue;
            };

            let request = self.client.get(&url).query(&[
                ("function", "CURRENCY_EXCHANGE_RATE"),
                ("from_currency", from.as_str()),
                ("to_currency", to.as_str()),
                ("apikey", api_key.as_str()),
            ]);

            let body: Value = match http::get_json(meter, request).await {
                Ok(body) => body,
                // Quota and auth failures will not improve for the next pair.
                Err(e) if quotes.is_empty() => return Err(e),
                Err(e) => {
                    warn!("Alpha Vantage stopped after partial result: {}", e);
                    break;
                }
            };

            match Self::map_body(provider_id, &body) {
                Ok(Some(quote)) => quotes.push(quote),
                Ok(None) => {}
                Err(e) if quotes.is_empty() => return Err(e),
                Err(e) => {
                    warn!("Alpha Vantage stopped after partial result: {}", e);
                    break;
                }
            }
        }

        Ok(quotes)
    }
}

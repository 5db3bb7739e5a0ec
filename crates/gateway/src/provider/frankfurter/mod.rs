//! Frankfurter provider (ECB reference rates).
//!
//! Free, keyless API publishing one reference rate per working day.
//! One request is made per base currency:
//! `GET /latest?from=EUR&to=USD,GBP`.
//!
//! API documentation: https://www.frankfurter.app/docs/

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::http;
use crate::errors::AdapterError;
use crate::models::{NormalizedQuote, RequestParams};
use crate::provider::{QuoteAdapter, UpstreamMeter};
use crate::registry::ProviderDescriptor;
use crate::symbol::split_pair;

const DEFAULT_BASE_URL: &str = "https://api.frankfurter.app";
const ADAPTER_NAME: &str = "frankfurter";

/// Response from /latest
#[derive(Debug, Deserialize)]
struct LatestResponse {
    /// Base currency echoed back
    base: String,
    /// Publication date (YYYY-MM-DD)
    date: String,
    /// Quote currency -> rate
    rates: HashMap<String, f64>,
}

pub struct FrankfurterAdapter {
    client: Client,
}

impl FrankfurterAdapter {
    pub fn new() -> Self {
        Self {
            client: http::build_client(),
        }
    }

    /// Group pair symbols by base currency, keeping a stable order.
    fn group_by_base(params: &RequestParams) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for symbol in &params.symbols {
            if let (base, Some(quote)) = split_pair(symbol) {
                let quotes = groups.entry(base).or_default();
                if !quotes.contains(&quote) {
                    quotes.push(quote);
                }
            }
        }
        groups
    }

    /// Map one /latest response into quotes for the requested currencies.
    fn map_response(
        provider_id: &str,
        response: &LatestResponse,
        wanted: &[String],
    ) -> Vec<NormalizedQuote> {
        let as_of = Self::publication_time(&response.date);
        wanted
            .iter()
            .filter_map(|quote| {
                let rate = response.rates.get(quote)?;
                let value = http::decimal_from_f64(*rate)?;
                Some(NormalizedQuote::new(
                    &format!("{}/{}", response.base, quote),
                    value,
                    as_of,
                    provider_id,
                ))
            })
            .collect()
    }

    fn publication_time(date: &str) -> DateTime<Utc> {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or_else(|_| Utc::now())
    }
}

impl Default for FrankfurterAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteAdapter for FrankfurterAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    async fn adapt(
        &self,
        provider: &ProviderDescriptor,
        _role: &str,
        params: &RequestParams,
        meter: &UpstreamMeter,
    ) -> Result<Vec<NormalizedQuote>, AdapterError> {
        let provider_id = provider.id.as_ref();
        let base_url = provider.endpoint.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let groups = Self::group_by_base(params);

        let mut quotes = Vec::with_capacity(params.symbols.len());
        let mut last_error: Option<AdapterError> = None;

        for (base, wanted) in &groups {
            let request = self
                .client
                .get(format!("{}/latest", base_url.trim_end_matches('/')))
                .query(&[("from", base.as_str()), ("to", wanted.join(",").as_str())]);

            match http::get_json::<LatestResponse>(meter, request).await {
                Ok(response) => {
                    let mapped = Self::map_response(provider_id, &response, wanted);
                    debug!(
                        "Frankfurter: {} of {} rates for base {}",
                        mapped.len(),
                        wanted.len(),
                        base
                    );
                    quotes.extend(mapped);
                }
                Err(e) => {
                    warn!("Frankfurter request for base {} failed: {}", base, e);
                    last_error = Some(e);
                    if meter.refused() {
                        break;
                    }
                }
            }
        }

        match (quotes.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(quotes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_group_by_base() {
        let params = RequestParams::new(["EURUSD", "eur-gbp", "USD/JPY", "BTC", "EUR/USD"]);
        let groups = FrankfurterAdapter::group_by_base(&params);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["EUR"], vec!["USD", "GBP"]);
        assert_eq!(groups["USD"], vec!["JPY"]);
    }

    #[test]
    fn test_map_response_omits_missing_rates() {
        let body = r#"{"amount":1.0,"base":"EUR","date":"2024-01-15","rates":{"USD":1.0945}}"#;
        let response: LatestResponse = http::decode("frankfurter", body).unwrap();
        let quotes = FrankfurterAdapter::map_response(
            "frankfurter",
            &response,
            &["USD".to_string(), "GBP".to_string()],
        );
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "EUR/USD");
        assert_eq!(quotes[0].value, dec!(1.0945));
        assert_eq!(quotes[0].as_of.to_rfc3339(), "2024-01-15T00:00:00+00:00");
        assert_eq!(quotes[0].source, "frankfurter");
    }

    #[test]
    fn test_malformed_body() {
        let result: Result<LatestResponse, _> = http::decode("frankfurter", "<html>");
        assert_eq!(
            result.unwrap_err().kind,
            crate::errors::AdapterErrorKind::Malformed
        );
    }
}

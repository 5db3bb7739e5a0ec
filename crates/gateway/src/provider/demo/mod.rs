//! Synthetic demo provider.
//!
//! Produces deterministic quotes without touching the network. It is the
//! gateway's safety net: it cannot fail, so a caller always gets an answer,
//! tagged `demo` so it can be shown as non-authoritative.
//!
//! Values come from a small table of reference levels for common pairs; any
//! other symbol gets a stable value derived from a hash of its name.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::errors::AdapterError;
use crate::models::{NormalizedQuote, RequestParams};
use crate::provider::{QuoteAdapter, UpstreamMeter};
use crate::registry::ProviderDescriptor;

const ADAPTER_NAME: &str = "demo";

/// Reference levels as (symbol, mantissa, scale).
const REFERENCE_LEVELS: &[(&str, i64, u32)] = &[
    ("EUR/USD", 10850, 4),
    ("GBP/USD", 12650, 4),
    ("USD/JPY", 15120, 2),
    ("USD/CHF", 9050, 4),
    ("AUD/USD", 6550, 4),
    ("USD/CAD", 13600, 4),
    ("EUR/GBP", 8580, 4),
    ("XAU/USD", 235000, 2),
    ("BTC/USD", 6400000, 2),
];

pub struct DemoAdapter;

impl DemoAdapter {
    pub fn new() -> Self {
        Self
    }

    /// FNV-1a, stable across platforms and releases.
    fn fingerprint(symbol: &str) -> u64 {
        symbol.bytes().fold(0xcbf29ce484222325, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x100000001b3)
        })
    }

    /// Deterministic value for a symbol.
    pub fn value_for(symbol: &str) -> Decimal {
        REFERENCE_LEVELS
            .iter()
            .find(|(s, _, _)| *s == symbol)
            .map(|(_, mantissa, scale)| Decimal::new(*mantissa, *scale))
            .unwrap_or_else(|| {
                // 0.5000 ..= 2.4999
                let bucket = (Self::fingerprint(symbol) % 20_000) as i64;
                Decimal::new(5_000 + bucket, 4)
            })
    }

    /// Deterministic percent change in -0.50 ..= 0.49.
    fn change_percent_for(symbol: &str) -> Decimal {
        let bucket = (Self::fingerprint(symbol).rotate_left(17) % 100) as i64;
        Decimal::new(bucket - 50, 2)
    }

    fn quote_for(symbol: &str, source: &str) -> NormalizedQuote {
        let value = Self::value_for(symbol);
        let change_percent = Self::change_percent_for(symbol);
        let change = (value * change_percent / Decimal::ONE_HUNDRED).round_dp(6);
        NormalizedQuote::new(symbol, value, Utc::now(), source)
            .with_change(Some(change), Some(change_percent))
    }
}

impl Default for DemoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteAdapter for DemoAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    async fn adapt(
        &self,
        provider: &ProviderDescriptor,
        _role: &str,
        params: &RequestParams,
        _meter: &UpstreamMeter,
    ) -> Result<Vec<NormalizedQuote>, AdapterError> {
        Ok(params
            .symbols
            .iter()
            .map(|symbol| Self::quote_for(symbol, provider.id.as_ref()))
            .collect())
    }
}

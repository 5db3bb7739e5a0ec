use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::symbol::split_pair;

/// One normalized data point.
///
/// Adapters either build a complete quote or omit the item; there is no
/// placeholder value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedQuote {
    /// Canonical identifier (e.g. "EUR/USD")
    pub symbol: String,

    /// Base (or subject) part of the identifier
    pub base: String,

    /// Quote part of the identifier, absent for single-subject identifiers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,

    /// Mid/last value
    pub value: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,

    /// Absolute change versus the previous close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,

    /// Percent change versus the previous close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,

    /// Timestamp reported by the provider (or fetch time when it reports none)
    pub as_of: DateTime<Utc>,

    /// Provider id that produced the value
    pub source: String,
}

impl NormalizedQuote {
    /// Create a quote with the required fields. The symbol is normalized here so
    /// every adapter produces the same identity.
    pub fn new(
        symbol: &str,
        value: Decimal,
        as_of: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        let (base, quote) = split_pair(symbol);
        let symbol = match &quote {
            Some(quote) => format!("{}/{}", base, quote),
            None => base.clone(),
        };
        Self {
            symbol,
            base,
            quote,
            value,
            bid: None,
            ask: None,
            change: None,
            change_percent: None,
            as_of,
            source: source.into(),
        }
    }

    pub fn with_bid_ask(mut self, bid: Option<Decimal>, ask: Option<Decimal>) -> Self {
        self.bid = bid;
        self.ask = ask;
        self
    }

    pub fn with_change(mut self, change: Option<Decimal>, change_percent: Option<Decimal>) -> Self {
        self.change = change;
        self.change_percent = change_percent;
        self
    }
}

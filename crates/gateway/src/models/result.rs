use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quote::NormalizedQuote;

/// How a result was obtained.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Served by a provider call made for this request.
    Live,
    /// Served from the response cache.
    Cached,
    /// Served by a non-primary provider under a `fallback` degradation policy.
    Fallback,
    /// Synthetic data from the safety net. Non-authoritative.
    Demo,
    /// The gateway was unreachable and the client called a provider itself.
    Direct,
}

impl Mode {
    /// Whether results in this mode may be written to the cache.
    pub fn is_cacheable(self) -> bool {
        matches!(self, Self::Live | Self::Fallback)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Cached => write!(f, "cached"),
            Self::Fallback => write!(f, "fallback"),
            Self::Demo => write!(f, "demo"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// The answer returned to callers of the gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub role: String,
    /// Provider the role policy prefers.
    pub primary_provider: String,
    /// Provider that actually answered.
    pub source_provider: String,
    pub mode: Mode,
    pub as_of: DateTime<Utc>,
    pub data: Vec<NormalizedQuote>,
}

impl ResolutionResult {
    /// The same payload re-tagged as served from cache.
    pub fn as_cached(&self) -> Self {
        Self {
            mode: Mode::Cached,
            ..self.clone()
        }
    }
}

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Classification of a failed upstream call.
///
/// Every kind is recovered the same way by the resolution engine (advance to the
/// next chain member). The kind exists for diagnostics and for counting upstream
/// rate-limit responses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterErrorKind {
    /// Missing or rejected credential.
    Unauthorized,
    /// Upstream answered 429 or an equivalent in-body quota message.
    RateLimited,
    /// Upstream 5xx or transport failure.
    ServerError,
    /// Response could not be decoded or produced no usable quote.
    Malformed,
    /// The call exceeded its time bound.
    Timeout,
}

impl fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::RateLimited => write!(f, "rate-limited"),
            Self::ServerError => write!(f, "server-error"),
            Self::Malformed => write!(f, "malformed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// A classified failure from one adapter invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub provider: String,
    pub message: String,
    /// Upstream `Retry-After` hint, when the provider sent one.
    pub retry_after: Option<Duration>,
}

impl AdapterError {
    pub fn new(
        kind: AdapterErrorKind,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn unauthorized(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Unauthorized, provider, message)
    }

    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(AdapterErrorKind::RateLimited, provider, "upstream quota exceeded")
        }
    }

    /// The local budget guard refused the request. No upstream traffic happened.
    pub fn budget_exhausted(provider: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::RateLimited, provider, "call budget exhausted")
    }

    pub fn server_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::ServerError, provider, message)
    }

    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Malformed, provider, message)
    }

    pub fn timeout(provider: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Timeout, provider, "upstream call timed out")
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == AdapterErrorKind::RateLimited
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.provider, self.kind, self.message)
    }
}

impl std::error::Error for AdapterError {}

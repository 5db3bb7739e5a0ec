//! Error types for the gateway crate.
//!
//! This module provides:
//! - [`ConfigError`]: fatal configuration problems found while loading documents
//! - [`AdapterError`]: a classified failure from a single upstream call
//! - [`GatewayError`]: what a caller of the resolution engine can receive

mod adapter;

pub use adapter::{AdapterError, AdapterErrorKind};

use thiserror::Error;

/// Errors raised while loading the provider registry and role policy documents.
///
/// These are startup-only. A gateway that loaded successfully never produces one
/// during request handling.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration document could not be parsed.
    #[error("Malformed {document} document: {message}")]
    Parse {
        /// Which document failed ("providers" or "roles")
        document: &'static str,
        /// The parser message
        message: String,
    },

    /// A configuration document could not be read from disk.
    #[error("Cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Duplicate provider id: {0}")]
    DuplicateProvider(String),

    #[error("Duplicate role: {0}")]
    DuplicateRole(String),

    /// A provider binds to an adapter that is not registered.
    #[error("Provider '{provider}' references unknown adapter '{adapter}'")]
    UnknownAdapter { provider: String, adapter: String },

    /// A provider binds to an adapter that needs a credential but declares none.
    #[error("Provider '{provider}' uses adapter '{adapter}', which requires an auth credential")]
    MissingCredential { provider: String, adapter: String },

    /// A role policy (or the safety net) references a provider that does not exist.
    #[error("Role '{role}' references unknown provider '{provider}'")]
    UnknownProvider { role: String, provider: String },

    /// A role policy lists a provider that does not declare the role.
    #[error("Provider '{provider}' does not declare capability for role '{role}'")]
    MissingCapability { role: String, provider: String },

    /// The designated safety net is missing or is not a synthetic provider.
    #[error("Invalid safety net '{provider}': {reason}")]
    InvalidSafetyNet { provider: String, reason: String },

    /// Budget thresholds must satisfy `0 < warn_pct <= block_pct <= 100`.
    #[error("Invalid budget for provider '{provider}': {reason}")]
    InvalidBudget { provider: String, reason: String },

    #[error("Role '{0}' has no symbols")]
    EmptySymbols(String),
}

/// Errors surfaced to callers of the gateway.
///
/// Individual adapter failures are absorbed by the chain walk. A caller only sees
/// an error when every chain member and the safety net failed, in which case the
/// last concrete adapter error is returned.
///
/// The type is `Clone` so that one in-flight resolution can hand the same outcome
/// to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The last concrete adapter failure after the chain was exhausted.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// No adapter ran at all (every member skipped) and no safety net answered.
    #[error("No provider could serve role '{role}'")]
    ChainExhausted { role: String },

    /// The gateway process itself could not be reached. Client side only.
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    /// The gateway answered with an error status. Client side only.
    #[error("Gateway returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the caller should try its direct-provider escalation path.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

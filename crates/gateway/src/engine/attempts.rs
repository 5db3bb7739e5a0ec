//! Per-resolution attempt log for diagnostics.

use std::fmt;

use serde::Serialize;

use crate::errors::AdapterErrorKind;
use crate::registry::BudgetState;

/// Why a chain member was passed over without a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Provider does not declare the role.
    MissingCapability,
    /// Budget guard reported `blocked`.
    BudgetBlocked,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCapability => write!(f, "missing capability"),
            Self::BudgetBlocked => write!(f, "budget blocked"),
        }
    }
}

/// Outcome of one chain member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ProviderAttempt {
    Skipped {
        provider_id: String,
        reason: SkipReason,
    },
    Failed {
        provider_id: String,
        kind: AdapterErrorKind,
        message: String,
    },
    Succeeded {
        provider_id: String,
        /// Budget state seen when the call was admitted.
        budget: BudgetState,
        quotes: usize,
    },
}

/// Ordered attempts of one resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttemptLog {
    attempts: Vec<ProviderAttempt>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_skip(&mut self, provider_id: &str, reason: SkipReason) {
        self.attempts.push(ProviderAttempt::Skipped {
            provider_id: provider_id.to_string(),
            reason,
        });
    }

    pub fn record_error(&mut self, provider_id: &str, kind: AdapterErrorKind, message: String) {
        self.attempts.push(ProviderAttempt::Failed {
            provider_id: provider_id.to_string(),
            kind,
            message,
        });
    }

    pub fn record_success(&mut self, provider_id: &str, budget: BudgetState, quotes: usize) {
        self.attempts.push(ProviderAttempt::Succeeded {
            provider_id: provider_id.to_string(),
            budget,
            quotes,
        });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "none".to_string();
        }
        self.attempts
            .iter()
            .map(|a| match a {
                ProviderAttempt::Skipped {
                    provider_id,
                    reason,
                } => format!("{}: SKIPPED ({})", provider_id, reason),
                ProviderAttempt::Failed {
                    provider_id, kind, ..
                } => format!("{}: ERROR ({})", provider_id, kind),
                ProviderAttempt::Succeeded {
                    provider_id,
                    budget,
                    ..
                } => format!("{}: SUCCESS ({})", provider_id, budget),
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

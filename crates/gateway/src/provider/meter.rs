//! Per-request accounting handed to adapters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::errors::AdapterError;
use crate::models::ProviderId;
use crate::registry::{BudgetGuard, BudgetState};

/// Charges one provider's budget for each outbound request of a single
/// adapter invocation.
///
/// Adapters that fan out (one request per pair or per base currency) call
/// [`UpstreamMeter::acquire`] before every request, so the budget guard and the
/// upstream call counter see real request volume. Once the guard reports
/// `blocked` the meter refuses further requests and the adapter returns what
/// it has so far.
#[derive(Debug)]
pub struct UpstreamMeter {
    provider_id: ProviderId,
    budget: Option<Arc<BudgetGuard>>,
    calls: Option<Arc<AtomicU64>>,
    refused: AtomicBool,
}

impl UpstreamMeter {
    pub fn new(provider_id: ProviderId, budget: Arc<BudgetGuard>, calls: Arc<AtomicU64>) -> Self {
        Self {
            provider_id,
            budget: Some(budget),
            calls: Some(calls),
            refused: AtomicBool::new(false),
        }
    }

    /// Admits every request and records nothing. Used for synthetic providers
    /// and for direct calls that bypass the gateway.
    pub fn unmetered(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            budget: None,
            calls: None,
            refused: AtomicBool::new(false),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Reserve one outbound request.
    ///
    /// Returns the budget state seen before the request was counted, or a
    /// `rate-limited` error when the provider is blocked. A refused request is
    /// not counted.
    pub fn acquire(&self) -> Result<BudgetState, AdapterError> {
        let state = match &self.budget {
            Some(budget) => budget.try_acquire(&self.provider_id),
            None => BudgetState::Ok,
        };
        if state == BudgetState::Blocked {
            debug!("{}: request refused, call budget exhausted", self.provider_id);
            self.refused.store(true, Ordering::Relaxed);
            return Err(AdapterError::budget_exhausted(self.provider_id.as_ref()));
        }
        if let Some(calls) = &self.calls {
            calls.fetch_add(1, Ordering::Relaxed);
        }
        Ok(state)
    }

    /// Whether any request was refused by the budget guard.
    pub fn refused(&self) -> bool {
        self.refused.load(Ordering::Relaxed)
    }
}

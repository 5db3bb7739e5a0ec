use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::budget::BudgetLimits;
use crate::errors::AdapterError;
use crate::models::ProviderId;
use crate::provider::QuoteAdapter;

/// How a provider authenticates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthRequirement {
    #[default]
    None,
    /// API key read from the named environment variable at call time.
    Env { var: String },
}

/// Immutable description of one upstream provider.
///
/// Built once by the catalog loader; the adapter binding is resolved by name
/// at that point so lookups never fail later.
pub struct ProviderDescriptor {
    pub id: ProviderId,
    /// Roles this provider can serve.
    pub capabilities: BTreeSet<String>,
    pub auth: AuthRequirement,
    /// Base URL override for HTTP adapters.
    pub endpoint: Option<String>,
    /// Call allowances enforced by the budget guard. `None` means unmetered.
    pub budget: Option<BudgetLimits>,
    adapter: Arc<dyn QuoteAdapter>,
}

impl ProviderDescriptor {
    pub fn new<I, S>(id: &str, capabilities: I, adapter: Arc<dyn QuoteAdapter>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Arc::from(id),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            auth: AuthRequirement::None,
            endpoint: None,
            budget: None,
            adapter,
        }
    }

    pub fn with_auth(mut self, auth: AuthRequirement) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_budget(mut self, budget: Option<BudgetLimits>) -> Self {
        self.budget = budget;
        self
    }

    /// Whether the provider declares the role in its capability set.
    pub fn serves(&self, role: &str) -> bool {
        self.capabilities.contains(role)
    }

    pub fn adapter(&self) -> &Arc<dyn QuoteAdapter> {
        &self.adapter
    }

    pub fn is_synthetic(&self) -> bool {
        self.adapter.is_synthetic()
    }

    /// Resolve the credential for an authenticated provider.
    ///
    /// Returns an `unauthorized` adapter error when the variable is unset or empty.
    /// The catalog loader rejects keyed adapters on providers without a
    /// credential, so the `None` arm is only reachable for hand-built descriptors.
    pub fn require_credential(&self) -> Result<String, AdapterError> {
        match &self.auth {
            AuthRequirement::None => Err(AdapterError::unauthorized(
                self.id.as_ref(),
                "provider has no credential configured",
            )),
            AuthRequirement::Env { var } => std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    AdapterError::unauthorized(
                        self.id.as_ref(),
                        format!("missing credential in ${}", var),
                    )
                }),
        }
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("auth", &self.auth)
            .field("endpoint", &self.endpoint)
            .field("budget", &self.budget)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

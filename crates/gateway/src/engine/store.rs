use std::collections::HashMap;
use std::sync::Arc;

use super::cache::ResponseCache;
use crate::registry::{BudgetGuard, ProviderRegistry};

/// Mutable process-local state shared by every resolution.
///
/// Owned explicitly and injected into the engine, so each test can build its
/// own isolated instance.
#[derive(Clone, Default)]
pub struct GatewayStore {
    pub cache: Arc<ResponseCache>,
    pub budget: Arc<BudgetGuard>,
}

impl GatewayStore {
    pub fn new(cache: ResponseCache, budget: BudgetGuard) -> Self {
        Self {
            cache: Arc::new(cache),
            budget: Arc::new(budget),
        }
    }

    /// Empty cache plus a budget guard metering every provider that declares limits.
    pub fn for_registry(registry: &ProviderRegistry) -> Self {
        let limits: HashMap<String, _> = registry
            .providers()
            .iter()
            .filter_map(|p| p.budget.map(|limits| (p.id.to_string(), limits)))
            .collect();
        Self::new(ResponseCache::new(), BudgetGuard::new(limits))
    }
}

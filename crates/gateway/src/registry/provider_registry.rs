use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::GatewayError;
use crate::models::ProviderId;

use super::descriptor::ProviderDescriptor;

/// Static catalog of provider descriptors, looked up by id.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<ProviderDescriptor>>,
    order: Vec<ProviderId>,
    safety_net: Option<ProviderId>,
}

impl ProviderRegistry {
    pub(crate) fn new(providers: Vec<ProviderDescriptor>, safety_net: Option<ProviderId>) -> Self {
        let order = providers.iter().map(|p| p.id.clone()).collect();
        let providers = providers
            .into_iter()
            .map(|p| (p.id.to_string(), Arc::new(p)))
            .collect();
        Self {
            providers,
            order,
            safety_net,
        }
    }

    pub fn get_provider(&self, id: &str) -> Result<Arc<ProviderDescriptor>, GatewayError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownProvider(id.to_string()))
    }

    /// The synthetic provider tried after every chain member failed.
    pub fn safety_net(&self) -> Option<Arc<ProviderDescriptor>> {
        self.safety_net
            .as_ref()
            .and_then(|id| self.providers.get(id.as_ref()).cloned())
    }

    /// Providers in document order.
    pub fn providers(&self) -> Vec<Arc<ProviderDescriptor>> {
        self.order
            .iter()
            .filter_map(|id| self.providers.get(id.as_ref()).cloned())
            .collect()
    }
}

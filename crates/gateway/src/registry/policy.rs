use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::models::{ProviderId, RequestParams, RoleId};

/// What a role does when its primary provider cannot answer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradationMode {
    /// Walk the backups and tag their answers `fallback`.
    #[default]
    Fallback,
    /// Walk the backups (answers tagged `live`); when the whole chain fails,
    /// prefer the previous cached answer over synthetic data.
    Cached,
}

/// Immutable resolution policy for one role.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePolicy {
    pub role: RoleId,
    pub primary_provider_id: ProviderId,
    pub backup_provider_ids: Vec<ProviderId>,
    pub cache_ttl_seconds: u64,
    pub degradation_mode: DegradationMode,
    /// Normalized symbols this role resolves.
    pub symbols: Vec<String>,
}

impl RolePolicy {
    /// `[primary, ...backups]`
    pub fn chain(&self) -> Vec<ProviderId> {
        std::iter::once(self.primary_provider_id.clone())
            .chain(self.backup_provider_ids.iter().cloned())
            .collect()
    }

    pub fn is_primary(&self, provider_id: &str) -> bool {
        self.primary_provider_id.as_ref() == provider_id
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn request_params(&self) -> RequestParams {
        RequestParams {
            symbols: self.symbols.clone(),
        }
    }
}

/// Role id → policy. Pure lookups, no I/O after load.
#[derive(Debug, Default)]
pub struct RolePolicyTable {
    policies: HashMap<String, Arc<RolePolicy>>,
    order: Vec<RoleId>,
}

impl RolePolicyTable {
    pub(crate) fn new(policies: Vec<RolePolicy>) -> Self {
        let order = policies.iter().map(|p| p.role.clone()).collect();
        let policies = policies
            .into_iter()
            .map(|p| (p.role.to_string(), Arc::new(p)))
            .collect();
        Self { policies, order }
    }

    pub fn get_role_policy(&self, role: &str) -> Result<Arc<RolePolicy>, GatewayError> {
        self.policies
            .get(role)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownRole(role.to_string()))
    }

    /// Policies in document order.
    pub fn policies(&self) -> Vec<Arc<RolePolicy>> {
        self.order
            .iter()
            .filter_map(|role| self.policies.get(role.as_ref()).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RolePolicy {
        RolePolicy {
            role: Arc::from("ribbon"),
            primary_provider_id: Arc::from("p1"),
            backup_provider_ids: vec![Arc::from("p2"), Arc::from("p3")],
            cache_ttl_seconds: 60,
            degradation_mode: DegradationMode::Fallback,
            symbols: vec!["EUR/USD".to_string()],
        }
    }

    #[test]
    fn test_chain_order() {
        let chain = policy().chain();
        let ids: Vec<&str> = chain.iter().map(|id| id.as_ref()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
        assert!(policy().is_primary("p1"));
        assert!(!policy().is_primary("p2"));
    }

    #[test]
    fn test_lookup() {
        let table = RolePolicyTable::new(vec![policy()]);
        assert_eq!(table.get_role_policy("ribbon").unwrap().cache_ttl_seconds, 60);
        assert_eq!(
            table.get_role_policy("metals").unwrap_err(),
            GatewayError::UnknownRole("metals".to_string())
        );
    }

    #[test]
    fn test_degradation_mode_document_values() {
        let mode: DegradationMode = serde_json::from_str("\"cached\"").unwrap();
        assert_eq!(mode, DegradationMode::Cached);
    }
}

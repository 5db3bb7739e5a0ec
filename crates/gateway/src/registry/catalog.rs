//! Configuration document loader.
//!
//! Two JSON documents describe a gateway: the provider registry and the role
//! policy table. They are parsed and cross-validated once at startup. Any
//! inconsistency is a fatal [`ConfigError`]; a catalog that loaded is
//! guaranteed to reference only providers that exist and serve the role.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use serde::Deserialize;

use super::budget::BudgetLimits;
use super::descriptor::{AuthRequirement, ProviderDescriptor};
use super::policy::{DegradationMode, RolePolicy, RolePolicyTable};
use super::provider_registry::ProviderRegistry;
use crate::errors::ConfigError;
use crate::models::{ProviderId, RequestParams};
use crate::provider::AdapterSet;

/// Provider registry document shipped with the crate.
pub const DEFAULT_PROVIDERS_DOC: &str = include_str!("../../config/providers.json");

/// Role policy document shipped with the crate.
pub const DEFAULT_ROLES_DOC: &str = include_str!("../../config/roles.json");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvidersDocument {
    #[serde(default)]
    safety_net: Option<String>,
    providers: Vec<ProviderEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderEntry {
    id: String,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    auth: AuthRequirement,
    adapter: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    budget: Option<BudgetLimits>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RolesDocument {
    roles: Vec<RoleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleEntry {
    role: String,
    primary: String,
    #[serde(default)]
    backups: Vec<String>,
    #[serde(default)]
    cache_ttl_seconds: u64,
    #[serde(default)]
    degradation: DegradationMode,
    #[serde(default)]
    symbols: Vec<String>,
}

/// A validated provider registry and role policy table.
#[derive(Clone, Debug)]
pub struct GatewayCatalog {
    pub registry: Arc<ProviderRegistry>,
    pub policies: Arc<RolePolicyTable>,
}

impl GatewayCatalog {
    /// Parse and validate both documents, binding providers to `adapters`.
    pub fn load(
        providers_doc: &str,
        roles_doc: &str,
        adapters: &AdapterSet,
    ) -> Result<Self, ConfigError> {
        let providers: ProvidersDocument =
            serde_json::from_str(providers_doc).map_err(|e| ConfigError::Parse {
                document: "providers",
                message: e.to_string(),
            })?;
        let roles: RolesDocument =
            serde_json::from_str(roles_doc).map_err(|e| ConfigError::Parse {
                document: "roles",
                message: e.to_string(),
            })?;

        let registry = build_registry(providers, adapters)?;
        let policies = build_policies(roles, &registry)?;

        info!(
            "Loaded gateway catalog: {} providers, {} roles",
            registry.providers().len(),
            policies.len()
        );

        Ok(Self {
            registry: Arc::new(registry),
            policies: Arc::new(policies),
        })
    }

    /// The shipped documents bound to the built-in adapters.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::load(DEFAULT_PROVIDERS_DOC, DEFAULT_ROLES_DOC, &AdapterSet::builtin())
    }

    /// Read both documents from disk, then [`load`](Self::load) them.
    pub fn from_paths(
        providers_path: impl AsRef<Path>,
        roles_path: impl AsRef<Path>,
        adapters: &AdapterSet,
    ) -> Result<Self, ConfigError> {
        let providers = read_document(providers_path.as_ref())?;
        let roles = read_document(roles_path.as_ref())?;
        Self::load(&providers, &roles, adapters)
    }
}

fn read_document(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn build_registry(
    document: ProvidersDocument,
    adapters: &AdapterSet,
) -> Result<ProviderRegistry, ConfigError> {
    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(document.providers.len());

    for entry in document.providers {
        if !seen.insert(entry.id.clone()) {
            return Err(ConfigError::DuplicateProvider(entry.id));
        }

        let adapter = adapters
            .get(&entry.adapter)
            .ok_or_else(|| ConfigError::UnknownAdapter {
                provider: entry.id.clone(),
                adapter: entry.adapter.clone(),
            })?;

        if let Some(budget) = &entry.budget {
            budget
                .validate()
                .map_err(|reason| ConfigError::InvalidBudget {
                    provider: entry.id.clone(),
                    reason,
                })?;
        }

        if adapter.requires_credential() && entry.auth == AuthRequirement::None {
            return Err(ConfigError::MissingCredential {
                provider: entry.id.clone(),
                adapter: entry.adapter.clone(),
            });
        }

        let capabilities: BTreeSet<String> = entry
            .capabilities
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        debug!(
            "Provider '{}' bound to adapter '{}' for roles {:?}",
            entry.id, entry.adapter, capabilities
        );

        descriptors.push(
            ProviderDescriptor::new(&entry.id, capabilities, adapter)
                .with_auth(entry.auth)
                .with_endpoint(entry.endpoint)
                .with_budget(entry.budget),
        );
    }

    let safety_net: Option<ProviderId> = match document.safety_net {
        None => None,
        Some(id) => {
            let descriptor = descriptors.iter().find(|d| d.id.as_ref() == id).ok_or_else(|| {
                ConfigError::InvalidSafetyNet {
                    provider: id.clone(),
                    reason: "no such provider".to_string(),
                }
            })?;
            if !descriptor.is_synthetic() {
                return Err(ConfigError::InvalidSafetyNet {
                    provider: id,
                    reason: "provider is not synthetic".to_string(),
                });
            }
            Some(descriptor.id.clone())
        }
    };

    Ok(ProviderRegistry::new(descriptors, safety_net))
}

fn build_policies(
    document: RolesDocument,
    registry: &ProviderRegistry,
) -> Result<RolePolicyTable, ConfigError> {
    let mut seen = HashSet::new();
    let mut policies = Vec::with_capacity(document.roles.len());

    for entry in document.roles {
        if !seen.insert(entry.role.clone()) {
            return Err(ConfigError::DuplicateRole(entry.role));
        }

        let chain = std::iter::once(&entry.primary).chain(entry.backups.iter());
        for provider_id in chain {
            let provider =
                registry
                    .get_provider(provider_id)
                    .map_err(|_| ConfigError::UnknownProvider {
                        role: entry.role.clone(),
                        provider: provider_id.clone(),
                    })?;
            if !provider.serves(&entry.role) {
                return Err(ConfigError::MissingCapability {
                    role: entry.role.clone(),
                    provider: provider_id.clone(),
                });
            }
        }

        let symbols = RequestParams::new(&entry.symbols).symbols;
        if symbols.is_empty() {
            return Err(ConfigError::EmptySymbols(entry.role));
        }

        policies.push(RolePolicy {
            role: Arc::from(entry.role.as_str()),
            primary_provider_id: Arc::from(entry.primary.as_str()),
            backup_provider_ids: entry.backups.iter().map(|b| Arc::from(b.as_str())).collect(),
            cache_ttl_seconds: entry.cache_ttl_seconds,
            degradation_mode: entry.degradation,
            symbols,
        });
    }

    Ok(RolePolicyTable::new(policies))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDERS: &str = r#"{
        "safetyNet": "demo",
        "providers": [
            { "id": "frankfurter", "capabilities": ["ribbon"], "adapter": "frankfurter" },
            {
                "id": "twelve_data",
                "capabilities": ["ribbon", "majors"],
                "adapter": "twelve_data",
                "auth": { "type": "env", "var": "TWELVE_DATA_API_KEY" },
                "budget": { "dailyLimit": 800, "perMinuteLimit": 8 }
            },
            { "id": "demo", "capabilities": ["ribbon", "majors"], "adapter": "demo" }
        ]
    }"#;

    const ROLES: &str = r#"{
        "roles": [
            {
                "role": "ribbon",
                "primary": "frankfurter",
                "backups": ["twelve_data"],
                "cacheTtlSeconds": 60,
                "degradation": "fallback",
                "symbols": ["eurusd", "usd-jpy"]
            }
        ]
    }"#;

    fn load(providers: &str, roles: &str) -> Result<GatewayCatalog, ConfigError> {
        GatewayCatalog::load(providers, roles, &AdapterSet::builtin())
    }

    #[test]
    fn test_load_valid_documents() {
        let catalog = load(PROVIDERS, ROLES).unwrap();

        let policy = catalog.policies.get_role_policy("ribbon").unwrap();
        assert_eq!(policy.primary_provider_id.as_ref(), "frankfurter");
        assert_eq!(policy.symbols, vec!["EUR/USD", "USD/JPY"]);
        assert_eq!(policy.degradation_mode, DegradationMode::Fallback);

        let td = catalog.registry.get_provider("twelve_data").unwrap();
        assert_eq!(td.budget.unwrap().daily_limit, 800);
        assert_eq!(td.adapter().name(), "twelve_data");
        assert_eq!(catalog.registry.safety_net().unwrap().id.as_ref(), "demo");
    }

    #[test]
    fn test_shipped_documents_are_valid() {
        let catalog = GatewayCatalog::builtin().unwrap();
        let roles: Vec<String> = catalog
            .policies
            .policies()
            .iter()
            .map(|p| p.role.to_string())
            .collect();
        assert_eq!(roles, vec!["ribbon", "majors", "metals"]);
        assert!(catalog.registry.safety_net().unwrap().is_synthetic());

        let majors = catalog.policies.get_role_policy("majors").unwrap();
        assert_eq!(majors.symbols, vec!["EUR/USD", "GBP/USD", "EUR/GBP"]);
    }

    #[test]
    fn test_malformed_json() {
        let err = load("{ not json", ROLES).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { document: "providers", .. }));
    }

    #[test]
    fn test_duplicate_provider() {
        let providers = r#"{ "providers": [
            { "id": "demo", "capabilities": ["ribbon"], "adapter": "demo" },
            { "id": "demo", "capabilities": ["ribbon"], "adapter": "demo" }
        ] }"#;
        let err = load(providers, r#"{ "roles": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateProvider(id) if id == "demo"));
    }

    #[test]
    fn test_unknown_adapter() {
        let providers = r#"{ "providers": [
            { "id": "yahoo", "capabilities": ["ribbon"], "adapter": "yahoo" }
        ] }"#;
        let err = load(providers, r#"{ "roles": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAdapter { .. }));
    }

    #[test]
    fn test_policy_with_unknown_provider() {
        let roles = r#"{ "roles": [
            { "role": "ribbon", "primary": "frankfurter", "backups": ["p9"], "symbols": ["EURUSD"] }
        ] }"#;
        let err = load(PROVIDERS, roles).unwrap_err();
        assert!(
            matches!(err, ConfigError::UnknownProvider { ref provider, .. } if provider == "p9")
        );
    }

    #[test]
    fn test_provider_without_capability() {
        let roles = r#"{ "roles": [
            { "role": "majors", "primary": "frankfurter", "symbols": ["EURUSD"] }
        ] }"#;
        let err = load(PROVIDERS, roles).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCapability { .. }));
    }

    #[test]
    fn test_duplicate_role_and_empty_symbols() {
        let roles = r#"{ "roles": [
            { "role": "ribbon", "primary": "demo", "symbols": ["EURUSD"] },
            { "role": "ribbon", "primary": "demo", "symbols": ["EURUSD"] }
        ] }"#;
        assert!(matches!(
            load(PROVIDERS, roles).unwrap_err(),
            ConfigError::DuplicateRole(_)
        ));

        let roles = r#"{ "roles": [
            { "role": "ribbon", "primary": "demo", "symbols": ["  "] }
        ] }"#;
        assert!(matches!(
            load(PROVIDERS, roles).unwrap_err(),
            ConfigError::EmptySymbols(_)
        ));
    }

    #[test]
    fn test_safety_net_must_be_synthetic() {
        let providers = r#"{ "safetyNet": "frankfurter", "providers": [
            { "id": "frankfurter", "capabilities": ["ribbon"], "adapter": "frankfurter" }
        ] }"#;
        let err = load(providers, r#"{ "roles": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSafetyNet { .. }));

        let providers = r#"{ "safetyNet": "missing", "providers": [] }"#;
        let err = load(providers, r#"{ "roles": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSafetyNet { .. }));
    }

    #[test]
    fn test_keyed_adapter_needs_credential() {
        let providers = r#"{ "providers": [
            { "id": "td", "capabilities": ["ribbon"], "adapter": "twelve_data" }
        ] }"#;
        let err = load(providers, r#"{ "roles": [] }"#).unwrap_err();
        match err {
            ConfigError::MissingCredential { provider, adapter } => {
                assert_eq!(provider, "td");
                assert_eq!(adapter, "twelve_data");
            }
            other => panic!("expected missing credential, got {:?}", other),
        }

        let keyless = r#"{ "providers": [
            { "id": "ecb", "capabilities": ["ribbon"], "adapter": "frankfurter" }
        ] }"#;
        assert!(load(keyless, r#"{ "roles": [] }"#).is_ok());
    }

    #[test]
    fn test_invalid_budget_thresholds() {
        let providers = r#"{ "providers": [
            {
                "id": "td", "capabilities": ["ribbon"], "adapter": "twelve_data",
                "budget": { "dailyLimit": 10, "warnPct": 90, "blockPct": 50 }
            }
        ] }"#;
        let err = load(providers, r#"{ "roles": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBudget { .. }));
    }

    #[test]
    fn test_from_paths_reports_missing_file() {
        let err = GatewayCatalog::from_paths(
            "/nonexistent/providers.json",
            "/nonexistent/roles.json",
            &AdapterSet::builtin(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

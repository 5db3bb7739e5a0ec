//! Provider registry and role policy module.
//!
//! This module provides the static configuration side of the gateway:
//! - Provider descriptors and the registry that looks them up
//! - Role policies (provider chain, cache TTL, degradation mode)
//! - The catalog loader that parses and cross-validates both documents
//! - The per-provider budget guard

mod budget;
mod catalog;
mod descriptor;
mod policy;
mod provider_registry;

pub use budget::{BudgetGuard, BudgetLimits, BudgetState, BudgetStatus, UpstreamHint};
pub use catalog::{GatewayCatalog, DEFAULT_PROVIDERS_DOC, DEFAULT_ROLES_DOC};
pub use descriptor::{AuthRequirement, ProviderDescriptor};
pub use policy::{DegradationMode, RolePolicy, RolePolicyTable};
pub use provider_registry::ProviderRegistry;

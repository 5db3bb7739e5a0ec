//! Resolution engine module.
//!
//! This module provides:
//! - [`ResolutionEngine`]: cache, budget check, chain walk and safety net
//! - [`GatewayStore`]: the injected cache and budget state
//! - [`ResponseCache`]: per-key TTL cache with lazy eviction
//! - [`DiagnosticsSnapshot`]: read-only view for status pages

mod attempts;
mod cache;
mod diagnostics;
mod resolver;
mod store;

pub use attempts::{AttemptLog, ProviderAttempt, SkipReason};
pub use cache::{cache_key, CacheEntry, CacheEntryInfo, CacheLookup, ResponseCache};
pub use diagnostics::{
    CacheSnapshot, CounterSnapshot, DecisionOutcome, DecisionRecord, DiagnosticsSnapshot,
    ErrorRecord,
};
pub use resolver::{EngineSettings, ResolutionEngine};
pub use store::GatewayStore;

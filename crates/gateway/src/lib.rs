//! Quotegate Gateway Crate
//!
//! Turns a logical data request ("give me the FX ribbon") into a normalized
//! answer sourced from one of several interchangeable upstream providers.
//!
//! # Overview
//!
//! The gateway combines:
//! - Declarative provider and role configuration (JSON documents)
//! - An ordered fallback chain with per-provider capability checks
//! - TTL response caching with in-flight de-duplication
//! - A budget guard that stops calling a provider before its quota runs out
//! - A synthetic safety net so callers get an answer even when every provider fails
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ ResolutionEngine::resolve(role, options)
//!                  │
//!                  ├─▶ ResponseCache ──fresh──▶ mode = cached
//!                  │
//!                  ├─▶ BudgetGuard (skip blocked providers)
//!                  │
//!                  ├─▶ QuoteAdapter (primary, then backups) ──▶ live | fallback
//!                  │
//!                  └─▶ safety net ──▶ demo
//! ```
//!
//! # Core Types
//!
//! - [`GatewayCatalog`] - Validated provider registry and role policy table
//! - [`ResolutionEngine`] - The resolution state machine
//! - [`GatewayStore`] - Injected cache and budget state
//! - [`ResolutionResult`] - The answer, tagged with a [`Mode`]
//! - [`NormalizedQuote`] - One normalized data point
//! - [`GatewayClient`] - Remote caller with direct-provider escalation

pub mod client;
pub mod engine;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod symbol;

pub use client::GatewayClient;
pub use engine::{DiagnosticsSnapshot, EngineSettings, GatewayStore, ResolutionEngine};
pub use errors::{AdapterError, AdapterErrorKind, ConfigError, GatewayError};
pub use models::{
    Mode, NormalizedQuote, ProviderId, RequestParams, ResolutionResult, ResolveOptions, RoleId,
};
pub use provider::{AdapterSet, QuoteAdapter, UpstreamMeter};
pub use registry::{
    BudgetGuard, BudgetLimits, BudgetState, BudgetStatus, DegradationMode, GatewayCatalog,
    ProviderDescriptor, ProviderRegistry, RolePolicy, RolePolicyTable,
};
pub use symbol::normalize;

//! Read-only projection of engine, cache and budget state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cache::CacheEntryInfo;
use super::ResolutionEngine;
use crate::models::Mode;
use crate::registry::{BudgetStatus, UpstreamHint};

/// How a resolution ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionOutcome {
    /// Served from a fresh cache entry.
    CacheHit,
    /// A chain member answered.
    Resolved,
    /// Chain exhausted under `cached` degradation; the expired entry was served.
    StaleCache,
    /// Chain exhausted; the safety net answered.
    SafetyNet,
    /// Waited on another caller's resolution past the bound and served the expired entry.
    InflightStale,
    /// Nothing answered.
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub role: String,
    pub cache_key: String,
    pub outcome: DecisionOutcome,
    pub mode: Option<Mode>,
    pub source_provider: Option<String>,
    /// Chain walk summary, e.g. `p1: ERROR (timeout) -> p2: SUCCESS (ok)`.
    pub attempts: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub role: String,
    pub cache_key: Option<String>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct EngineStats {
    pub(crate) request_count: AtomicU64,
    /// Shared with every [`UpstreamMeter`](crate::provider::UpstreamMeter) the engine hands out.
    pub(crate) upstream_call_count: Arc<AtomicU64>,
    pub(crate) upstream_429_count: AtomicU64,
}

impl EngineStats {
    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            request_count: self.request_count.load(Ordering::Relaxed),
            upstream_call_count: self.upstream_call_count.load(Ordering::Relaxed),
            upstream_429_count: self.upstream_429_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub request_count: u64,
    pub upstream_call_count: u64,
    pub upstream_429_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    /// At least one entry is still fresh.
    pub has_value: bool,
    /// Of the most recently stored fresh entry.
    pub as_of: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub entries: Vec<CacheEntryInfo>,
}

impl CacheSnapshot {
    fn from_entries(entries: Vec<CacheEntryInfo>) -> Self {
        let latest = entries
            .iter()
            .filter(|e| e.fresh)
            .max_by_key(|e| e.stored_at);
        Self {
            has_value: latest.is_some(),
            as_of: latest.map(|e| e.as_of),
            expires_at: latest.map(|e| e.expires_at),
            entries,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub counters: CounterSnapshot,
    pub last_decision: Option<DecisionRecord>,
    pub last_error: Option<ErrorRecord>,
    pub cache: CacheSnapshot,
    pub budget: Vec<BudgetStatus>,
    pub upstream_hints: Vec<UpstreamHint>,
}

impl ResolutionEngine {
    /// Current engine state. Never mutates, never fails.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let inner = &self.inner;
        DiagnosticsSnapshot {
            counters: inner.stats.snapshot(),
            last_decision: inner.last_decision(),
            last_error: inner.last_error(),
            cache: CacheSnapshot::from_entries(inner.store.cache.entries()),
            budget: inner.store.budget.states(),
            upstream_hints: inner.store.budget.upstream_hints(),
        }
    }
}

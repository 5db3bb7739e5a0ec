//! Per-provider call budget guard.
//!
//! Tracks two windows per metered provider, the UTC calendar day and a 60 second
//! window, against configured allowances. The resulting tri-state decides
//! whether a live call is attempted at all:
//!
//! - **Ok**: below the warn threshold in both windows.
//! - **Warn**: at or above the warn threshold in either window. Calls proceed.
//! - **Blocked**: at or above the block threshold in either window. The
//!   provider is skipped and its counters are not incremented further.
//!
//! Only local counters drive the decision. Upstream rate-limit hints are kept
//! for diagnostics but never consulted. State is in-memory and resets on restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Length of the short window.
const MINUTE_WINDOW: Duration = Duration::from_secs(60);

const DEFAULT_WARN_PCT: u8 = 80;
const DEFAULT_BLOCK_PCT: u8 = 95;

fn default_warn_pct() -> u8 {
    DEFAULT_WARN_PCT
}

fn default_block_pct() -> u8 {
    DEFAULT_BLOCK_PCT
}

/// Allowances for one provider. A zero limit leaves that window unmetered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLimits {
    #[serde(default)]
    pub daily_limit: u32,
    #[serde(default)]
    pub per_minute_limit: u32,
    /// Percentage of an allowance at which the state becomes `warn`.
    #[serde(default = "default_warn_pct")]
    pub warn_pct: u8,
    /// Percentage of an allowance at which the state becomes `blocked`.
    #[serde(default = "default_block_pct")]
    pub block_pct: u8,
}

impl BudgetLimits {
    pub fn new(daily_limit: u32, per_minute_limit: u32) -> Self {
        Self {
            daily_limit,
            per_minute_limit,
            warn_pct: DEFAULT_WARN_PCT,
            block_pct: DEFAULT_BLOCK_PCT,
        }
    }

    pub fn with_thresholds(mut self, warn_pct: u8, block_pct: u8) -> Self {
        self.warn_pct = warn_pct;
        self.block_pct = block_pct;
        self
    }

    /// Check `0 < warn_pct <= block_pct <= 100`.
    pub fn validate(&self) -> Result<(), String> {
        if self.warn_pct == 0 {
            return Err("warnPct must be greater than 0".to_string());
        }
        if self.warn_pct > self.block_pct {
            return Err(format!(
                "warnPct ({}) exceeds blockPct ({})",
                self.warn_pct, self.block_pct
            ));
        }
        if self.block_pct > 100 {
            return Err(format!("blockPct ({}) exceeds 100", self.block_pct));
        }
        Ok(())
    }

    fn classify(&self, daily_used: u32, minute_used: u32) -> BudgetState {
        let reached = |used: u32, limit: u32, pct: u8| {
            limit > 0 && u64::from(used) * 100 >= u64::from(pct) * u64::from(limit)
        };

        if reached(daily_used, self.daily_limit, self.block_pct)
            || reached(minute_used, self.per_minute_limit, self.block_pct)
        {
            BudgetState::Blocked
        } else if reached(daily_used, self.daily_limit, self.warn_pct)
            || reached(minute_used, self.per_minute_limit, self.warn_pct)
        {
            BudgetState::Warn
        } else {
            BudgetState::Ok
        }
    }
}

/// Budget tri-state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetState {
    Ok,
    Warn,
    Blocked,
}

impl std::fmt::Display for BudgetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warn => write!(f, "warn"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Read-only view of one provider's budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub provider_id: String,
    pub state: BudgetState,
    pub daily_used: u32,
    pub daily_limit: u32,
    pub minute_used: u32,
    pub minute_limit: u32,
}

/// Last rate-limit hint an upstream sent for a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamHint {
    pub provider_id: String,
    pub retry_after_secs: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

/// Counter state for a single provider.
#[derive(Debug)]
struct Counters {
    /// UTC day the daily count belongs to.
    day: NaiveDate,
    daily_used: u32,
    /// Start of the current short window.
    minute_started: Instant,
    minute_used: u32,
}

impl Counters {
    fn new(today: NaiveDate, now: Instant) -> Self {
        Self {
            day: today,
            daily_used: 0,
            minute_started: now,
            minute_used: 0,
        }
    }

    /// Usage as it would be after rolling windows over, without mutating.
    fn effective(&self, today: NaiveDate, now: Instant) -> (u32, u32) {
        let daily = if self.day == today { self.daily_used } else { 0 };
        let minute = if now.duration_since(self.minute_started) < MINUTE_WINDOW {
            self.minute_used
        } else {
            0
        };
        (daily, minute)
    }

    fn roll(&mut self, today: NaiveDate, now: Instant) {
        if self.day != today {
            self.day = today;
            self.daily_used = 0;
        }
        if now.duration_since(self.minute_started) >= MINUTE_WINDOW {
            self.minute_started = now;
            self.minute_used = 0;
        }
    }
}

/// Thread-safe budget guard over every metered provider.
///
/// Providers without configured limits are never tracked and always report `ok`.
#[derive(Debug)]
pub struct BudgetGuard {
    limits: HashMap<String, BudgetLimits>,
    counters: Mutex<HashMap<String, Counters>>,
    hints: Mutex<HashMap<String, UpstreamHint>>,
}

impl BudgetGuard {
    pub fn new(limits: HashMap<String, BudgetLimits>) -> Self {
        Self {
            limits,
            counters: Mutex::new(HashMap::new()),
            hints: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the counters mutex, recovering from poison if necessary.
    ///
    /// A poisoned lock can at worst leave one counter off by one, which is
    /// preferable to failing every request.
    fn lock_counters(&self) -> MutexGuard<'_, HashMap<String, Counters>> {
        self.counters.lock().unwrap_or_else(|poisoned| {
            warn!("Budget counters mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_hints(&self) -> MutexGuard<'_, HashMap<String, UpstreamHint>> {
        self.hints.lock().unwrap_or_else(|poisoned| {
            warn!("Budget hints mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    pub fn is_metered(&self, provider_id: &str) -> bool {
        self.limits.contains_key(provider_id)
    }

    pub fn limits(&self, provider_id: &str) -> Option<BudgetLimits> {
        self.limits.get(provider_id).copied()
    }

    /// Count one upstream attempt against both windows.
    pub fn record_attempt(&self, provider_id: &str) {
        if !self.is_metered(provider_id) {
            return;
        }
        let (today, now) = (Self::today(), Instant::now());
        let mut counters = self.lock_counters();
        let entry = counters
            .entry(provider_id.to_string())
            .or_insert_with(|| Counters::new(today, now));
        entry.roll(today, now);
        entry.daily_used = entry.daily_used.saturating_add(1);
        entry.minute_used = entry.minute_used.saturating_add(1);
        debug!(
            "Budget: attempt recorded for '{}' (day {}, minute {})",
            provider_id, entry.daily_used, entry.minute_used
        );
    }

    /// Current state of a provider's budget. Pure read.
    pub fn get_state(&self, provider_id: &str) -> BudgetStatus {
        let Some(limits) = self.limits(provider_id) else {
            return BudgetStatus {
                provider_id: provider_id.to_string(),
                state: BudgetState::Ok,
                daily_used: 0,
                daily_limit: 0,
                minute_used: 0,
                minute_limit: 0,
            };
        };

        let (daily_used, minute_used) = self
            .lock_counters()
            .get(provider_id)
            .map(|c| c.effective(Self::today(), Instant::now()))
            .unwrap_or((0, 0));

        BudgetStatus {
            provider_id: provider_id.to_string(),
            state: limits.classify(daily_used, minute_used),
            daily_used,
            daily_limit: limits.daily_limit,
            minute_used,
            minute_limit: limits.per_minute_limit,
        }
    }

    /// Check and record in one step.
    ///
    /// Returns the state observed before the attempt. When it is `Blocked`
    /// nothing is recorded and the caller must not call the provider.
    pub fn try_acquire(&self, provider_id: &str) -> BudgetState {
        let Some(limits) = self.limits(provider_id) else {
            return BudgetState::Ok;
        };

        let (today, now) = (Self::today(), Instant::now());
        let mut counters = self.lock_counters();
        let entry = counters
            .entry(provider_id.to_string())
            .or_insert_with(|| Counters::new(today, now));
        entry.roll(today, now);

        let state = limits.classify(entry.daily_used, entry.minute_used);
        match state {
            BudgetState::Blocked => {
                info!(
                    "Budget: '{}' blocked (day {}/{}, minute {}/{})",
                    provider_id,
                    entry.daily_used,
                    limits.daily_limit,
                    entry.minute_used,
                    limits.per_minute_limit
                );
            }
            BudgetState::Warn | BudgetState::Ok => {
                if state == BudgetState::Warn {
                    warn!(
                        "Budget: '{}' above warn threshold ({}%)",
                        provider_id, limits.warn_pct
                    );
                }
                entry.daily_used = entry.daily_used.saturating_add(1);
                entry.minute_used = entry.minute_used.saturating_add(1);
            }
        }
        state
    }

    /// Remember an upstream rate-limit hint for diagnostics.
    pub fn observe_upstream_limit(&self, provider_id: &str, retry_after: Option<Duration>) {
        let hint = UpstreamHint {
            provider_id: provider_id.to_string(),
            retry_after_secs: retry_after.map(|d| d.as_secs()),
            observed_at: Utc::now(),
        };
        self.lock_hints().insert(provider_id.to_string(), hint);
    }

    /// Status of every metered provider, sorted by id.
    pub fn states(&self) -> Vec<BudgetStatus> {
        let mut ids: Vec<&String> = self.limits.keys().collect();
        ids.sort();
        ids.into_iter().map(|id| self.get_state(id)).collect()
    }

    pub fn upstream_hints(&self) -> Vec<UpstreamHint> {
        let mut hints: Vec<UpstreamHint> = self.lock_hints().values().cloned().collect();
        hints.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        hints
    }
}

impl Default for BudgetGuard {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(provider: &str, limits: BudgetLimits) -> BudgetGuard {
        BudgetGuard::new(HashMap::from([(provider.to_string(), limits)]))
    }

    #[test]
    fn test_unmetered_provider_is_always_ok() {
        let guard = BudgetGuard::default();
        guard.record_attempt("demo");
        let status = guard.get_state("demo");
        assert_eq!(status.state, BudgetState::Ok);
        assert_eq!(status.daily_used, 0);
        assert_eq!(guard.try_acquire("demo"), BudgetState::Ok);
    }

    #[test]
    fn test_state_transitions_on_daily_window() {
        let guard = guard("p1", BudgetLimits::new(10, 0).with_thresholds(50, 80));

        for _ in 0..4 {
            guard.record_attempt("p1");
        }
        assert_eq!(guard.get_state("p1").state, BudgetState::Ok);

        guard.record_attempt("p1");
        assert_eq!(guard.get_state("p1").state, BudgetState::Warn);

        for _ in 0..3 {
            guard.record_attempt("p1");
        }
        let status = guard.get_state("p1");
        assert_eq!(status.state, BudgetState::Blocked);
        assert_eq!(status.daily_used, 8);
        assert_eq!(status.daily_limit, 10);
    }

    #[test]
    fn test_either_window_can_block() {
        let guard = guard("p1", BudgetLimits::new(1000, 2).with_thresholds(50, 100));
        guard.record_attempt("p1");
        assert_eq!(guard.get_state("p1").state, BudgetState::Warn);
        guard.record_attempt("p1");
        let status = guard.get_state("p1");
        assert_eq!(status.state, BudgetState::Blocked);
        assert_eq!(status.minute_used, 2);
        assert_eq!(status.minute_limit, 2);
    }

    #[test]
    fn test_try_acquire_does_not_count_when_blocked() {
        let guard = guard("p1", BudgetLimits::new(3, 0).with_thresholds(100, 100));

        assert_eq!(guard.try_acquire("p1"), BudgetState::Ok);
        assert_eq!(guard.try_acquire("p1"), BudgetState::Ok);
        assert_eq!(guard.try_acquire("p1"), BudgetState::Ok);
        assert_eq!(guard.try_acquire("p1"), BudgetState::Blocked);
        assert_eq!(guard.try_acquire("p1"), BudgetState::Blocked);

        assert_eq!(guard.get_state("p1").daily_used, 3);
    }

    #[test]
    fn test_get_state_is_pure() {
        let guard = guard("p1", BudgetLimits::new(10, 10));
        guard.record_attempt("p1");
        let first = guard.get_state("p1");
        let second = guard.get_state("p1");
        assert_eq!(first, second);
        assert_eq!(first.daily_used, 1);
    }

    #[test]
    fn test_daily_window_rolls_over() {
        let guard = guard("p1", BudgetLimits::new(2, 0).with_thresholds(50, 100));
        guard.record_attempt("p1");
        guard.record_attempt("p1");
        assert_eq!(guard.get_state("p1").state, BudgetState::Blocked);

        // Pretend the counts belong to yesterday
        {
            let mut counters = guard.lock_counters();
            let entry = counters.get_mut("p1").unwrap();
            entry.day = entry.day.pred_opt().unwrap();
        }

        let status = guard.get_state("p1");
        assert_eq!(status.state, BudgetState::Ok);
        assert_eq!(status.daily_used, 0);

        guard.record_attempt("p1");
        assert_eq!(guard.get_state("p1").daily_used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_window_rolls_over() {
        let guard = guard("p1", BudgetLimits::new(0, 2).with_thresholds(50, 100));
        guard.record_attempt("p1");
        guard.record_attempt("p1");
        assert_eq!(guard.get_state("p1").state, BudgetState::Blocked);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(guard.get_state("p1").state, BudgetState::Blocked);

        tokio::time::advance(Duration::from_secs(1)).await;
        let status = guard.get_state("p1");
        assert_eq!(status.state, BudgetState::Ok);
        assert_eq!(status.minute_used, 0);
    }

    #[test]
    fn test_limits_validation() {
        assert!(BudgetLimits::new(10, 1).validate().is_ok());
        assert!(BudgetLimits::new(10, 1).with_thresholds(0, 90).validate().is_err());
        assert!(BudgetLimits::new(10, 1).with_thresholds(95, 90).validate().is_err());
        assert!(BudgetLimits::new(10, 1).with_thresholds(80, 101).validate().is_err());
    }

    #[test]
    fn test_limits_document_defaults() {
        let limits: BudgetLimits = serde_json::from_str(r#"{"dailyLimit": 800}"#).unwrap();
        assert_eq!(limits.daily_limit, 800);
        assert_eq!(limits.per_minute_limit, 0);
        assert_eq!(limits.warn_pct, 80);
        assert_eq!(limits.block_pct, 95);
    }

    #[test]
    fn test_upstream_hints_are_recorded() {
        let guard = BudgetGuard::default();
        guard.observe_upstream_limit("twelve_data", Some(Duration::from_secs(30)));
        let hints = guard.upstream_hints();
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].retry_after_secs, Some(30));
    }
}

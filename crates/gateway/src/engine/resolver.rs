//! The resolution state machine.
//!
//! ```text
//! CHECK_CACHE ──fresh──▶ RETURN_CACHED
//!      │ miss / expired
//!      ▼
//! CHECK_BUDGET ──every member blocked──▶ TRY_SAFETY_NET
//!      │
//!      ▼
//! WALK_CHAIN ──success──▶ STORE_CACHE (live/fallback only) ──▶ return
//!      │ exhausted
//!      ▼
//! [cached degradation: expired entry] ──▶ TRY_SAFETY_NET ──▶ demo | last error
//! ```
//!
//! One resolution runs per cache key at a time. The first caller spawns it as a
//! task; concurrent callers await the same shared outcome. A caller with no
//! expired value to fall back on waits at most as long as the whole chain plus
//! the safety net could take, then asks the safety net itself.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::attempts::{AttemptLog, SkipReason};
use super::cache::{cache_key, CacheLookup};
use super::diagnostics::{DecisionOutcome, DecisionRecord, EngineStats, ErrorRecord};
use super::store::GatewayStore;
use crate::errors::{AdapterError, GatewayError};
use crate::models::{Mode, NormalizedQuote, RequestParams, ResolutionResult, ResolveOptions};
use crate::provider::UpstreamMeter;
use crate::registry::{
    BudgetState, DegradationMode, GatewayCatalog, ProviderDescriptor, ProviderRegistry,
    RolePolicy, RolePolicyTable,
};

const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(4);
const DEFAULT_INFLIGHT_WAIT: Duration = Duration::from_millis(1500);

/// Engine tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound on a single adapter call. A timed-out call counts as a failure.
    pub adapter_timeout: Duration,
    /// How long a caller waits on another caller's in-flight resolution before
    /// settling for the key's expired value.
    pub inflight_wait: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            adapter_timeout: DEFAULT_ADAPTER_TIMEOUT,
            inflight_wait: DEFAULT_INFLIGHT_WAIT,
        }
    }
}

type SharedResolution = Shared<BoxFuture<'static, Result<ResolutionResult, GatewayError>>>;

struct InFlight {
    outcome: SharedResolution,
    /// Expired value for the key, captured when the leader evicted it.
    previous: Option<ResolutionResult>,
}

enum Admission {
    Cached(ResolutionResult),
    Lead(SharedResolution),
    Join {
        outcome: SharedResolution,
        previous: Option<ResolutionResult>,
    },
}

/// Drops a key's in-flight registration when the leading task ends, by
/// returning or by unwinding.
struct InflightRelease {
    inner: Arc<EngineInner>,
    key: String,
}

impl Drop for InflightRelease {
    fn drop(&mut self) {
        self.inner.lock_inflight().remove(&self.key);
    }
}

pub(crate) struct EngineInner {
    pub(crate) registry: Arc<ProviderRegistry>,
    pub(crate) policies: Arc<RolePolicyTable>,
    pub(crate) store: GatewayStore,
    pub(crate) settings: EngineSettings,
    pub(crate) stats: EngineStats,
    inflight: Mutex<HashMap<String, InFlight>>,
    last_decision: Mutex<Option<DecisionRecord>>,
    last_error: Mutex<Option<ErrorRecord>>,
}

/// Lock a mutex, recovering from poison.
fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("{} mutex was poisoned, recovering", what);
        poisoned.into_inner()
    })
}

impl EngineInner {
    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        lock_or_recover(&self.inflight, "In-flight")
    }

    pub(crate) fn last_decision(&self) -> Option<DecisionRecord> {
        lock_or_recover(&self.last_decision, "Decision").clone()
    }

    pub(crate) fn last_error(&self) -> Option<ErrorRecord> {
        lock_or_recover(&self.last_error, "Error").clone()
    }

    fn record_decision(
        &self,
        role: &str,
        key: &str,
        outcome: DecisionOutcome,
        result: Option<&ResolutionResult>,
        attempts: &AttemptLog,
    ) {
        let record = DecisionRecord {
            role: role.to_string(),
            cache_key: key.to_string(),
            outcome,
            mode: result.map(|r| r.mode),
            source_provider: result.map(|r| r.source_provider.clone()),
            attempts: attempts.summary(),
            decided_at: Utc::now(),
        };
        *lock_or_recover(&self.last_decision, "Decision") = Some(record);
    }

    fn record_error(&self, role: &str, key: Option<&str>, error: &GatewayError) {
        let record = ErrorRecord {
            role: role.to_string(),
            cache_key: key.map(str::to_string),
            message: error.to_string(),
            occurred_at: Utc::now(),
        };
        *lock_or_recover(&self.last_error, "Error") = Some(record);
    }
}

/// Resolves roles into normalized answers.
///
/// Cheap to clone; clones share the same store, in-flight table and counters.
#[derive(Clone)]
pub struct ResolutionEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl ResolutionEngine {
    pub fn new(catalog: &GatewayCatalog, store: GatewayStore, settings: EngineSettings) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry: catalog.registry.clone(),
                policies: catalog.policies.clone(),
                store,
                settings,
                stats: EngineStats::default(),
                inflight: Mutex::new(HashMap::new()),
                last_decision: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Engine with a fresh store and default settings.
    pub fn from_catalog(catalog: &GatewayCatalog) -> Self {
        let store = GatewayStore::for_registry(&catalog.registry);
        Self::new(catalog, store, EngineSettings::default())
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    pub fn policies(&self) -> &Arc<RolePolicyTable> {
        &self.inner.policies
    }

    pub fn store(&self) -> &GatewayStore {
        &self.inner.store
    }

    pub fn settings(&self) -> EngineSettings {
        self.inner.settings
    }

    /// Resolve a role.
    ///
    /// Only total exhaustion surfaces an error, and then it is the last concrete
    /// adapter error. A departed caller does not cancel the underlying resolution.
    pub async fn resolve(
        &self,
        role: &str,
        options: ResolveOptions,
    ) -> Result<ResolutionResult, GatewayError> {
        let inner = &self.inner;
        inner.stats.request_count.fetch_add(1, Ordering::Relaxed);

        let policy = inner.policies.get_role_policy(role).map_err(|e| {
            inner.record_error(role, None, &e);
            e
        })?;
        let forced = match &options.force_provider_id {
            Some(id) => Some(inner.registry.get_provider(id).map_err(|e| {
                inner.record_error(role, None, &e);
                e
            })?),
            None => None,
        };

        let key = cache_key(role, forced.as_ref().map(|p| p.id.as_ref()));
        let chain_len = if forced.is_some() { 1 } else { policy.chain().len() };

        match self.admit(&key, &policy, forced, options.bypasses_cache()) {
            Admission::Cached(result) => {
                debug!(role, key = %key, "Serving fresh cache entry");
                inner.record_decision(
                    role,
                    &key,
                    DecisionOutcome::CacheHit,
                    Some(&result),
                    &AttemptLog::new(),
                );
                Ok(result)
            }
            Admission::Lead(outcome) => outcome.await,
            Admission::Join {
                outcome,
                previous: Some(previous),
            } => {
                debug!(role, key = %key, "Joining in-flight resolution");
                match tokio::time::timeout(inner.settings.inflight_wait, outcome).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        info!(
                            role,
                            key = %key,
                            "In-flight resolution still pending after {:?}, serving expired entry",
                            inner.settings.inflight_wait
                        );
                        let result = previous.as_cached();
                        inner.record_decision(
                            role,
                            &key,
                            DecisionOutcome::InflightStale,
                            Some(&result),
                            &AttemptLog::new(),
                        );
                        Ok(result)
                    }
                }
            }
            Admission::Join {
                outcome,
                previous: None,
            } => {
                debug!(role, key = %key, "Joining in-flight resolution");
                let bound = self.follower_bound(chain_len);
                match tokio::time::timeout(bound, outcome.clone()).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(
                            role,
                            key = %key,
                            "In-flight resolution still pending after {:?}, asking safety net",
                            bound
                        );
                        let mut attempts = AttemptLog::new();
                        match self.try_safety_net(&policy, &key, &mut attempts).await {
                            Some(Ok(result)) => Ok(result),
                            _ => outcome.await,
                        }
                    }
                }
            }
        }
    }

    /// Decide under the in-flight lock whether this caller is served from cache,
    /// leads a new resolution or joins the running one.
    fn admit(
        &self,
        key: &str,
        policy: &Arc<RolePolicy>,
        forced: Option<Arc<ProviderDescriptor>>,
        bypass_cache: bool,
    ) -> Admission {
        let mut inflight = self.inner.lock_inflight();

        let expired = if bypass_cache {
            None
        } else {
            match self.inner.store.cache.lookup(key) {
                CacheLookup::Fresh(result) => return Admission::Cached(result.as_cached()),
                CacheLookup::Expired(entry) => Some(entry.value),
                CacheLookup::Miss => None,
            }
        };

        if let Some(running) = inflight.get(key) {
            return Admission::Join {
                outcome: running.outcome.clone(),
                previous: running.previous.clone().or(expired),
            };
        }

        let task = {
            let engine = self.clone();
            let policy = policy.clone();
            let key = key.to_string();
            let previous = expired.clone();
            tokio::spawn(async move { engine.lead(policy, forced, key, previous).await })
        };
        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                Err(GatewayError::Internal(format!("resolution task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        inflight.insert(
            key.to_string(),
            InFlight {
                outcome: outcome.clone(),
                previous: expired,
            },
        );
        Admission::Lead(outcome)
    }

    /// Body of the spawned task. Writes the cache before releasing the key.
    async fn lead(
        self,
        policy: Arc<RolePolicy>,
        forced: Option<Arc<ProviderDescriptor>>,
        key: String,
        previous: Option<ResolutionResult>,
    ) -> Result<ResolutionResult, GatewayError> {
        let _release = InflightRelease {
            inner: self.inner.clone(),
            key: key.clone(),
        };
        let outcome = self.run(&policy, forced, &key, previous).await;
        if let Err(e) = &outcome {
            self.inner.record_error(&policy.role, Some(&key), e);
        }
        outcome
    }

    /// Longest a leader can legitimately take: every chain member and the
    /// safety net hitting the adapter timeout, plus the in-flight grace.
    fn follower_bound(&self, chain_len: usize) -> Duration {
        let settings = self.inner.settings;
        u32::try_from(chain_len + 1)
            .ok()
            .and_then(|calls| settings.adapter_timeout.checked_mul(calls))
            .and_then(|d| d.checked_add(settings.inflight_wait))
            .unwrap_or(Duration::MAX)
    }

    async fn run(
        &self,
        policy: &RolePolicy,
        forced: Option<Arc<ProviderDescriptor>>,
        key: &str,
        previous: Option<ResolutionResult>,
    ) -> Result<ResolutionResult, GatewayError> {
        let inner = &self.inner;
        let role = policy.role.as_ref();
        let chain = match forced {
            Some(provider) => vec![provider],
            None => policy
                .chain()
                .iter()
                .map(|id| inner.registry.get_provider(id))
                .collect::<Result<Vec<_>, _>>()?,
        };
        let params = policy.request_params();

        let mut attempts = AttemptLog::new();
        let mut last_error: Option<AdapterError> = None;

        if self.all_blocked(&chain) {
            for provider in &chain {
                attempts.record_skip(&provider.id, SkipReason::BudgetBlocked);
            }
            info!(role, "Every chain member is over budget, skipping to safety net");
        } else {
            for provider in &chain {
                if !provider.serves(role) {
                    debug!(role, provider = %provider.id, "Provider lacks role capability, skipping");
                    attempts.record_skip(&provider.id, SkipReason::MissingCapability);
                    continue;
                }

                // Requests are charged by the meter inside the adapter.
                let admitted = if provider.is_synthetic() {
                    BudgetState::Ok
                } else {
                    inner.store.budget.get_state(&provider.id).state
                };
                if admitted == BudgetState::Blocked {
                    debug!(role, provider = %provider.id, "Provider over budget, skipping");
                    attempts.record_skip(&provider.id, SkipReason::BudgetBlocked);
                    continue;
                }

                match self.invoke(provider, role, &params).await {
                    Ok(quotes) => {
                        attempts.record_success(&provider.id, admitted, quotes.len());
                        let mode = mode_for(policy, provider);
                        let result = build_result(policy, provider, mode, quotes);

                        if mode.is_cacheable() && policy.cache_ttl_seconds > 0 {
                            inner
                                .store
                                .cache
                                .insert(key, result.clone(), policy.cache_ttl());
                        }

                        info!(
                            role,
                            provider = %provider.id,
                            mode = %mode,
                            quotes = result.data.len(),
                            "Resolved: {}",
                            attempts.summary()
                        );
                        inner.record_decision(
                            role,
                            key,
                            DecisionOutcome::Resolved,
                            Some(&result),
                            &attempts,
                        );
                        return Ok(result);
                    }
                    Err(err) => {
                        warn!(
                            role,
                            provider = %provider.id,
                            kind = %err.kind,
                            "Provider failed, trying next: {}",
                            err.message
                        );
                        attempts.record_error(&provider.id, err.kind, err.message.clone());
                        last_error = Some(err);
                    }
                }
            }
        }

        if policy.degradation_mode == DegradationMode::Cached {
            if let Some(previous) = previous {
                info!(role, "Chain exhausted, serving expired entry");
                let result = previous.as_cached();
                inner.record_decision(
                    role,
                    key,
                    DecisionOutcome::StaleCache,
                    Some(&result),
                    &attempts,
                );
                return Ok(result);
            }
        }

        match self.try_safety_net(policy, key, &mut attempts).await {
            Some(Ok(result)) => {
                info!(role, "Chain exhausted, served by safety net: {}", attempts.summary());
                return Ok(result);
            }
            Some(Err(err)) => last_error = Some(err),
            None => warn!(role, "Chain exhausted and no safety net is configured"),
        }

        inner.record_decision(role, key, DecisionOutcome::Failed, None, &attempts);
        Err(last_error.map(GatewayError::Adapter).unwrap_or_else(|| {
            GatewayError::ChainExhausted {
                role: role.to_string(),
            }
        }))
    }

    /// Ask the registry's safety net. `None` when there is none.
    async fn try_safety_net(
        &self,
        policy: &RolePolicy,
        key: &str,
        attempts: &mut AttemptLog,
    ) -> Option<Result<ResolutionResult, AdapterError>> {
        let net = self.inner.registry.safety_net()?;
        let role = policy.role.as_ref();
        let params = policy.request_params();

        let outcome = match self.invoke(&net, role, &params).await {
            Ok(quotes) => {
                attempts.record_success(&net.id, BudgetState::Ok, quotes.len());
                let result = build_result(policy, &net, Mode::Demo, quotes);
                self.inner.record_decision(
                    role,
                    key,
                    DecisionOutcome::SafetyNet,
                    Some(&result),
                    attempts,
                );
                Ok(result)
            }
            Err(err) => {
                warn!(role, provider = %net.id, "Safety net failed: {}", err);
                attempts.record_error(&net.id, err.kind, err.message.clone());
                Err(err)
            }
        };
        Some(outcome)
    }

    /// True when the chain holds only real providers and all of them are blocked.
    fn all_blocked(&self, chain: &[Arc<ProviderDescriptor>]) -> bool {
        !chain.is_empty()
            && chain.iter().all(|p| {
                !p.is_synthetic()
                    && self.inner.store.budget.get_state(&p.id).state == BudgetState::Blocked
            })
    }

    /// One bounded adapter call. Empty answers count as malformed and a
    /// panicking adapter counts as a server error.
    async fn invoke(
        &self,
        provider: &ProviderDescriptor,
        role: &str,
        params: &RequestParams,
    ) -> Result<Vec<NormalizedQuote>, AdapterError> {
        let inner = &self.inner;
        let meter = if provider.is_synthetic() {
            UpstreamMeter::unmetered(provider.id.clone())
        } else {
            UpstreamMeter::new(
                provider.id.clone(),
                inner.store.budget.clone(),
                inner.stats.upstream_call_count.clone(),
            )
        };

        let call = AssertUnwindSafe(provider.adapter().adapt(provider, role, params, &meter))
            .catch_unwind();
        let outcome = match tokio::time::timeout(inner.settings.adapter_timeout, call).await {
            Ok(Ok(Ok(quotes))) if quotes.is_empty() => Err(AdapterError::malformed(
                provider.id.as_ref(),
                "no usable quotes in response",
            )),
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => Err(AdapterError::server_error(
                provider.id.as_ref(),
                format!("adapter panicked: {}", panic_message(panic.as_ref())),
            )),
            Err(_) => Err(AdapterError::timeout(provider.id.as_ref())),
        };

        if let Err(err) = &outcome {
            // A local budget refusal is not an upstream rate limit.
            if err.is_rate_limited() && !meter.refused() {
                inner.stats.upstream_429_count.fetch_add(1, Ordering::Relaxed);
                inner
                    .store
                    .budget
                    .observe_upstream_limit(&provider.id, err.retry_after);
            }
        }
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

fn mode_for(policy: &RolePolicy, provider: &ProviderDescriptor) -> Mode {
    if provider.is_synthetic() {
        Mode::Demo
    } else if !policy.is_primary(&provider.id)
        && policy.degradation_mode == DegradationMode::Fallback
    {
        Mode::Fallback
    } else {
        Mode::Live
    }
}

fn build_result(
    policy: &RolePolicy,
    provider: &ProviderDescriptor,
    mode: Mode,
    data: Vec<NormalizedQuote>,
) -> ResolutionResult {
    ResolutionResult {
        role: policy.role.to_string(),
        primary_provider: policy.primary_provider_id.to_string(),
        source_provider: provider.id.to_string(),
        mode,
        as_of: Utc::now(),
        data,
    }
}

//! In-memory response cache with per-entry TTL.
//!
//! Entries are evicted lazily: an expired entry is removed by the lookup that
//! finds it, and handed back to the caller so the engine can still serve it as
//! a stale answer. There is no background sweeper.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use tokio::time::Instant;

use crate::models::{Mode, ResolutionResult};

/// Deadline used when a configured TTL overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Cache key for a role, optionally scoped to a forced provider.
pub fn cache_key(role: &str, forced_provider: Option<&str>) -> String {
    match forced_provider {
        Some(provider) => format!("{}@{}", role, provider),
        None => role.to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: ResolutionResult,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Monotonic deadline that actually drives expiry.
    deadline: Instant,
}

impl CacheEntry {
    fn new(value: ResolutionResult, ttl: Duration) -> Self {
        let stored_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| stored_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            value,
            stored_at,
            expires_at,
            deadline: Instant::now()
                .checked_add(ttl)
                .unwrap_or_else(|| Instant::now() + FAR_FUTURE),
        }
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.deadline
    }
}

/// Result of a cache read.
#[derive(Debug)]
pub enum CacheLookup {
    Fresh(ResolutionResult),
    /// The entry had expired and was evicted by this lookup.
    Expired(CacheEntry),
    Miss,
}

/// Diagnostics view of one cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryInfo {
    pub key: String,
    pub mode: Mode,
    pub source_provider: String,
    pub as_of: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub fresh: bool,
}

#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Response cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Read an entry, evicting it when expired.
    pub fn lookup(&self, key: &str) -> CacheLookup {
        let mut entries = self.lock();
        match entries.get(key) {
            None => CacheLookup::Miss,
            Some(entry) if entry.is_fresh() => CacheLookup::Fresh(entry.value.clone()),
            Some(_) => match entries.remove(key) {
                Some(entry) => {
                    debug!("Cache entry '{}' expired, evicted", key);
                    CacheLookup::Expired(entry)
                }
                None => CacheLookup::Miss,
            },
        }
    }

    /// Store a result, replacing any previous entry. A zero TTL stores nothing.
    pub fn insert(&self, key: &str, value: ResolutionResult, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        debug!("Caching '{}' ({} via {}) for {:?}", key, value.mode, value.source_provider, ttl);
        self.lock().insert(key.to_string(), CacheEntry::new(value, ttl));
    }

    /// Read without evicting.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        let mut infos: Vec<CacheEntryInfo> = self
            .lock()
            .iter()
            .map(|(key, entry)| CacheEntryInfo {
                key: key.clone(),
                mode: entry.value.mode,
                source_provider: entry.value.source_provider.clone(),
                as_of: entry.value.as_of,
                stored_at: entry.stored_at,
                expires_at: entry.expires_at,
                fresh: entry.is_fresh(),
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(source: &str) -> ResolutionResult {
        ResolutionResult {
            role: "ribbon".to_string(),
            primary_provider: "p1".to_string(),
            source_provider: source.to_string(),
            mode: Mode::Live,
            as_of: Utc::now(),
            data: Vec::new(),
        }
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("ribbon", None), "ribbon");
        assert_eq!(cache_key("ribbon", Some("demo")), "ribbon@demo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_and_is_evicted_once() {
        let cache = ResponseCache::new();
        cache.insert("ribbon", result("p1"), Duration::from_secs(60));

        assert!(matches!(cache.lookup("ribbon"), CacheLookup::Fresh(r) if r.source_provider == "p1"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.peek("ribbon").is_some_and(|e| !e.is_fresh()));

        match cache.lookup("ribbon") {
            CacheLookup::Expired(entry) => assert_eq!(entry.value.source_provider, "p1"),
            other => panic!("expected expired entry, got {:?}", other),
        }
        assert!(matches!(cache.lookup("ribbon"), CacheLookup::Miss));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_overwrites_and_zero_ttl_is_ignored() {
        let cache = ResponseCache::new();
        cache.insert("ribbon", result("p1"), Duration::from_secs(60));
        cache.insert("ribbon", result("p2"), Duration::from_secs(60));
        cache.insert("other", result("p3"), Duration::ZERO);

        assert_eq!(cache.len(), 1);
        let entries = cache.entries();
        assert_eq!(entries[0].source_provider, "p2");
        assert!(entries[0].fresh);
        assert!(entries[0].expires_at > entries[0].stored_at);
    }
}

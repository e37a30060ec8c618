//! At-most-one-fetch geolocation cache.
//!
//! Every ip known to the cache, successful or not, is answered from memory.
//! Only ips never seen before (or failures past the optional TTL) reach the
//! external lookup, and each of those is looked up once per cache lifetime.

use super::{CacheStore, GeoLookup, GeoResult, Pacer};
use crate::config::GeoConfig;
use crate::error::{EtlError, LookupError, Result};
use crate::logging::{report_degradation, Degradation};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Pacing, retry and concurrency knobs for [`GeoCache::resolve_many`].
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub pace: Duration,
    pub rate_limit_backoff: Duration,
    pub max_attempts: u32,
    pub max_in_flight: usize,
    pub failure_ttl: Option<chrono::Duration>,
}

impl From<&GeoConfig> for ResolverSettings {
    fn from(c: &GeoConfig) -> Self {
        Self {
            pace: Duration::from_millis(c.pace_ms),
            rate_limit_backoff: Duration::from_millis(c.rate_limit_backoff_ms),
            max_attempts: c.max_attempts.max(1),
            max_in_flight: c.max_in_flight.max(1),
            failure_ttl: c
                .failure_ttl_secs
                .and_then(|s| i64::try_from(s).ok())
                .map(chrono::Duration::seconds),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&GeoConfig::default())
    }
}

/// Outcome of one [`GeoCache::resolve_many`] call.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Result for every requested ip the cache could answer
    pub resolved: HashMap<String, GeoResult>,
    /// Results obtained from the external lookup during this call
    pub fetched: Vec<GeoResult>,
    /// External calls made, retries included
    pub lookups: usize,
    /// Missing ips left unresolved because the run was cancelled
    pub skipped: usize,
}

pub struct GeoCache {
    store: Option<Box<dyn CacheStore>>,
    entries: HashMap<String, GeoResult>,
}

impl GeoCache {
    /// Load persisted entries. A store that cannot be read leaves the cache
    /// empty and in-memory only; the run goes on.
    pub fn load(store: Box<dyn CacheStore>) -> Self {
        let mut cache = Self {
            store: None,
            entries: HashMap::new(),
        };
        match store.load() {
            Ok(rows) => {
                let n = rows.len();
                cache.merge(rows);
                cache.store = Some(store);
                info!(rows = n, entries = cache.entries.len(), "geolocation cache loaded");
            }
            Err(e) => {
                report_degradation(Degradation::CacheLoadCorruption, "geo_cache", &e.to_string());
            }
        }
        cache
    }

    /// Cache with no backing store.
    pub fn in_memory() -> Self {
        Self {
            store: None,
            entries: HashMap::new(),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ip: &str) -> Option<&GeoResult> {
        self.entries.get(ip)
    }

    /// Entries sorted by ip.
    pub fn entries(&self) -> Vec<GeoResult> {
        let mut out: Vec<GeoResult> = self.entries.values().cloned().collect();
        out.sort_by(|a, b| a.ip.cmp(&b.ip));
        out
    }

    fn needs_lookup(&self, ip: &str, ttl: Option<chrono::Duration>, now: DateTime<Utc>) -> bool {
        match (self.entries.get(ip), ttl) {
            (None, _) => true,
            (Some(e), Some(ttl)) => !e.is_success() && now - e.fetched_at > ttl,
            (Some(_), None) => false,
        }
    }

    /// Ips from `ips` that would be sent to the external lookup.
    pub fn missing<'a>(&self, ips: &'a BTreeSet<String>, ttl: Option<chrono::Duration>) -> Vec<&'a str> {
        let now = Utc::now();
        ips.iter()
            .filter(|ip| self.needs_lookup(ip, ttl, now))
            .map(|ip| ip.as_str())
            .collect()
    }

    /// Union `results` into memory. On an ip collision the later `fetched_at`
    /// wins; a tie keeps the current entry, so re-merging is a no-op.
    /// Returns how many entries changed.
    pub fn merge(&mut self, results: impl IntoIterator<Item = GeoResult>) -> usize {
        let mut changed = 0;
        for r in results {
            match self.entries.get(&r.ip) {
                Some(cur) if cur.fetched_at >= r.fetched_at => {}
                _ => {
                    self.entries.insert(r.ip.clone(), r);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Merge, then write the full mapping back in one atomic step.
    /// After a failed write the cache keeps working in memory only.
    pub fn merge_and_persist(&mut self, results: Vec<GeoResult>) -> Result<()> {
        self.merge(results);
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        let entries = self.entries();
        match store.save(&entries) {
            Ok(()) => {
                info!(entries = entries.len(), "geolocation cache persisted");
                Ok(())
            }
            Err(e) => {
                self.store = None;
                Err(EtlError::CachePersist(e.to_string()))
            }
        }
    }

    /// Answer every ip in `ips`, looking up the missing ones.
    ///
    /// Up to `max_in_flight` lookups run at once, but all of them share one
    /// pacer. A rate-limited ip is retried after the backoff until
    /// `max_attempts` is used up, then recorded as failed. Once `cancel` is
    /// set no new ip is started. Fetched results are merged into memory
    /// before returning.
    pub fn resolve_many(
        &mut self,
        ips: &BTreeSet<String>,
        lookup: &dyn GeoLookup,
        settings: &ResolverSettings,
        cancel: &AtomicBool,
    ) -> Resolution {
        let missing = self.missing(ips, settings.failure_ttl);
        info!(requested = ips.len(), missing = missing.len(), "resolving client ips");

        let pacer = Pacer::new(settings.pace);
        let cursor = AtomicUsize::new(0);
        let calls = AtomicUsize::new(0);
        let fetched = Mutex::new(Vec::with_capacity(missing.len()));
        let workers = settings.max_in_flight.min(missing.len());

        std::thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| loop {
                    let i = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(ip) = missing.get(i) else { break };
                    if let Some(r) = fetch_one(ip, lookup, settings, &pacer, &calls, cancel) {
                        match fetched.lock() {
                            Ok(mut v) => v.push(r),
                            Err(poisoned) => poisoned.into_inner().push(r),
                        }
                    }
                });
            }
        });

        let mut fetched = fetched.into_inner().unwrap_or_else(|p| p.into_inner());
        fetched.sort_by(|a, b| a.ip.cmp(&b.ip));
        let skipped = missing.len() - fetched.len();
        self.merge(fetched.iter().cloned());

        let resolved = ips
            .iter()
            .filter_map(|ip| self.entries.get(ip).map(|r| (ip.clone(), r.clone())))
            .collect();
        Resolution {
            resolved,
            fetched,
            lookups: calls.into_inner(),
            skipped,
        }
    }
}

/// One ip, bounded retries. `None` only when cancelled before an answer.
fn fetch_one(
    ip: &str,
    lookup: &dyn GeoLookup,
    settings: &ResolverSettings,
    pacer: &Pacer,
    calls: &AtomicUsize,
    cancel: &AtomicBool,
) -> Option<GeoResult> {
    for attempt in 1..=settings.max_attempts {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        pacer.wait();
        calls.fetch_add(1, Ordering::Relaxed);
        match lookup.lookup(ip) {
            Ok(mut r) => {
                r.ip = ip.to_string();
                debug!(ip, status = r.status.as_str(), "geolocation fetched");
                return Some(r);
            }
            Err(LookupError::RateLimited) if attempt < settings.max_attempts => {
                debug!(ip, attempt, "rate limited; backing off");
                std::thread::sleep(settings.rate_limit_backoff);
            }
            Err(e) => {
                let message = match e {
                    LookupError::RateLimited => format!("rate limited after {attempt} attempts"),
                    other => other.to_string(),
                };
                report_degradation(Degradation::GeoLookupFailure, ip, &message);
                return Some(GeoResult::failure(ip, message, Utc::now()));
            }
        }
    }
    None
}

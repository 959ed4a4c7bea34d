//! Bounded TTL cache with least-recently-used eviction.
//!
//! # Validity
//!
//! An entry is returned only when all of these hold:
//!
//! - `ttl_ms == 0` (no expiry) or `now - created < ttl_ms`;
//! - `entry.version` equals the cache's current version;
//! - the entry was written after the last [`TtlCache::invalidate_all`].
//!
//! Anything else is a miss and is dropped on sight. Expiry is measured
//! from `created`; reads refresh `last_accessed` only, which drives
//! eviction, not expiry.
//!
//! # Eviction
//!
//! Inserting a new key into a full cache evicts one entry: an invalid
//! entry if there is one, otherwise the entry with the oldest
//! `last_accessed`. Overwriting an existing key never evicts.
//!
//! Time is passed in by the caller (milliseconds since the epoch), so the
//! cache itself never reads a clock. [`Clock`] implementations are provided
//! for the services that own a cache.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Expiry, size and version settings for one cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Time to live in milliseconds; `0` disables expiry.
    pub ttl_ms: i64,
    /// Maximum number of entries; at least one entry is always kept.
    pub max_size: usize,
    pub version: String,
}

/// A memoized value and its bookkeeping.
///
/// This is also the on-disk record format for persisted caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<V> {
    pub value: V,
    pub created: i64,
    pub last_accessed: i64,
    pub version: String,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    pub size: usize,
}

struct Slot<V> {
    entry: CacheEntry<V>,
    generation: u64,
}

/// In-memory TTL + LRU cache. Not synchronized; wrap it in a lock to share.
pub struct TtlCache<V> {
    policy: CachePolicy,
    entries: HashMap<String, Slot<V>>,
    generation: u64,
    stats: CacheStats,
}

/// Expiry and version check shared by memory and disk lookups.
pub fn entry_is_fresh<V>(policy: &CachePolicy, entry: &CacheEntry<V>, now: i64) -> bool {
    let alive = policy.ttl_ms <= 0 || now - entry.created < policy.ttl_ms;
    alive && entry.version == policy.version
}

impl<V: Clone> TtlCache<V> {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
            generation: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    fn slot_is_valid(&self, slot: &Slot<V>, now: i64) -> bool {
        slot.generation == self.generation && entry_is_fresh(&self.policy, &slot.entry, now)
    }

    /// Look up `key`, refreshing its access time on a hit.
    pub fn get(&mut self, key: &str, now: i64) -> Option<V> {
        let valid = match self.entries.get(key) {
            Some(slot) => self.slot_is_valid(slot, now),
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        if !valid {
            self.entries.remove(key);
            self.stats.expired += 1;
            self.stats.misses += 1;
            return None;
        }

        let slot = self.entries.get_mut(key)?;
        slot.entry.last_accessed = now;
        self.stats.hits += 1;
        Some(slot.entry.value.clone())
    }

    /// Store `value` under `key`, evicting if a new key would overflow.
    pub fn set(&mut self, key: &str, value: V, now: i64) {
        let entry = CacheEntry {
            value,
            created: now,
            last_accessed: now,
            version: self.policy.version.clone(),
        };
        self.put(key, entry, now);
    }

    /// Adopt an entry recorded elsewhere (e.g. loaded from disk).
    ///
    /// Returns false, and stores nothing, if the entry is no longer fresh.
    pub fn restore(&mut self, key: &str, mut entry: CacheEntry<V>, now: i64) -> bool {
        if !entry_is_fresh(&self.policy, &entry, now) {
            return false;
        }
        entry.last_accessed = now;
        self.put(key, entry, now);
        true
    }

    fn put(&mut self, key: &str, entry: CacheEntry<V>, now: i64) {
        if !self.entries.contains_key(key) {
            let cap = self.policy.max_size.max(1);
            while self.entries.len() >= cap {
                if !self.evict_one(now) {
                    break;
                }
            }
        }
        self.entries.insert(
            key.to_string(),
            Slot {
                entry,
                generation: self.generation,
            },
        );
    }

    fn evict_one(&mut self, now: i64) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(k, slot)| {
                (
                    self.slot_is_valid(slot, now),
                    slot.entry.last_accessed,
                    (*k).clone(),
                )
            })
            .map(|(k, _)| k.clone());

        match victim {
            Some(k) => {
                self.entries.remove(&k);
                self.stats.evictions += 1;
                true
            }
            None => false,
        }
    }

    /// Raw entry for `key` without validity checks or access bookkeeping.
    #[cfg(test)]
    fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key).map(|s| &s.entry)
    }

    /// Drop every invalid entry. Returns how many were removed.
    pub fn sweep(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        let generation = self.generation;
        let policy = self.policy.clone();
        self.entries.retain(|_, slot| {
            slot.generation == generation && entry_is_fresh(&policy, &slot.entry, now)
        });
        let removed = before - self.entries.len();
        self.stats.expired += removed as u64;
        removed
    }

    /// Make every existing entry miss from now on.
    ///
    /// Takes effect for all subsequent `get` calls at once; entries are
    /// reclaimed lazily by `get`, `sweep`, or eviction.
    pub fn invalidate_all(&mut self) {
        self.generation += 1;
    }

    /// Switch the current version; entries written under another version miss.
    pub fn set_version(&mut self, version: impl Into<String>) {
        self.policy.version = version.into();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            ..self.stats
        }
    }
}

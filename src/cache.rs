//! Shared cache manager with optional disk persistence.
//!
//! Wraps [`doclink_core::cache::TtlCache`] behind a mutex and adds:
//!
//! - a clock ([`Clock`]), so tests can drive expiry deterministically;
//! - best-effort persistence to `<cache.dir>/<namespace>/<sha256(key)>.json`;
//! - a background sweeper ([`CacheSweeper`]) that drops expired entries.
//!
//! Persistence never affects the caller: write failures are logged as
//! `CACHE_ERROR` and the in-memory entry stays authoritative. A memory
//! miss falls back to the persisted entry, which must pass the same
//! TTL and version checks, and must have been written after the last
//! [`CacheManager::invalidate_all`].
//!
//! Caches are constructed once at startup and handed to the services
//! that use them; nothing here is global.

use doclink_core::cache::{CacheEntry, CachePolicy, CacheStats, Clock, TtlCache};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::DocsError;

/// Holds the time of the last `invalidate_all`, in epoch milliseconds.
const MARKER_FILE: &str = ".invalidated";

/// On-disk record: the cache entry plus its key, to detect hash collisions.
#[derive(Serialize, Deserialize)]
struct PersistedEntry<V> {
    key: String,
    #[serde(flatten)]
    entry: CacheEntry<V>,
}

pub struct CacheManager<V> {
    namespace: String,
    inner: Mutex<TtlCache<V>>,
    clock: Arc<dyn Clock>,
    persist_dir: Option<PathBuf>,
    invalidated_at: AtomicI64,
}

impl<V> CacheManager<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Cache for `namespace`, persisted when `settings.persist_to_disk` is on.
    pub fn new(
        namespace: &str,
        settings: &CacheConfig,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let persist_dir = settings
            .persist_to_disk
            .then(|| settings.dir.join(namespace));
        let invalidated_at = persist_dir
            .as_deref()
            .and_then(|dir| read_marker(namespace, dir))
            .unwrap_or(i64::MIN);
        Self {
            namespace: namespace.to_string(),
            inner: Mutex::new(TtlCache::new(policy)),
            clock,
            persist_dir,
            invalidated_at: AtomicI64::new(invalidated_at),
        }
    }

    /// Memory-only cache.
    pub fn in_memory(namespace: &str, policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            namespace: namespace.to_string(),
            inner: Mutex::new(TtlCache::new(policy)),
            clock,
            persist_dir: None,
            invalidated_at: AtomicI64::new(i64::MIN),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TtlCache<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        let dir = self.persist_dir.as_ref()?;
        let digest = Sha256::digest(key.as_bytes());
        Some(dir.join(format!("{}.json", hex::encode(digest))))
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// In-memory lookup only.
    pub fn get_cached(&self, key: &str) -> Option<V> {
        let now = self.now();
        self.lock().get(key, now)
    }

    /// Memory lookup, falling back to the persisted entry.
    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(v) = self.get_cached(key) {
            return Some(v);
        }
        let path = self.entry_path(key)?;

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                self.report(DocsError::Cache(format!("read {}: {}", path.display(), e)));
                return None;
            }
        };
        let persisted: PersistedEntry<V> = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                self.report(DocsError::Cache(format!("parse {}: {}", path.display(), e)));
                return None;
            }
        };
        if persisted.key != key
            || persisted.entry.created <= self.invalidated_at.load(Ordering::SeqCst)
        {
            return None;
        }

        let value = persisted.entry.value.clone();
        let now = self.now();
        if self.lock().restore(key, persisted.entry, now) {
            debug!(namespace = %self.namespace, key, "restored cache entry from disk");
            Some(value)
        } else {
            None
        }
    }

    /// Store `value`; persistence, if enabled, happens in the background.
    pub fn set(&self, key: &str, value: V) {
        let now = self.now();
        let record = self.entry_path(key).map(|path| {
            let entry = PersistedEntry {
                key: key.to_string(),
                entry: CacheEntry {
                    value: value.clone(),
                    created: now,
                    last_accessed: now,
                    version: self.lock().policy().version.clone(),
                },
            };
            (path, serde_json::to_vec(&entry))
        });

        self.lock().set(key, value, now);

        if let Some((path, bytes)) = record {
            match bytes {
                Ok(bytes) => self.persist(path, bytes),
                Err(e) => self.report(DocsError::Cache(format!("serialize {}: {}", key, e))),
            }
        }
    }

    fn persist(&self, path: PathBuf, bytes: Vec<u8>) {
        let namespace = self.namespace.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = write_entry_async(&path, &bytes).await {
                        warn!(namespace = %namespace, code = "CACHE_ERROR", path = %path.display(), error = %e, "cache persistence failed");
                    }
                });
            }
            Err(_) => {
                if let Err(e) = write_entry_blocking(&path, &bytes) {
                    warn!(namespace = %namespace, code = "CACHE_ERROR", path = %path.display(), error = %e, "cache persistence failed");
                }
            }
        }
    }

    fn report(&self, err: DocsError) {
        warn!(namespace = %self.namespace, code = err.code(), error = %err, "cache error");
    }

    /// Every entry written before this call misses from now on, in memory
    /// and on disk, across restarts.
    ///
    /// The timestamp goes to `<dir>/.invalidated`; a persisted entry created
    /// at or before it is ignored even if a late background write lands
    /// after the directory was cleared.
    pub fn invalidate_all(&self) {
        let now = self.now();
        self.invalidated_at.store(now, Ordering::SeqCst);
        self.lock().invalidate_all();
        if let Some(dir) = &self.persist_dir {
            if let Err(e) = write_entry_blocking(&dir.join(MARKER_FILE), now.to_string().as_bytes()) {
                self.report(DocsError::Cache(format!("mark {}: {}", dir.display(), e)));
            }
            if let Err(e) = clear_dir(dir) {
                self.report(DocsError::Cache(format!("clear {}: {}", dir.display(), e)));
            }
        }
    }

    pub fn sweep(&self) -> usize {
        let now = self.now();
        self.lock().sweep(now)
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

async fn write_entry_async(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

fn write_entry_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

fn read_marker(namespace: &str, dir: &Path) -> Option<i64> {
    let path = dir.join(MARKER_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(namespace, code = "CACHE_ERROR", path = %path.display(), error = %e, "cannot read invalidation marker");
            return None;
        }
    };
    match raw.trim().parse() {
        Ok(at) => Some(at),
        Err(e) => {
            warn!(namespace, code = "CACHE_ERROR", path = %path.display(), error = %e, "bad invalidation marker");
            None
        }
    }
}

fn clear_dir(dir: &Path) -> std::io::Result<()> {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                let path = entry?.path();
                if path.extension().is_some_and(|e| e == "json") {
                    std::fs::remove_file(path)?;
                }
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

// ============ Lifecycle ============

/// Type-erased view of a cache, for sweeping and bulk invalidation.
pub trait ManagedCache: Send + Sync {
    fn namespace(&self) -> &str;
    fn sweep(&self) -> usize;
    fn invalidate_all(&self);
    fn stats(&self) -> CacheStats;
}

impl<V> ManagedCache for CacheManager<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn namespace(&self) -> &str {
        CacheManager::namespace(self)
    }
    fn sweep(&self) -> usize {
        CacheManager::sweep(self)
    }
    fn invalidate_all(&self) {
        CacheManager::invalidate_all(self)
    }
    fn stats(&self) -> CacheStats {
        CacheManager::stats(self)
    }
}

/// Periodic expiry sweep over a set of caches.
///
/// Lazy checks in `get` keep results correct without it; the sweeper
/// only bounds memory held by dead entries.
pub struct CacheSweeper {
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    /// Start sweeping every `interval`. Must be called inside a tokio runtime.
    pub fn start(caches: Vec<Arc<dyn ManagedCache>>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for cache in &caches {
                    let removed = cache.sweep();
                    if removed > 0 {
                        debug!(namespace = cache.namespace(), removed, "swept expired cache entries");
                    }
                }
            }
        });
        Self { handle }
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doclink_core::cache::ManualClock;
    use tempfile::TempDir;

    fn policy(ttl_ms: i64) -> CachePolicy {
        CachePolicy {
            ttl_ms,
            max_size: 10,
            version: "1.0.0".to_string(),
        }
    }

    fn persisted(tmp: &TempDir, clock: Arc<ManualClock>, version: &str) -> CacheManager<String> {
        let settings = CacheConfig {
            persist_to_disk: true,
            dir: tmp.path().to_path_buf(),
            version: version.to_string(),
            ..CacheConfig::default()
        };
        let policy = CachePolicy {
            version: version.to_string(),
            ..policy(5000)
        };
        CacheManager::new("test", &settings, policy, clock)
    }

    #[tokio::test]
    async fn test_ttl_scenario_with_manual_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: CacheManager<i32> = CacheManager::in_memory("t", policy(5000), clock.clone());
        cache.set("x", 1);
        clock.set(4000);
        assert_eq!(cache.get("x").await, Some(1));
        clock.set(6000);
        assert_eq!(cache.get("x").await, None);
    }

    #[tokio::test]
    async fn test_invalidate_all_misses_everything() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: CacheManager<i32> = CacheManager::in_memory("t", policy(0), clock.clone());
        cache.set("a", 1);
        cache.set("b", 2);
        cache.invalidate_all();
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, None);
        clock.advance(1);
        cache.set("a", 3);
        assert_eq!(cache.get("a").await, Some(3));
    }

    #[test]
    fn test_blocking_persist_and_restore_outside_runtime() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(100));
        let writer = persisted(&tmp, clock.clone(), "1.0.0");
        writer.set("page:intro", "hello".to_string());

        let files: Vec<_> = std::fs::read_dir(tmp.path().join("test")).unwrap().collect();
        assert_eq!(files.len(), 1);

        let reader = persisted(&tmp, clock.clone(), "1.0.0");
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert_eq!(rt.block_on(reader.get("page:intro")), Some("hello".to_string()));
        assert_eq!(reader.get_cached("page:intro"), Some("hello".to_string()));

        // A new version ignores the persisted entry.
        let upgraded = persisted(&tmp, clock.clone(), "2.0.0");
        assert_eq!(rt.block_on(upgraded.get("page:intro")), None);

        // So does an expired one.
        clock.set(100 + 5000);
        let later = persisted(&tmp, clock, "1.0.0");
        assert_eq!(rt.block_on(later.get("page:intro")), None);
    }

    #[test]
    fn test_invalidate_all_clears_persisted_entries() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(100));
        let cache = persisted(&tmp, clock.clone(), "1.0.0");
        cache.set("k", "v".to_string());
        cache.invalidate_all();

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert_eq!(rt.block_on(cache.get("k")), None);
        let remaining: Vec<_> = std::fs::read_dir(tmp.path().join("test"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining, vec![".invalidated".to_string()]);
    }

    #[tokio::test]
    async fn test_invalidation_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(100));
        let cache = persisted(&tmp, clock.clone(), "1.0.0");
        cache.set("k", "stale".to_string());
        cache.invalidate_all();

        // A background write may land after the directory was cleared.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let entry = PersistedEntry {
            key: "k".to_string(),
            entry: CacheEntry {
                value: "stale".to_string(),
                created: 100,
                last_accessed: 100,
                version: "1.0.0".to_string(),
            },
        };
        let path = cache.entry_path("k").unwrap();
        std::fs::write(&path, serde_json::to_vec(&entry).unwrap()).unwrap();

        let restarted = persisted(&tmp, clock.clone(), "1.0.0");
        assert_eq!(restarted.get("k").await, None);

        clock.advance(1);
        restarted.set("k", "fresh".to_string());
        tokio::time::sleep(Duration::from_millis(100)).await;
        let again = persisted(&tmp, clock, "1.0.0");
        assert_eq!(again.get("k").await, Some("fresh".to_string()));
    }

    #[test]
    fn test_unwritable_dir_does_not_fail_set() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let settings = CacheConfig {
            persist_to_disk: true,
            dir: blocker,
            ..CacheConfig::default()
        };
        let clock = Arc::new(ManualClock::new(0));
        let cache: CacheManager<i32> = CacheManager::new("ns", &settings, policy(0), clock);
        cache.set("k", 7);
        assert_eq!(cache.get_cached("k"), Some(7));
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: Arc<CacheManager<i32>> =
            Arc::new(CacheManager::in_memory("sweep", policy(10), clock.clone()));
        cache.set("a", 1);
        clock.set(100);

        let sweeper = CacheSweeper::start(
            vec![cache.clone() as Arc<dyn ManagedCache>],
            Duration::from_millis(10),
        );
        for _ in 0..50 {
            if cache.stats().size == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweeper.shutdown();
        assert_eq!(cache.stats().size, 0);
    }
}

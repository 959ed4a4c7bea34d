//! Full-text search over the content directory.
//!
//! The index is a [`SearchSnapshot`] resolved in this order:
//!
//! 1. the `search` cache (`search-index` key, TTL `search.cache_ttl_secs`);
//! 2. the snapshot file at `search.index_path`;
//! 3. a rebuild from `content.root`, written back to `index_path`.
//!
//! A cached or persisted snapshot is still rebuilt when its `fileStats`
//! no longer match the content directory or the file snapshot is older
//! than the TTL. If a rebuild fails while an older snapshot is at hand,
//! search keeps serving the older one.

use anyhow::Result as AnyResult;
use doclink_core::cache::Clock;
use doclink_core::models::{SearchResult, SearchSnapshot};
use doclink_core::scoring::{is_searchable, rank_entries, suggest_titles, SearchParams};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, ManagedCache};
use crate::config::{Config, ContentConfig};
use crate::error::{DocsError, Result};
use crate::indexer::{build_search_snapshot, detect_changes};

const INDEX_KEY: &str = "search-index";

pub struct SearchService {
    content: ContentConfig,
    index_path: PathBuf,
    params: SearchParams,
    ttl_ms: i64,
    cache: Arc<CacheManager<SearchSnapshot>>,
}

/// Snapshot file facts for `doclink index status`.
#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    pub entries: usize,
    pub tracked_files: usize,
    pub timestamp: Option<i64>,
    pub changed: Option<bool>,
}

impl SearchService {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let policy = config.cache.policy_with_ttl(config.search.cache_ttl_secs);
        let ttl_ms = policy.ttl_ms;
        Self {
            content: config.content.clone(),
            index_path: config.search.index_path.clone(),
            params: config.search.params(),
            ttl_ms,
            cache: Arc::new(CacheManager::new("search", &config.cache, policy, clock)),
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn caches(&self) -> Vec<Arc<dyn ManagedCache>> {
        vec![self.cache.clone() as Arc<dyn ManagedCache>]
    }

    /// Ranked results for `query`; at most `limit` (default `max_results`).
    ///
    /// Queries shorter than `min_query_length` return `[]` without loading
    /// the index.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchResult>> {
        if !is_searchable(query, self.params.min_query_length) {
            let err = DocsError::InvalidQuery {
                min: self.params.min_query_length,
            };
            debug!(code = err.code(), query, "query too short");
            return Ok(Vec::new());
        }

        let snapshot = self.snapshot().await?;
        let limit = limit.unwrap_or(self.params.max_results);
        let results = rank_entries(&snapshot.entries(), query.trim(), &self.params, limit);
        debug!(query, results = results.len(), "search complete");
        Ok(results)
    }

    /// Distinct titles of the best matches.
    pub async fn suggestions(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        if !is_searchable(query, self.params.min_query_length) {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot().await?;
        Ok(suggest_titles(&snapshot.entries(), query.trim(), &self.params, limit))
    }

    /// The current index, rebuilding it when needed.
    pub async fn snapshot(&self) -> Result<SearchSnapshot> {
        if let Some(cached) = self.cache.get(INDEX_KEY).await {
            if !self.has_changes(&cached).await {
                return Ok(cached);
            }
            info!("content changed since the cached index was built");
            return self.rebuild_or_keep(Some(cached)).await;
        }

        let persisted = match self.read_persisted().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(code = e.code(), error = %e, "search snapshot unavailable, rebuilding");
                None
            }
        };

        match persisted {
            Some(snapshot) => {
                let age = self.cache.now() - snapshot.timestamp;
                let stale = self.ttl_ms > 0 && age >= self.ttl_ms;
                if !stale && !self.has_changes(&snapshot).await {
                    self.cache.set(INDEX_KEY, snapshot.clone());
                    return Ok(snapshot);
                }
                info!(stale, "persisted search snapshot is out of date");
                self.rebuild_or_keep(Some(snapshot)).await
            }
            None => self.rebuild_or_keep(None).await,
        }
    }

    /// Rebuild, persist and cache the index unconditionally.
    pub async fn rebuild(&self) -> Result<SearchSnapshot> {
        let content = self.content.clone();
        let started = std::time::Instant::now();
        let snapshot = tokio::task::spawn_blocking(move || build_search_snapshot(&content))
            .await
            .map_err(|e| DocsError::SearchEngine(format!("index task failed: {}", e)))?
            .map_err(|e| DocsError::SearchEngine(format!("{:#}", e)))?;

        info!(
            entries = snapshot.index.len(),
            files = snapshot.file_stats.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt search index"
        );

        if let Err(e) = write_snapshot(&self.index_path, &snapshot).await {
            warn!(path = %self.index_path.display(), error = %e, "failed to persist search snapshot");
        }
        self.cache.set(INDEX_KEY, snapshot.clone());
        Ok(snapshot)
    }

    async fn rebuild_or_keep(&self, previous: Option<SearchSnapshot>) -> Result<SearchSnapshot> {
        match self.rebuild().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => match previous {
                Some(old) => {
                    warn!(error = %e, "index rebuild failed, serving previous snapshot");
                    self.cache.set(INDEX_KEY, old.clone());
                    Ok(old)
                }
                None => Err(e),
            },
        }
    }

    async fn read_persisted(&self) -> Result<SearchSnapshot> {
        let raw = match tokio::fs::read_to_string(&self.index_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocsError::IndexNotFound(self.index_path.clone()))
            }
            Err(e) => return Err(DocsError::fs(&self.index_path, e)),
        };
        serde_json::from_str(&raw).map_err(|e| {
            debug!(path = %self.index_path.display(), error = %e, "unparsable search snapshot");
            DocsError::IndexNotFound(self.index_path.clone())
        })
    }

    /// Content changes since `snapshot` was built. A content directory that
    /// cannot be walked counts as unchanged, so prebuilt indexes keep working.
    async fn has_changes(&self, snapshot: &SearchSnapshot) -> bool {
        let content = self.content.clone();
        let stats = snapshot.file_stats.clone();
        match tokio::task::spawn_blocking(move || detect_changes(&content, &stats)).await {
            Ok(Ok(changed)) => changed,
            Ok(Err(e)) => {
                debug!(error = %e, "change detection unavailable");
                false
            }
            Err(e) => {
                warn!(error = %e, "change detection task failed");
                false
            }
        }
    }

    pub async fn status(&self) -> IndexStatus {
        let meta = tokio::fs::metadata(&self.index_path).await.ok();
        let persisted = self.read_persisted().await.ok();
        let changed = match &persisted {
            Some(s) => Some(self.has_changes(s).await),
            None => None,
        };
        IndexStatus {
            path: self.index_path.clone(),
            exists: meta.is_some(),
            size_bytes: meta.map(|m| m.len()).unwrap_or(0),
            entries: persisted.as_ref().map(|s| s.index.len()).unwrap_or(0),
            tracked_files: persisted.as_ref().map(|s| s.file_stats.len()).unwrap_or(0),
            timestamp: persisted.as_ref().map(|s| s.timestamp),
            changed,
        }
    }
}

async fn write_snapshot(path: &Path, snapshot: &SearchSnapshot) -> AnyResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec(snapshot)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

// ============ CLI ============

pub async fn run_search(service: &SearchService, query: &str, limit: Option<usize>) -> AnyResult<()> {
    let results = service.search(query, limit).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.2}] {} / {}", i + 1, result.score, result.category, result.title);
        println!("    path: {}", result.path);
        if !result.description.is_empty() {
            println!("    description: {}", result.description);
        }
        if let Some(ref excerpt) = result.matched_content {
            println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        }
        println!("    id: {}", result.id);
        println!();
    }
    Ok(())
}

pub async fn run_suggest(service: &SearchService, query: &str) -> AnyResult<()> {
    for title in service.suggestions(query, 5).await? {
        println!("{}", title);
    }
    Ok(())
}

pub async fn run_index_build(service: &SearchService) -> AnyResult<()> {
    let snapshot = service.rebuild().await?;
    println!(
        "Indexed {} entries ({} tracked paths) -> {}",
        snapshot.index.len(),
        snapshot.file_stats.len(),
        service.index_path.display()
    );
    Ok(())
}

pub async fn run_index_status(service: &SearchService) -> AnyResult<()> {
    let status = service.status().await;

    println!("doclink search index");
    println!("====================");
    println!();
    println!("  Path:        {}", status.path.display());
    if !status.exists {
        println!("  Status:      missing (built on first search)");
        println!();
        return Ok(());
    }
    println!("  Size:        {}", format_bytes(status.size_bytes));
    println!("  Entries:     {}", status.entries);
    println!("  Tracked:     {}", status.tracked_files);
    if let Some(ts) = status.timestamp {
        let built = chrono::DateTime::from_timestamp_millis(ts)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        println!("  Built:       {}", built);
    }
    let state = match status.changed {
        Some(true) => "stale (content changed)",
        Some(false) => "current",
        None => "unreadable",
    };
    println!("  Status:      {}", state);
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doclink_core::cache::ManualClock;
    use doclink_core::models::SourceType;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn setup() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "wiki/index.json", r#"{"title": "Wiki", "description": "Rust notes and more"}"#);
        write(
            root,
            "wiki/rust.mdx",
            "---\ntitle: Rust\ndescription: Systems language\n---\nRust has ownership.",
        );
        write(
            root,
            "wiki/cargo.mdx",
            "---\ntitle: Cargo\ndescription: Build tool\n---\nCargo builds Rust crates.",
        );
        write(root, "wiki/go.mdx", "---\ntitle: Go\n---\nGoroutines.");
        let config = Config::minimal(root);
        (tmp, config)
    }

    fn service(config: &Config) -> SearchService {
        SearchService::new(config, Arc::new(ManualClock::new(chrono::Utc::now().timestamp_millis())))
    }

    #[tokio::test]
    async fn test_search_ranks_and_persists() {
        let (_tmp, config) = setup();
        let svc = service(&config);

        let results = svc.search("rust", None).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "wiki/rust");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        let cargo = results.iter().find(|r| r.id == "wiki/cargo").unwrap();
        assert!(cargo.matched_content.as_deref().unwrap().contains("Rust"));
        let wiki = results.iter().find(|r| r.id == "wiki").unwrap();
        assert_eq!(wiki.source_type, SourceType::Index);
        assert!(wiki.matched_content.is_none());

        assert!(config.search.index_path.exists());
    }

    #[tokio::test]
    async fn test_short_query_is_empty() {
        let (_tmp, config) = setup();
        let svc = service(&config);
        assert!(svc.search(" r ", None).await.unwrap().is_empty());
        // The index was never touched.
        assert!(!config.search.index_path.exists());
    }

    #[tokio::test]
    async fn test_limit() {
        let (_tmp, config) = setup();
        let svc = service(&config);
        assert_eq!(svc.search("rust", Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_after_file_change() {
        let (tmp, config) = setup();
        let svc = service(&config);
        assert!(svc.search("tokio", None).await.unwrap().is_empty());

        std::thread::sleep(std::time::Duration::from_millis(20));
        write(tmp.path(), "wiki/tokio.mdx", "---\ntitle: Tokio\n---\nAsync runtime.");
        let results = svc.search("tokio", None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/wiki/tokio");
    }

    #[tokio::test]
    async fn test_persisted_snapshot_is_reused() {
        let (_tmp, config) = setup();
        service(&config).rebuild().await.unwrap();

        let svc = service(&config);
        let snap = svc.snapshot().await.unwrap();
        assert_eq!(snap.index.len(), 4);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_triggers_rebuild() {
        let (_tmp, config) = setup();
        write(
            config.search.index_path.parent().unwrap(),
            "index.json",
            "not json",
        );
        let svc = service(&config);
        assert_eq!(svc.search("cargo", None).await.unwrap()[0].id, "wiki/cargo");
    }

    #[tokio::test]
    async fn test_missing_content_without_snapshot_is_error() {
        let tmp = TempDir::new().unwrap();
        let config = Config::minimal(&tmp.path().join("missing"));
        let svc = service(&config);
        let err = svc.search("rust", None).await.unwrap_err();
        assert_eq!(err.code(), "SEARCH_ENGINE_ERROR");
    }

    #[tokio::test]
    async fn test_suggestions() {
        let (_tmp, config) = setup();
        let svc = service(&config);
        let titles = svc.suggestions("rust", 2).await.unwrap();
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0], "Rust");
        assert!(svc.suggestions("x", 5).await.unwrap().is_empty());
    }
}

//! Configuration parsing and validation.
//!
//! doclink is configured via a TOML file (default: `config/doclink.toml`).
//! Every section except `[content]` is optional and falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [content]
//! root = "./content"
//! snapshot_dir = "./public/data"
//! mode = "dynamic"            # or "snapshot"
//!
//! [cache]
//! ttl_secs = 600              # 0 = never expire
//! max_size = 1000
//! persist_to_disk = true
//! dir = "./.cache/doclink"
//! version = "1.0.0"
//! check_interval_secs = 300
//!
//! [search]
//! index_path = "public/search/index.json"
//! min_query_length = 2
//! max_results = 10
//! rank_decay_factor = 0.95
//!
//! [search.base_scores]
//! title = 1.0
//! description = 0.8
//! content = 0.6
//!
//! [keywords]
//! ambiguity_policy = "first"  # first | priority | strict
//! priority = ["wiki", "documents", "journals"]
//!
//! [server]
//! bind = "127.0.0.1:3000"
//! environment = "development" # debug routes are only served in development
//! ```

use anyhow::{bail, Context, Result};
use doclink_core::cache::CachePolicy;
use doclink_core::models::DocCategory;
use doclink_core::resolve::AmbiguityPolicy;
use doclink_core::scoring::{BaseScores, SearchParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub content: ContentConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where doc trees come from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TreeMode {
    /// Walk the content directory on every build.
    #[default]
    Dynamic,
    /// Read `{category}-tree.json` snapshots; no content directory access.
    Snapshot,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    pub root: PathBuf,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    #[serde(default)]
    pub mode: TreeMode,
    /// Serve `status: private` and `status: draft` pages.
    #[serde(default)]
    pub include_private: bool,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("public/data")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default)]
    pub persist_to_disk: bool,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_cache_version")]
    pub version: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_size: default_max_size(),
            persist_to_disk: false,
            dir: default_cache_dir(),
            version: default_cache_version(),
            check_interval_secs: default_check_interval(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    600
}
fn default_max_size() -> usize {
    1000
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache/doclink")
}
fn default_cache_version() -> String {
    "1.0.0".to_string()
}
fn default_check_interval() -> u64 {
    300
}

impl CacheConfig {
    /// Cache policy with the configured TTL.
    pub fn policy(&self) -> CachePolicy {
        self.policy_with_ttl(self.ttl_secs)
    }

    /// Cache policy sharing size and version but with its own TTL.
    pub fn policy_with_ttl(&self, ttl_secs: u64) -> CachePolicy {
        CachePolicy {
            ttl_ms: (ttl_secs as i64).saturating_mul(1000),
            max_size: self.max_size,
            version: self.version.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_min_query_length")]
    pub min_query_length: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_context_length")]
    pub context_length: usize,
    #[serde(default = "default_excerpt_length")]
    pub excerpt_length: usize,
    #[serde(default = "default_rank_decay")]
    pub rank_decay_factor: f64,
    /// TTL of the in-memory search index before a staleness check.
    #[serde(default = "default_index_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub base_scores: BaseScores,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            min_query_length: default_min_query_length(),
            max_results: default_max_results(),
            context_length: default_context_length(),
            excerpt_length: default_excerpt_length(),
            rank_decay_factor: default_rank_decay(),
            cache_ttl_secs: default_index_ttl(),
            base_scores: BaseScores::default(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("public/search/index.json")
}
fn default_min_query_length() -> usize {
    2
}
fn default_max_results() -> usize {
    10
}
fn default_context_length() -> usize {
    50
}
fn default_excerpt_length() -> usize {
    200
}
fn default_rank_decay() -> f64 {
    0.95
}
fn default_index_ttl() -> u64 {
    300
}

impl SearchConfig {
    pub fn params(&self) -> SearchParams {
        SearchParams {
            min_query_length: self.min_query_length,
            max_results: self.max_results,
            context_length: self.context_length,
            excerpt_length: self.excerpt_length,
            rank_decay_factor: self.rank_decay_factor,
            base_scores: self.base_scores,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeywordsConfig {
    #[serde(default = "default_policy")]
    pub ambiguity_policy: String,
    /// Category ranking used by the `priority` policy.
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            ambiguity_policy: default_policy(),
            priority: default_priority(),
        }
    }
}

fn default_policy() -> String {
    "first".to_string()
}
fn default_priority() -> Vec<String> {
    DocCategory::PUBLISHED
        .iter()
        .map(|c| c.as_str().to_string())
        .collect()
}

impl KeywordsConfig {
    pub fn policy(&self) -> Result<AmbiguityPolicy> {
        let policy: AmbiguityPolicy = self.ambiguity_policy.parse()?;
        match policy {
            AmbiguityPolicy::Priority(_) => {
                let order = self
                    .priority
                    .iter()
                    .map(|c| c.parse::<DocCategory>())
                    .collect::<Result<Vec<_>>>()
                    .context("Invalid keywords.priority")?;
                Ok(AmbiguityPolicy::Priority(order))
            }
            other => Ok(other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImagesConfig {
    #[serde(default = "default_thumbnail")]
    pub default_thumbnail: String,
    #[serde(default = "default_image_width")]
    pub width: u32,
    #[serde(default = "default_proxy_timeout")]
    pub proxy_timeout_secs: u64,
    #[serde(default = "default_og_timeout")]
    pub og_timeout_secs: u64,
    #[serde(default = "default_og_ttl")]
    pub og_cache_ttl_secs: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            default_thumbnail: default_thumbnail(),
            width: default_image_width(),
            proxy_timeout_secs: default_proxy_timeout(),
            og_timeout_secs: default_og_timeout(),
            og_cache_ttl_secs: default_og_ttl(),
        }
    }
}

fn default_thumbnail() -> String {
    "/thumbnails/no-image.svg".to_string()
}
fn default_image_width() -> u32 {
    1200
}
fn default_proxy_timeout() -> u64 {
    8
}
fn default_og_timeout() -> u64 {
    10
}
fn default_og_ttl() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            environment: default_environment(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_environment() -> String {
    "production".to_string()
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Config {
    /// Defaults rooted at `root`. Generated files go under `root/.doclink`,
    /// which the tree builder and the indexer both skip.
    pub fn minimal(root: &Path) -> Self {
        Self {
            content: ContentConfig {
                root: root.to_path_buf(),
                snapshot_dir: root.join(".doclink/data"),
                mode: TreeMode::Dynamic,
                include_private: false,
                include_globs: default_include_globs(),
                exclude_globs: Vec::new(),
                follow_symlinks: false,
            },
            cache: CacheConfig {
                dir: root.join(".doclink/cache"),
                ..CacheConfig::default()
            },
            search: SearchConfig {
                index_path: root.join(".doclink/search/index.json"),
                ..SearchConfig::default()
            },
            keywords: KeywordsConfig::default(),
            images: ImagesConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.cache.max_size == 0 {
        bail!("cache.max_size must be > 0");
    }
    if config.cache.check_interval_secs == 0 {
        bail!("cache.check_interval_secs must be > 0");
    }

    let search = &config.search;
    if search.max_results == 0 {
        bail!("search.max_results must be >= 1");
    }
    if !(search.rank_decay_factor > 0.0 && search.rank_decay_factor <= 1.0) {
        bail!("search.rank_decay_factor must be in (0.0, 1.0]");
    }
    let scores = &search.base_scores;
    for (name, value) in [
        ("title", scores.title),
        ("description", scores.description),
        ("content", scores.content),
    ] {
        if !(value.is_finite() && value >= 0.0) {
            bail!("search.base_scores.{} must be a non-negative number", name);
        }
    }

    config.keywords.policy()?;

    match config.server.environment.as_str() {
        "development" | "production" | "test" => {}
        other => bail!(
            "Unknown server.environment: '{}'. Must be development, production, or test.",
            other
        ),
    }

    Ok(())
}

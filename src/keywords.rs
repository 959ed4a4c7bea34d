//! Keyword index service.
//!
//! Builds the keyword index over every published doc tree, memoizes it in
//! the `keywords` cache, and resolves keywords through the `resolve`
//! cache (key `"{keyword}:{docTypeHint}"`). Rebuilding the index flushes
//! the resolve cache so cached links never outlive the index they came
//! from.

use doclink_core::keyword::{build_keyword_index, normalize_keyword, KeywordIndex};
use doclink_core::links::{keyword_refs, render_keyword_links, LinkedMarkdown};
use doclink_core::models::{count_nodes, DocCategory};
use doclink_core::resolve::{resolve_keyword, AmbiguityPolicy, ResolvedLink};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use doclink_core::cache::Clock;

use crate::cache::{CacheManager, ManagedCache};
use crate::config::Config;
use crate::doc_tree::DocTrees;
use crate::error::Result;

const INDEX_KEY: &str = "keyword-index";

/// Summary served by the keyword debug endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordDebugReport {
    pub status: &'static str,
    pub keyword_count: usize,
    pub duplicates: Vec<String>,
    pub doc_tree: DocTreeSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocTreeSummary {
    pub node_count: usize,
    pub top_level_nodes: usize,
}

pub struct KeywordService {
    trees: DocTrees,
    policy: AmbiguityPolicy,
    index_cache: Arc<CacheManager<KeywordIndex>>,
    resolve_cache: Arc<CacheManager<Option<ResolvedLink>>>,
}

impl KeywordService {
    pub fn new(config: &Config, trees: DocTrees, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let policy = config.keywords.policy()?;
        let index_cache = Arc::new(CacheManager::new(
            "keywords",
            &config.cache,
            config.cache.policy(),
            clock.clone(),
        ));
        let resolve_cache = Arc::new(CacheManager::new(
            "resolve",
            &config.cache,
            config.cache.policy(),
            clock,
        ));
        Ok(Self {
            trees,
            policy,
            index_cache,
            resolve_cache,
        })
    }

    pub fn policy(&self) -> &AmbiguityPolicy {
        &self.policy
    }

    pub fn caches(&self) -> Vec<Arc<dyn ManagedCache>> {
        vec![
            self.index_cache.clone() as Arc<dyn ManagedCache>,
            self.resolve_cache.clone() as Arc<dyn ManagedCache>,
        ]
    }

    /// Cached keyword index, rebuilt from the doc trees on a miss.
    pub async fn index(&self) -> Result<KeywordIndex> {
        if let Some(index) = self.index_cache.get(INDEX_KEY).await {
            return Ok(index);
        }

        let forest = self.trees.load_forest()?;
        let index = build_keyword_index(&forest);
        info!(
            keywords = index.len(),
            duplicates = index.duplicates.len(),
            nodes = count_nodes(&forest),
            "built keyword index"
        );
        for dup in &index.duplicates {
            warn!(keyword = %dup, candidates = index.candidates(dup).len(), "duplicate keyword");
        }

        self.resolve_cache.invalidate_all();
        self.index_cache.set(INDEX_KEY, index.clone());
        Ok(index)
    }

    /// Resolve `keyword`, optionally preferring a doc type.
    ///
    /// Unknown doc type hints are ignored.
    pub async fn resolve(&self, keyword: &str, hint: Option<&str>) -> Result<Option<ResolvedLink>> {
        let hint_category = parse_hint(hint);
        let key = format!(
            "{}:{}",
            normalize_keyword(keyword),
            hint_category.map(|c| c.as_str()).unwrap_or("")
        );
        if let Some(cached) = self.resolve_cache.get(&key).await {
            return Ok(cached);
        }

        let index = self.index().await?;
        let resolved = resolve_keyword(&index, keyword, hint_category, &self.policy);
        match &resolved {
            Some(link) if link.ambiguous => warn!(
                keyword = %link.keyword,
                target = %link.target.doc_id,
                alternatives = link.alternatives.len(),
                "ambiguous keyword resolved by policy"
            ),
            Some(_) => {}
            None => debug!(keyword, "keyword not resolved"),
        }
        self.resolve_cache.set(&key, resolved.clone());
        Ok(resolved)
    }

    /// Rewrite `[[keyword]]` links in a markdown body.
    ///
    /// Each distinct keyword goes through [`KeywordService::resolve`], so
    /// links share the `resolve` cache with single lookups.
    pub async fn link_markdown(&self, markdown: &str, hint: Option<&str>) -> Result<LinkedMarkdown> {
        let mut resolved = HashMap::new();
        for keyword in keyword_refs(markdown) {
            let link = self.resolve(&keyword, hint).await?;
            resolved.insert(keyword, link);
        }
        Ok(render_keyword_links(markdown, |k| {
            resolved.get(k).cloned().flatten()
        }))
    }

    pub async fn debug_report(&self) -> Result<KeywordDebugReport> {
        let forest = self.trees.load_forest()?;
        let index = self.index().await?;
        Ok(KeywordDebugReport {
            status: "ok",
            keyword_count: index.len(),
            duplicates: index.duplicates.clone(),
            doc_tree: DocTreeSummary {
                node_count: count_nodes(&forest),
                top_level_nodes: forest.len(),
            },
        })
    }
}

// ============ CLI ============

pub async fn run_keywords(service: &KeywordService, duplicates_only: bool) -> anyhow::Result<()> {
    let index = service.index().await?;
    let keys: Vec<&String> = if duplicates_only {
        index.duplicates.iter().collect()
    } else {
        index.index.keys().collect()
    };
    if keys.is_empty() {
        println!(
            "{}",
            if duplicates_only { "No duplicate keywords." } else { "No keywords." }
        );
        return Ok(());
    }

    println!("{:<32} {:>5}   TARGETS", "KEYWORD", "DOCS");
    println!("{}", "-".repeat(76));
    for key in keys {
        let candidates = index.candidates(key);
        let targets: Vec<&str> = candidates.iter().map(|c| c.path.as_str()).collect();
        println!("{:<32} {:>5}   {}", key, candidates.len(), targets.join(", "));
    }
    println!();
    println!(
        "{} keywords, {} duplicates",
        index.len(),
        index.duplicates.len()
    );
    Ok(())
}

pub async fn run_resolve(
    service: &KeywordService,
    keyword: &str,
    doc_type: Option<&str>,
) -> anyhow::Result<()> {
    match service.resolve(keyword, doc_type).await? {
        Some(link) => {
            println!("{} -> {}", link.keyword, link.target.path);
            println!("    doc: {} ({})", link.target.doc_id, link.target.doc_type);
            if link.ambiguous {
                println!("    ambiguous: picked by '{}' policy", service.policy().name());
            }
            for alt in &link.alternatives {
                println!("    also: {} ({})", alt.path, alt.doc_id);
            }
        }
        None => println!("No match for '{}'.", keyword),
    }
    Ok(())
}

pub async fn run_link(
    service: &KeywordService,
    file: &std::path::Path,
    doc_type: Option<&str>,
) -> anyhow::Result<()> {
    let markdown = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
    let out = service.link_markdown(&markdown, doc_type).await?;
    for keyword in &out.unresolved {
        warn!(keyword = %keyword, file = %file.display(), "unresolved keyword");
    }
    print!("{}", out.content);
    if !out.content.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn parse_hint(hint: Option<&str>) -> Option<DocCategory> {
    let raw = hint.map(str::trim).filter(|h| !h.is_empty())?;
    match raw.parse() {
        Ok(c) => Some(c),
        Err(_) => {
            debug!(hint = raw, "ignoring unknown doc type hint");
            None
        }
    }
}

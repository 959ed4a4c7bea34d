//! Search snapshot builder.
//!
//! Scans `content.root` and produces a [`SearchSnapshot`]:
//!
//! | Source | `sourceType` | `id` |
//! |--------|--------------|------|
//! | `<category>/index.json`, `<category>/<type>/index.json` | `index` | directory path |
//! | included `*.md` / `*.mdx` files | `content` | relative path without extension |
//!
//! Every walked file and directory is recorded in `fileStats`
//! (relative path → mtime in ms) so [`detect_changes`] can tell whether
//! a persisted snapshot is still current.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use doclink_core::models::{IndexEntry, SearchSnapshot, SourceType};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ContentConfig;
use crate::frontmatter::{parse_document, FrontMatter};

/// Directory descriptors deeper than `<category>/<type>/` are not indexed.
const MAX_DESCRIPTOR_DEPTH: usize = 2;

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn exclude_set(content: &ContentConfig) -> Result<GlobSet> {
    let mut patterns = vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    patterns.extend(content.exclude_globs.clone());
    build_globset(&patterns)
}

fn mtime_millis(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(rel: &str) -> bool {
    rel.split('/')
        .any(|part| part.starts_with('.') || part.starts_with('_'))
}

fn strip_markdown_ext(rel: &str) -> Option<&str> {
    rel.strip_suffix(".mdx").or_else(|| rel.strip_suffix(".md"))
}

/// Walk the content root, yielding `(relative path, metadata)` for every
/// entry that passes the hidden-name and exclude filters.
///
/// Entries that cannot be read (permissions, broken links) are skipped
/// with a warning.
fn walk(content: &ContentConfig) -> Result<Vec<(String, std::fs::Metadata)>> {
    let root = &content.root;
    if !root.is_dir() {
        bail!("Content root does not exist: {}", root.display());
    }
    let excludes = exclude_set(content)?;

    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(content.follow_symlinks)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = ?e.path(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let rel = relative(root, entry.path());
        if is_hidden(&rel) || excludes.is_match(&rel) {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => out.push((rel, meta)),
            Err(e) => warn!(path = %rel, error = %e, "skipping entry without metadata"),
        }
    }
    Ok(out)
}

fn content_entry(rel: &str, raw: &str, include_private: bool) -> Result<Option<IndexEntry>> {
    let doc = parse_document(raw)?;
    let fm = doc.front_matter.unwrap_or_default();
    if fm.hidden || (!include_private && fm.is_restricted()) {
        return Ok(None);
    }
    let id = strip_markdown_ext(rel).unwrap_or(rel).to_string();
    let stem = id.rsplit('/').next().unwrap_or(&id).to_string();
    let category = fm
        .category
        .clone()
        .unwrap_or_else(|| id.split('/').next().unwrap_or_default().to_string());

    Ok(Some(IndexEntry {
        title: fm.title.unwrap_or(stem),
        description: fm.description.unwrap_or_default(),
        content: doc.body,
        path: fm.slug.unwrap_or_else(|| format!("/{}", id)),
        category,
        source_type: SourceType::Content,
        thumbnail: fm.thumbnail,
        id,
    }))
}

fn descriptor_entry(dir: &str, fm: FrontMatter) -> IndexEntry {
    let name = dir.rsplit('/').next().unwrap_or(dir);
    IndexEntry {
        id: dir.to_string(),
        title: fm
            .title
            .unwrap_or_else(|| doclink_core::tree::title_from_file_name(name)),
        description: fm.description.unwrap_or_default(),
        content: String::new(),
        path: format!("/{}", dir),
        category: dir.split('/').next().unwrap_or_default().to_string(),
        source_type: SourceType::Index,
        thumbnail: fm.thumbnail,
    }
}

/// Build a fresh search snapshot from `content`.
///
/// Unreadable or malformed files are skipped with a warning; only a
/// missing content root or an invalid glob fails the build.
pub fn build_search_snapshot(content: &ContentConfig) -> Result<SearchSnapshot> {
    let includes = build_globset(&content.include_globs)?;
    let mut index = BTreeMap::new();
    let mut file_stats = BTreeMap::new();

    for (rel, meta) in walk(content)? {
        file_stats.insert(rel.clone(), mtime_millis(&meta));
        if !meta.is_file() {
            continue;
        }
        let path = content.root.join(&rel);

        if rel.ends_with("/index.json") {
            let dir = &rel[..rel.len() - "/index.json".len()];
            if dir.split('/').count() > MAX_DESCRIPTOR_DEPTH {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|raw| Ok(serde_json::from_str::<FrontMatter>(&raw)?));
            match parsed {
                Ok(fm) if fm.hidden || (!content.include_private && fm.is_restricted()) => {}
                Ok(fm) => {
                    let entry = descriptor_entry(dir, fm);
                    index.entry(entry.id.clone()).or_insert(entry);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid descriptor"),
            }
            continue;
        }

        if strip_markdown_ext(&rel).is_none() || !includes.is_match(&rel) {
            continue;
        }
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        match content_entry(&rel, &raw, content.include_private) {
            Ok(Some(entry)) => {
                index.insert(entry.id.clone(), entry);
            }
            Ok(None) => debug!(path = %rel, "skipping hidden or restricted page"),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unparsable file"),
        }
    }

    Ok(SearchSnapshot {
        timestamp: Utc::now().timestamp_millis(),
        index,
        file_stats,
    })
}

/// True when any walked path was added, removed, or modified since
/// `file_stats` was recorded.
pub fn detect_changes(content: &ContentConfig, file_stats: &BTreeMap<String, i64>) -> Result<bool> {
    let mut seen = BTreeSet::new();
    for (rel, meta) in walk(content)? {
        match file_stats.get(&rel) {
            Some(&recorded) if mtime_millis(&meta) <= recorded => {}
            Some(_) => {
                debug!(path = %rel, "modified since last index");
                return Ok(true);
            }
            None => {
                debug!(path = %rel, "new since last index");
                return Ok(true);
            }
        }
        seen.insert(rel);
    }
    if let Some(gone) = file_stats.keys().find(|k| !seen.contains(*k)) {
        debug!(path = %gone, "removed since last index");
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn sample() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("content");
        write(&root, "wiki/index.json", r#"{"title": "Wiki", "description": "Team wiki"}"#);
        write(&root, "wiki/guides/index.json", r#"{"title": "Guides"}"#);
        write(&root, "wiki/guides/deep/index.json", r#"{"title": "Too deep"}"#);
        write(
            &root,
            "wiki/guides/rust.mdx",
            "---\ntitle: Rust Guide\ndescription: Learn Rust\n---\nOwnership and borrowing.",
        );
        write(&root, "wiki/plain.md", "No front matter here.");
        write(&root, "wiki/custom.mdx", "---\ntitle: Custom\nslug: /custom-path\ncategory: misc\n---\n");
        write(&root, "wiki/secret.mdx", "---\ntitle: Secret\nstatus: private\n---\n");
        write(&root, "wiki/_draft.mdx", "---\ntitle: Underscore\n---\n");
        write(&root, "wiki/tucked.mdx", "---\ntitle: Tucked\nhidden: true\n---\n");
        write(&root, "wiki/notes.txt", "not markdown");
        let config = Config::minimal(&root);
        (tmp, config)
    }

    #[test]
    fn test_builds_index_and_content_entries() {
        let (_tmp, config) = sample();
        let snap = build_search_snapshot(&config.content).unwrap();

        let wiki = &snap.index["wiki"];
        assert_eq!(wiki.source_type, SourceType::Index);
        assert_eq!(wiki.description, "Team wiki");
        assert_eq!(wiki.path, "/wiki");
        assert_eq!(snap.index["wiki/guides"].title, "Guides");
        assert!(!snap.index.contains_key("wiki/guides/deep"));

        let rust = &snap.index["wiki/guides/rust"];
        assert_eq!(rust.source_type, SourceType::Content);
        assert_eq!(rust.path, "/wiki/guides/rust");
        assert_eq!(rust.category, "wiki");
        assert!(rust.content.contains("Ownership"));

        assert_eq!(snap.index["wiki/plain"].title, "plain");
        let custom = &snap.index["wiki/custom"];
        assert_eq!(custom.path, "/custom-path");
        assert_eq!(custom.category, "misc");

        assert!(!snap.index.contains_key("wiki/secret"));
        assert!(!snap.index.contains_key("wiki/_draft"));
        assert!(!snap.index.contains_key("wiki/tucked"));
        assert!(!snap.index.contains_key("wiki/notes"));
        assert!(snap.file_stats.contains_key("wiki/notes.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_does_not_fail_build() {
        let (_tmp, mut config) = sample();
        let root = config.content.root.clone();
        std::os::unix::fs::symlink(root.join("nowhere"), root.join("wiki/broken")).unwrap();
        config.content.follow_symlinks = true;

        let snap = build_search_snapshot(&config.content).unwrap();
        assert!(snap.index.contains_key("wiki/guides/rust"));
        assert!(!snap.file_stats.contains_key("wiki/broken"));
        assert!(!detect_changes(&config.content, &snap.file_stats).unwrap());
    }

    #[test]
    fn test_exclude_globs() {
        let (_tmp, mut config) = sample();
        config.content.exclude_globs = vec!["wiki/guides/**".to_string()];
        let snap = build_search_snapshot(&config.content).unwrap();
        assert!(!snap.index.contains_key("wiki/guides/rust"));
        assert!(snap.index.contains_key("wiki/plain"));
    }

    #[test]
    fn test_detect_changes() {
        let (_tmp, config) = sample();
        let root = config.content.root.clone();
        let snap = build_search_snapshot(&config.content).unwrap();
        assert!(!detect_changes(&config.content, &snap.file_stats).unwrap());

        write(&root, "wiki/new-page.mdx", "---\ntitle: New\n---\n");
        assert!(detect_changes(&config.content, &snap.file_stats).unwrap());

        let snap = build_search_snapshot(&config.content).unwrap();
        fs::remove_file(root.join("wiki/new-page.mdx")).unwrap();
        let mut stats = snap.file_stats.clone();
        // Directory mtimes change too; keep only the removed file in play.
        for (k, v) in stats.iter_mut() {
            if !k.ends_with(".mdx") {
                *v = i64::MAX;
            }
        }
        assert!(detect_changes(&config.content, &stats).unwrap());
    }

    #[test]
    fn test_newer_mtime_is_a_change() {
        let (_tmp, config) = sample();
        let snap = build_search_snapshot(&config.content).unwrap();
        let mut stats = snap.file_stats.clone();
        if let Some(v) = stats.get_mut("wiki/plain.md") {
            *v -= 10_000;
        }
        assert!(detect_changes(&config.content, &stats).unwrap());
    }

    #[test]
    fn test_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let config = Config::minimal(&tmp.path().join("nope"));
        assert!(build_search_snapshot(&config.content).is_err());
    }
}

//! Document tree construction.
//!
//! Walks `<content.root>/<category>` one directory level at a time and
//! produces a [`DocNode`] forest:
//!
//! - names starting with `.` or `_` are skipped;
//! - `*.md` / `*.mdx` files (except `index.*`) become leaf nodes, titled
//!   from front matter or, failing that, the file name;
//! - directories become nodes when they have children or a descriptor
//!   (`index.json` / `index.mdx`);
//! - `status: private|draft` entries are hidden unless
//!   `content.include_private` is set;
//! - pages and directories with `hidden: true` are always left out;
//! - siblings are sorted by `(order, slug)`.
//!
//! In snapshot mode the same shapes are read from
//! `<content.snapshot_dir>/<category>-tree.json` instead; see
//! [`crate::snapshot`].

use doclink_core::models::{DocCategory, DocNode};
use doclink_core::tree::{find_subtree, sort_siblings, title_from_file_name};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{Config, TreeMode};
use crate::error::{DocsError, Result};
use crate::frontmatter::{read_descriptor, read_document};
use crate::snapshot::load_snapshot;

fn is_page(name: &str) -> bool {
    (name.ends_with(".mdx") || name.ends_with(".md")) && name != "index.mdx" && name != "index.md"
}

fn walk_error(dir: &Path, err: walkdir::Error) -> DocsError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
    DocsError::fs(path, source)
}

/// Build the tree for `category` under `root`.
///
/// Fails with [`DocsError::FileSystem`] if the category directory is
/// missing or unreadable; an existing empty directory yields `[]`.
pub fn build_doc_tree(
    root: &Path,
    category: DocCategory,
    include_private: bool,
) -> Result<Vec<DocNode>> {
    build_doc_subtree(root, category, None, include_private)
}

/// Like [`build_doc_tree`], rooted at `sub_dir` inside the category.
/// Slugs stay relative to the category directory.
pub fn build_doc_subtree(
    root: &Path,
    category: DocCategory,
    sub_dir: Option<&str>,
    include_private: bool,
) -> Result<Vec<DocNode>> {
    let base = root.join(category.as_str());
    let sub = sub_dir.map(|s| s.trim_matches('/')).unwrap_or("");
    if sub.split('/').any(|part| part == "..") {
        return Err(DocsError::fs(
            base.join(sub),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "parent segments not allowed"),
        ));
    }
    let dir = if sub.is_empty() { base } else { base.join(sub) };

    let meta = std::fs::metadata(&dir).map_err(|e| DocsError::fs(&dir, e))?;
    if !meta.is_dir() {
        return Err(DocsError::fs(
            &dir,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let builder = LevelBuilder {
        category,
        include_private,
    };
    let nodes = builder.build(&dir, sub)?;
    debug!(category = %category, sub_dir = sub, nodes = nodes.len(), "built doc tree");
    Ok(nodes)
}

struct LevelBuilder {
    category: DocCategory,
    include_private: bool,
}

impl LevelBuilder {
    fn build(&self, dir: &Path, parent_slug: &str) -> Result<Vec<DocNode>> {
        let mut nodes = Vec::new();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| walk_error(dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || name.starts_with('_') {
                continue;
            }
            let slug = if parent_slug.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", parent_slug, name)
            };

            if entry.file_type().is_dir() {
                if let Some(node) = self.directory_node(entry.path(), &name, slug)? {
                    nodes.push(node);
                }
            } else if is_page(&name) {
                if let Some(node) = self.page_node(entry.path(), &name, &slug) {
                    nodes.push(node);
                }
            }
        }

        sort_siblings(&mut nodes);
        Ok(nodes)
    }

    fn directory_node(&self, path: &Path, name: &str, slug: String) -> Result<Option<DocNode>> {
        let descriptor = match read_descriptor(path) {
            Ok(d) => d,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid directory descriptor");
                None
            }
        };
        if descriptor
            .as_ref()
            .is_some_and(|d| d.hidden || (!self.include_private && d.is_restricted()))
        {
            return Ok(None);
        }

        let children = self.build(path, &slug)?;
        if children.is_empty() && descriptor.is_none() {
            return Ok(None);
        }

        let fm = descriptor.unwrap_or_default();
        Ok(Some(DocNode {
            id: format!("{}/{}", self.category, slug),
            title: fm.title.unwrap_or_else(|| title_from_file_name(name)),
            slug,
            category: self.category,
            description: fm.description,
            order: fm.order.unwrap_or(0),
            keywords: fm.keywords,
            children,
        }))
    }

    fn page_node(&self, path: &Path, name: &str, slug: &str) -> Option<DocNode> {
        let slug = slug
            .strip_suffix(".mdx")
            .or_else(|| slug.strip_suffix(".md"))
            .unwrap_or(slug)
            .to_string();

        let fm = match read_document(path) {
            Ok(doc) => doc.front_matter.unwrap_or_default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid front matter, using file name as title");
                Default::default()
            }
        };
        if fm.hidden || (!self.include_private && fm.is_restricted()) {
            return None;
        }

        Some(DocNode {
            id: format!("{}/{}", self.category, slug),
            title: fm.title.unwrap_or_else(|| title_from_file_name(name)),
            slug,
            category: self.category,
            description: fm.description,
            order: fm.order.unwrap_or(0),
            keywords: fm.keywords,
            children: Vec::new(),
        })
    }
}

/// A top-level section of a category (e.g. `documents/guides`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocType {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: DocCategory,
    pub order: i64,
    pub node_count: usize,
}

/// Doc types of one category with display metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDocTypes {
    pub category: DocCategory,
    pub title: String,
    pub order: u32,
    pub doc_types: Vec<DocType>,
}

/// Top-level directory nodes of a category tree.
pub fn doc_types(nodes: &[DocNode]) -> Vec<DocType> {
    nodes
        .iter()
        .filter(|n| !n.children.is_empty())
        .map(|n| DocType {
            id: n.slug.clone(),
            title: n.title.clone(),
            description: n.description.clone(),
            category: n.category,
            order: n.order,
            node_count: doclink_core::models::count_nodes(&n.children),
        })
        .collect()
}

/// Tree provider that honours `content.mode`.
#[derive(Clone)]
pub struct DocTrees {
    config: Arc<Config>,
}

impl DocTrees {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn mode(&self) -> TreeMode {
        self.config.content.mode
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.config.content.snapshot_dir.clone()
    }

    /// Tree for `category`, optionally narrowed to `sub_dir`.
    pub fn load(&self, category: DocCategory, sub_dir: Option<&str>) -> Result<Vec<DocNode>> {
        match self.config.content.mode {
            TreeMode::Dynamic => build_doc_subtree(
                &self.config.content.root,
                category,
                sub_dir,
                self.config.content.include_private,
            ),
            TreeMode::Snapshot => {
                let nodes = load_snapshot(&self.config.content.snapshot_dir, category)?;
                Ok(match sub_dir {
                    Some(sub) => find_subtree(&nodes, sub).map(<[DocNode]>::to_vec).unwrap_or_default(),
                    None => nodes,
                })
            }
        }
    }

    /// Trees of every published category, concatenated in display order.
    ///
    /// Categories without content are skipped with a warning; any other
    /// failure aborts the build.
    pub fn load_forest(&self) -> Result<Vec<DocNode>> {
        let mut forest = Vec::new();
        for category in DocCategory::PUBLISHED {
            match self.load(category, None) {
                Ok(nodes) => forest.extend(nodes),
                Err(DocsError::FileSystem { path, source })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    warn!(category = %category, path = %path.display(), "category directory missing, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(forest)
    }

    /// Doc types of every published category.
    pub fn list_doc_types(&self) -> Result<Vec<CategoryDocTypes>> {
        let mut out = Vec::new();
        for category in DocCategory::PUBLISHED {
            let nodes = match self.load(category, None) {
                Ok(nodes) => nodes,
                Err(DocsError::FileSystem { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            out.push(CategoryDocTypes {
                category,
                title: title_from_file_name(category.as_str()),
                order: category.display_order(),
                doc_types: doc_types(&nodes),
            });
        }
        Ok(out)
    }
}

// ============ CLI ============

/// Print one category tree, indented, or as JSON.
pub fn run_tree(
    trees: &DocTrees,
    category: DocCategory,
    sub_dir: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let nodes = trees.load(category, sub_dir)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }
    if nodes.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    print_nodes(&nodes, 0);
    println!();
    println!("{} nodes", doclink_core::models::count_nodes(&nodes));
    Ok(())
}

fn print_nodes(nodes: &[DocNode], depth: usize) {
    for node in nodes {
        println!("{}- {} ({})", "  ".repeat(depth), node.title, node.path());
        print_nodes(&node.children, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn sample_content() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "wiki/zeta.mdx", "---\ntitle: Zeta\n---\nbody");
        write(root, "wiki/alpha.mdx", "---\ntitle: Alpha\n---\nbody");
        write(root, "wiki/first.md", "---\ntitle: Pinned\norder: -1\n---\nbody");
        write(root, "wiki/no-front-matter.mdx", "# plain");
        write(root, "wiki/broken.mdx", "---\norder: [1]\n---\nbody");
        write(root, "wiki/secret.mdx", "---\ntitle: Secret\nstatus: private\n---\n");
        write(root, "wiki/_partial.mdx", "---\ntitle: Partial\n---\n");
        write(root, "wiki/.hidden.mdx", "---\ntitle: Hidden\n---\n");
        write(root, "wiki/notes.txt", "ignored");
        write(root, "wiki/guides/index.json", r#"{"title": "Guides", "order": 5, "description": "How-tos"}"#);
        write(root, "wiki/guides/setup.mdx", "---\ntitle: Setup\n---\n");
        write(root, "wiki/empty-dir/.keep", "");
        write(root, "wiki/drafts/index.mdx", "---\ntitle: Drafts\nstatus: draft\n---\n");
        write(root, "wiki/drafts/one.mdx", "---\ntitle: One\n---\n");
        fs::create_dir_all(root.join("journals")).unwrap();
        tmp
    }

    #[test]
    fn test_builds_sorted_tree() {
        let tmp = sample_content();
        let nodes = build_doc_tree(tmp.path(), DocCategory::Wiki, false).unwrap();
        let titles: Vec<_> = nodes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Pinned", "Alpha", "Broken", "No Front Matter", "Zeta", "Guides"]
        );

        let guides = nodes.iter().find(|n| n.slug == "guides").unwrap();
        assert_eq!(guides.id, "wiki/guides");
        assert_eq!(guides.description.as_deref(), Some("How-tos"));
        assert_eq!(guides.children.len(), 1);
        assert_eq!(guides.children[0].slug, "guides/setup");
        assert_eq!(guides.children[0].id, "wiki/guides/setup");
    }

    #[test]
    fn test_private_content_toggle() {
        let tmp = sample_content();
        let public = build_doc_tree(tmp.path(), DocCategory::Wiki, false).unwrap();
        assert!(!public.iter().any(|n| n.slug == "secret" || n.slug == "drafts"));

        let all = build_doc_tree(tmp.path(), DocCategory::Wiki, true).unwrap();
        assert!(all.iter().any(|n| n.slug == "secret"));
        assert!(all.iter().any(|n| n.slug == "drafts"));
    }

    #[test]
    fn test_hidden_pages_and_sections_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "wiki/shown.mdx", "---\ntitle: Shown\n---\n");
        write(root, "wiki/tucked.mdx", "---\ntitle: Tucked\nhidden: true\n---\n");
        write(root, "wiki/archive/index.json", r#"{"title": "Archive", "hidden": true}"#);
        write(root, "wiki/archive/old.mdx", "---\ntitle: Old\n---\n");

        for include_private in [false, true] {
            let nodes = build_doc_tree(root, DocCategory::Wiki, include_private).unwrap();
            let slugs: Vec<_> = nodes.iter().map(|n| n.slug.as_str()).collect();
            assert_eq!(slugs, vec!["shown"]);
        }
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let tmp = sample_content();
        let a = build_doc_tree(tmp.path(), DocCategory::Wiki, false).unwrap();
        let b = build_doc_tree(tmp.path(), DocCategory::Wiki, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_and_missing_directories() {
        let tmp = sample_content();
        assert!(build_doc_tree(tmp.path(), DocCategory::Journals, false)
            .unwrap()
            .is_empty());

        let err = build_doc_tree(tmp.path(), DocCategory::Documents, false).unwrap_err();
        assert_eq!(err.code(), "FILE_SYSTEM_ERROR");
    }

    #[test]
    fn test_sub_dir() {
        let tmp = sample_content();
        let nodes = build_doc_subtree(tmp.path(), DocCategory::Wiki, Some("guides"), false).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].slug, "guides/setup");

        assert!(build_doc_subtree(tmp.path(), DocCategory::Wiki, Some("../wiki"), false).is_err());
        assert!(build_doc_subtree(tmp.path(), DocCategory::Wiki, Some("nope"), false).is_err());
    }

    #[test]
    fn test_forest_skips_missing_categories() {
        let tmp = sample_content();
        let trees = DocTrees::new(Arc::new(Config::minimal(tmp.path())));
        let forest = trees.load_forest().unwrap();
        assert!(forest.iter().all(|n| n.category == DocCategory::Wiki));
        assert!(!forest.is_empty());
    }

    #[test]
    fn test_doc_types_listing() {
        let tmp = sample_content();
        let trees = DocTrees::new(Arc::new(Config::minimal(tmp.path())));
        let listing = trees.list_doc_types().unwrap();
        assert_eq!(listing.len(), 3);
        assert_eq!(listing[0].category, DocCategory::Documents);
        assert!(listing[0].doc_types.is_empty());
        let wiki = &listing[1];
        assert_eq!(wiki.order, 2);
        assert_eq!(wiki.doc_types.len(), 1);
        assert_eq!(wiki.doc_types[0].id, "guides");
        assert_eq!(wiki.doc_types[0].node_count, 1);
    }
}

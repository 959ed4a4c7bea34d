//! Tree helpers shared by the filesystem builder and the snapshot loader.
//!
//! Snapshots are the precomputed `{category}-tree.json` files used where
//! the content directory cannot be walked. They go through
//! [`parse_tree_snapshot`], which either yields a well-formed forest or an
//! explicit error; a malformed snapshot is never silently treated as empty.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;

use crate::models::{walk_nodes, DocCategory, DocNode};

/// Display title derived from a file or directory name.
///
/// `getting-started_guide.mdx` becomes `Getting Started Guide`.
pub fn title_from_file_name(name: &str) -> String {
    let stem = name
        .strip_suffix(".mdx")
        .or_else(|| name.strip_suffix(".md"))
        .unwrap_or(name);
    stem.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sort siblings by explicit `order`, then by slug (file-name order).
pub fn sort_siblings(nodes: &mut [DocNode]) {
    nodes.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.slug.cmp(&b.slug)));
}

/// Parse and validate one category's tree snapshot.
///
/// Every node must belong to `category` and ids must be unique.
pub fn parse_tree_snapshot(category: DocCategory, json: &str) -> Result<Vec<DocNode>> {
    let nodes: Vec<DocNode> = serde_json::from_str(json)
        .with_context(|| format!("Invalid {} tree snapshot", category))?;

    let mut ids = HashSet::new();
    let mut problem = None;
    walk_nodes(&nodes, &mut |node| {
        if problem.is_some() {
            return;
        }
        if node.category != category {
            problem = Some(format!(
                "node '{}' has category '{}', expected '{}'",
                node.id, node.category, category
            ));
        } else if !ids.insert(node.id.clone()) {
            problem = Some(format!("duplicate node id '{}'", node.id));
        }
    });
    if let Some(p) = problem {
        bail!("Invalid {} tree snapshot: {}", category, p);
    }

    Ok(nodes)
}

/// Children of the node whose slug is `sub_dir`, if any.
pub fn find_subtree<'a>(nodes: &'a [DocNode], sub_dir: &str) -> Option<&'a [DocNode]> {
    let wanted = sub_dir.trim_matches('/');
    if wanted.is_empty() {
        return Some(nodes);
    }
    for node in nodes {
        if node.slug == wanted {
            return Some(&node.children);
        }
        if wanted.starts_with(&format!("{}/", node.slug)) {
            if let Some(found) = find_subtree(&node.children, wanted) {
                return Some(found);
            }
        }
    }
    None
}

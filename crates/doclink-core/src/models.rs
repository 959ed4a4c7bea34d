//! Core data models shared by the tree builder, keyword index and search.
//!
//! All wire-facing types serialize with camelCase field names so the JSON
//! snapshots and HTTP responses match what the docs site front end reads.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Content category a document tree belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocCategory {
    Documents,
    Wiki,
    Journals,
    Development,
    Other,
}

impl DocCategory {
    /// Categories published on the site, in display order.
    pub const PUBLISHED: [DocCategory; 3] = [
        DocCategory::Documents,
        DocCategory::Wiki,
        DocCategory::Journals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocCategory::Documents => "documents",
            DocCategory::Wiki => "wiki",
            DocCategory::Journals => "journals",
            DocCategory::Development => "development",
            DocCategory::Other => "other",
        }
    }

    /// Display position on the doc-types listing.
    pub fn display_order(&self) -> u32 {
        match self {
            DocCategory::Documents => 1,
            DocCategory::Wiki => 2,
            DocCategory::Journals => 3,
            DocCategory::Development => 4,
            DocCategory::Other => 5,
        }
    }
}

impl fmt::Display for DocCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "documents" => Ok(DocCategory::Documents),
            "wiki" => Ok(DocCategory::Wiki),
            "journals" => Ok(DocCategory::Journals),
            "development" => Ok(DocCategory::Development),
            "other" => Ok(DocCategory::Other),
            other => bail!(
                "Unknown doc category: '{}'. Must be documents, wiki, journals, development, or other.",
                other
            ),
        }
    }
}

/// A node in a category's document tree.
///
/// `id` is `"{category}/{slug}"` and unique within one category tree.
/// `children` are ordered for display; the tree is a strict hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocNode {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub category: DocCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub children: Vec<DocNode>,
}

impl DocNode {
    /// URL path of the node on the docs site.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.category.as_str(), self.slug)
    }
}

/// Count every node in a forest, descendants included.
pub fn count_nodes(nodes: &[DocNode]) -> usize {
    nodes.iter().map(|n| 1 + count_nodes(&n.children)).sum()
}

/// Depth-first, pre-order walk over a forest.
pub fn walk_nodes<'a>(nodes: &'a [DocNode], visit: &mut impl FnMut(&'a DocNode)) {
    for node in nodes {
        visit(node);
        walk_nodes(&node.children, visit);
    }
}

/// Whether a search entry carries only metadata or a full body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Index,
    Content,
}

/// A flattened, searchable document.
///
/// `content` only participates in matching when `source_type` is
/// [`SourceType::Content`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    pub path: String,
    pub category: String,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Persisted search index plus the file modification times it was built from.
///
/// `file_stats` maps content-relative paths to mtimes in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnapshot {
    pub timestamp: i64,
    pub index: BTreeMap<String, IndexEntry>,
    #[serde(default)]
    pub file_stats: BTreeMap<String, i64>,
}

impl SearchSnapshot {
    /// Entries in the deterministic order used for tie-breaking.
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.index.values().cloned().collect()
    }
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub description: String,
    pub path: String,
    pub category: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_content: Option<String>,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str) -> DocNode {
        DocNode {
            id: format!("wiki/{}", id),
            title: id.to_string(),
            slug: id.to_string(),
            category: DocCategory::Wiki,
            description: None,
            order: 0,
            keywords: vec![],
            children: vec![],
        }
    }

    #[test]
    fn test_category_round_trip_names() {
        for cat in [
            DocCategory::Documents,
            DocCategory::Wiki,
            DocCategory::Journals,
            DocCategory::Development,
            DocCategory::Other,
        ] {
            assert_eq!(cat.as_str().parse::<DocCategory>().unwrap(), cat);
        }
        assert!("blog".parse::<DocCategory>().is_err());
        assert_eq!(" Wiki ".parse::<DocCategory>().unwrap(), DocCategory::Wiki);
    }

    #[test]
    fn test_count_nodes_includes_descendants() {
        let mut parent = leaf("parent");
        parent.children = vec![leaf("a"), leaf("b")];
        parent.children[1].children = vec![leaf("c")];
        assert_eq!(count_nodes(&[parent, leaf("other")]), 5);
        assert_eq!(count_nodes(&[]), 0);
    }

    #[test]
    fn test_walk_is_preorder() {
        let mut parent = leaf("parent");
        parent.children = vec![leaf("a"), leaf("b")];
        let mut seen = Vec::new();
        walk_nodes(&[parent, leaf("z")], &mut |n| seen.push(n.slug.clone()));
        assert_eq!(seen, vec!["parent", "a", "b", "z"]);
    }

    #[test]
    fn test_node_serializes_camel_case() {
        let node = leaf("intro");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["category"], "wiki");
        assert_eq!(json["children"], serde_json::json!([]));
        assert!(json.get("description").is_none());
        assert_eq!(node.path(), "/wiki/intro");
    }
}

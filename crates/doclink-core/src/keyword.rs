//! Keyword index over document trees.
//!
//! # Extraction
//!
//! Each node contributes its title plus every front-matter `keywords`
//! entry. Keywords are normalized with [`normalize_keyword`] (trim,
//! collapse inner whitespace, lowercase); empty results are skipped. The
//! walk is depth-first pre-order over the forest in the order given, so
//! candidate order is deterministic for a given tree.
//!
//! # Duplicates
//!
//! A keyword that maps to candidates from two or more different documents
//! is listed once in [`KeywordIndex::duplicates`], in the order the
//! collisions were first seen. Repeats within one document (a title that
//! is also listed as a keyword) stay as separate candidates but are not
//! a collision.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::models::{walk_nodes, DocCategory, DocNode};

/// A document a keyword can link to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordCandidate {
    pub doc_id: String,
    pub doc_type: DocCategory,
    pub title: String,
    pub path: String,
}

/// Normalized keyword → candidates, plus the keywords that collide.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordIndex {
    pub index: BTreeMap<String, Vec<KeywordCandidate>>,
    pub duplicates: Vec<String>,
}

impl KeywordIndex {
    pub fn candidates(&self, keyword: &str) -> &[KeywordCandidate] {
        self.index
            .get(&normalize_keyword(keyword))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Case- and whitespace-insensitive keyword form used for lookups.
pub fn normalize_keyword(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Keywords a node defines, normalized, in extraction order.
pub fn extract_keywords(node: &DocNode) -> Vec<String> {
    std::iter::once(node.title.as_str())
        .chain(node.keywords.iter().map(String::as_str))
        .map(normalize_keyword)
        .filter(|k| !k.is_empty())
        .collect()
}

/// Build the keyword index for a forest of doc trees.
pub fn build_keyword_index(forest: &[DocNode]) -> KeywordIndex {
    let mut out = KeywordIndex::default();
    let mut reported = HashSet::new();

    walk_nodes(forest, &mut |node| {
        for keyword in extract_keywords(node) {
            let candidates = out.index.entry(keyword.clone()).or_default();
            let collides = candidates.iter().any(|c| c.doc_id != node.id);
            candidates.push(KeywordCandidate {
                doc_id: node.id.clone(),
                doc_type: node.category,
                title: node.title.clone(),
                path: node.path(),
            });
            if collides && reported.insert(keyword.clone()) {
                out.duplicates.push(keyword);
            }
        }
    });

    out
}

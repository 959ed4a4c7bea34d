//! Keyword → document resolution.
//!
//! Resolution order:
//!
//! 1. No candidates: `None`.
//! 2. All candidates point at one document: that document, regardless of hint.
//! 3. A doc-type hint that narrows the candidates to one document: that document.
//! 4. Otherwise the [`AmbiguityPolicy`] decides. When the hint matched
//!    several documents, only those are considered.
//!
//! Every multi-document outcome from step 4 is flagged `ambiguous` so
//! callers can surface a duplicate-keyword warning.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::keyword::{KeywordCandidate, KeywordIndex};
use crate::models::DocCategory;

/// How to pick a target when a keyword still matches several documents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// First candidate in index-insertion order.
    #[default]
    First,
    /// Rank by category priority (earlier is better), then insertion order.
    /// Categories not listed rank last.
    Priority(Vec<DocCategory>),
    /// Refuse to guess.
    Strict,
}

impl AmbiguityPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            AmbiguityPolicy::First => "first",
            AmbiguityPolicy::Priority(_) => "priority",
            AmbiguityPolicy::Strict => "strict",
        }
    }
}

impl FromStr for AmbiguityPolicy {
    type Err = anyhow::Error;

    /// Parses `first`, `strict`, or `priority`. A bare `priority` uses the
    /// published category order; see [`AmbiguityPolicy::Priority`].
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "first" => Ok(AmbiguityPolicy::First),
            "strict" => Ok(AmbiguityPolicy::Strict),
            "priority" => Ok(AmbiguityPolicy::Priority(DocCategory::PUBLISHED.to_vec())),
            other => bail!(
                "Unknown ambiguity policy: '{}'. Must be first, priority, or strict.",
                other
            ),
        }
    }
}

/// Outcome of resolving a keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLink {
    pub keyword: String,
    pub target: KeywordCandidate,
    /// True when more than one document matched and a policy picked one.
    pub ambiguous: bool,
    /// Other documents the keyword maps to, one entry per document.
    pub alternatives: Vec<KeywordCandidate>,
}

fn distinct_docs(cands: &[&KeywordCandidate]) -> usize {
    let mut ids: Vec<&str> = cands.iter().map(|c| c.doc_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len()
}

fn link(
    keyword: &str,
    all: &[KeywordCandidate],
    target: &KeywordCandidate,
    ambiguous: bool,
) -> ResolvedLink {
    let mut alternatives: Vec<KeywordCandidate> = Vec::new();
    for c in all {
        if c.doc_id != target.doc_id && !alternatives.iter().any(|a| a.doc_id == c.doc_id) {
            alternatives.push(c.clone());
        }
    }
    ResolvedLink {
        keyword: keyword.to_string(),
        target: target.clone(),
        ambiguous,
        alternatives,
    }
}

/// Resolve `keyword` against `index`.
pub fn resolve_keyword(
    index: &KeywordIndex,
    keyword: &str,
    hint: Option<DocCategory>,
    policy: &AmbiguityPolicy,
) -> Option<ResolvedLink> {
    let normalized = crate::keyword::normalize_keyword(keyword);
    let all = index.candidates(&normalized);
    let refs: Vec<&KeywordCandidate> = all.iter().collect();

    let first = refs.first()?;
    if distinct_docs(&refs) == 1 {
        return Some(link(&normalized, all, first, false));
    }

    let hinted: Vec<&KeywordCandidate> = match hint {
        Some(h) => refs.iter().copied().filter(|c| c.doc_type == h).collect(),
        None => Vec::new(),
    };
    if !hinted.is_empty() && distinct_docs(&hinted) == 1 {
        return Some(link(&normalized, all, hinted[0], false));
    }

    let pool = if hinted.is_empty() { &refs } else { &hinted };
    let chosen = match policy {
        AmbiguityPolicy::First => pool[0],
        AmbiguityPolicy::Priority(order) => {
            let rank = |c: &KeywordCandidate| {
                order
                    .iter()
                    .position(|cat| *cat == c.doc_type)
                    .unwrap_or(order.len())
            };
            pool.iter()
                .enumerate()
                .min_by_key(|(i, c)| (rank(**c), *i))
                .map(|(_, c)| *c)?
        }
        AmbiguityPolicy::Strict => return None,
    };

    Some(link(&normalized, all, chosen, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::build_keyword_index;
    use crate::models::DocNode;

    fn page(category: DocCategory, slug: &str, title: &str) -> DocNode {
        DocNode {
            id: format!("{}/{}", category, slug),
            title: title.to_string(),
            slug: slug.to_string(),
            category,
            description: None,
            order: 0,
            keywords: vec![],
            children: vec![],
        }
    }

    fn ambiguous_index() -> KeywordIndex {
        build_keyword_index(&[
            page(DocCategory::Journals, "2024-api", "API"),
            page(DocCategory::Wiki, "api", "API"),
            page(DocCategory::Documents, "api-spec", "api"),
            page(DocCategory::Wiki, "unique", "Unique Page"),
        ])
    }

    #[test]
    fn test_missing_keyword_is_none() {
        let idx = ambiguous_index();
        assert!(resolve_keyword(&idx, "nothing here", None, &AmbiguityPolicy::First).is_none());
    }

    #[test]
    fn test_single_candidate_ignores_hint() {
        let idx = ambiguous_index();
        for hint in [None, Some(DocCategory::Journals), Some(DocCategory::Wiki)] {
            let r = resolve_keyword(&idx, "  unique PAGE ", hint, &AmbiguityPolicy::Strict).unwrap();
            assert_eq!(r.target.doc_id, "wiki/unique");
            assert!(!r.ambiguous);
            assert!(r.alternatives.is_empty());
        }
    }

    #[test]
    fn test_hint_disambiguates() {
        let idx = ambiguous_index();
        let r = resolve_keyword(&idx, "api", Some(DocCategory::Wiki), &AmbiguityPolicy::Strict)
            .unwrap();
        assert_eq!(r.target.doc_id, "wiki/api");
        assert!(!r.ambiguous);
        assert_eq!(r.alternatives.len(), 2);
    }

    #[test]
    fn test_first_policy_falls_back_to_insertion_order() {
        let idx = ambiguous_index();
        let r = resolve_keyword(&idx, "API", None, &AmbiguityPolicy::First).unwrap();
        assert_eq!(r.target.doc_id, "journals/2024-api");
        assert!(r.ambiguous);

        // A hint that matches nothing behaves like no hint.
        let r = resolve_keyword(&idx, "API", Some(DocCategory::Other), &AmbiguityPolicy::First)
            .unwrap();
        assert_eq!(r.target.doc_id, "journals/2024-api");
    }

    #[test]
    fn test_priority_policy_ranks_categories() {
        let idx = ambiguous_index();
        let policy = AmbiguityPolicy::Priority(vec![DocCategory::Documents, DocCategory::Wiki]);
        let r = resolve_keyword(&idx, "api", None, &policy).unwrap();
        assert_eq!(r.target.doc_id, "documents/api-spec");
        assert!(r.ambiguous);

        let default_order: AmbiguityPolicy = "priority".parse().unwrap();
        let r = resolve_keyword(&idx, "api", None, &default_order).unwrap();
        assert_eq!(r.target.doc_id, "documents/api-spec");
    }

    #[test]
    fn test_strict_policy_refuses_ambiguity() {
        let idx = ambiguous_index();
        assert!(resolve_keyword(&idx, "api", None, &AmbiguityPolicy::Strict).is_none());
    }

    #[test]
    fn test_hint_matching_several_narrows_pool() {
        let idx = build_keyword_index(&[
            page(DocCategory::Documents, "x", "Setup"),
            page(DocCategory::Wiki, "a", "Setup"),
            page(DocCategory::Wiki, "b", "Setup"),
        ]);
        let r = resolve_keyword(&idx, "setup", Some(DocCategory::Wiki), &AmbiguityPolicy::First)
            .unwrap();
        assert_eq!(r.target.doc_id, "wiki/a");
        assert!(r.ambiguous);
        assert_eq!(r.alternatives.len(), 2);
    }

    #[test]
    fn test_same_document_repeats_are_not_ambiguous() {
        let mut node = page(DocCategory::Wiki, "rust", "Rust");
        node.keywords = vec!["RUST".to_string()];
        let idx = build_keyword_index(&[node]);
        let r = resolve_keyword(&idx, "rust", None, &AmbiguityPolicy::Strict).unwrap();
        assert!(!r.ambiguous);
        assert!(r.alternatives.is_empty());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("first".parse::<AmbiguityPolicy>().unwrap(), AmbiguityPolicy::First);
        assert_eq!("strict".parse::<AmbiguityPolicy>().unwrap().name(), "strict");
        assert!("random".parse::<AmbiguityPolicy>().is_err());
    }
}

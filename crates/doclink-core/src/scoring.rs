//! Search scoring, ranking and excerpting.
//!
//! # Scoring
//!
//! 1. Skip queries shorter than `min_query_length` characters (after trim).
//! 2. Case-insensitive substring match against `title`, `description`
//!    and, for [`SourceType::Content`] entries only, `content`.
//! 3. Base score = sum of `base_scores` for every matching field.
//! 4. Hits are grouped by source type. Within a group, ordered by base
//!    score (stable), the hit at position `p` is scaled by
//!    `rank_decay_factor^p`.
//! 5. Merge groups, sort by score descending (stable: ties keep index
//!    order) and truncate to the limit.
//!
//! Case folding maps each character to the first character of its
//! lowercase form so folded text stays index-aligned with the original.
//! Excerpt windows are therefore cut at character, never byte, positions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::models::{IndexEntry, SearchResult, SourceType};

/// Score contributed by each matching field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseScores {
    pub title: f64,
    pub description: f64,
    pub content: f64,
}

impl Default for BaseScores {
    fn default() -> Self {
        Self {
            title: 1.0,
            description: 0.8,
            content: 0.6,
        }
    }
}

/// Search tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub min_query_length: usize,
    pub max_results: usize,
    /// Characters kept on each side of the first content match.
    pub context_length: usize,
    /// Upper bound on excerpt length in characters, markers excluded.
    pub excerpt_length: usize,
    pub rank_decay_factor: f64,
    pub base_scores: BaseScores,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            min_query_length: 2,
            max_results: 10,
            context_length: 50,
            excerpt_length: 200,
            rank_decay_factor: 0.95,
            base_scores: BaseScores::default(),
        }
    }
}

fn fold(s: &str) -> Vec<char> {
    s.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn find_folded(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// True when `query` is long enough to run.
pub fn is_searchable(query: &str, min_query_length: usize) -> bool {
    let len = query.trim().chars().count();
    len > 0 && len >= min_query_length
}

/// Text window around the first case-insensitive match of `query`.
///
/// `...` marks each side that was cut. Returns `None` when `query` does
/// not occur in `content`.
pub fn create_excerpt(
    content: &str,
    query: &str,
    context_length: usize,
    excerpt_length: usize,
) -> Option<String> {
    let original: Vec<char> = content.chars().collect();
    let folded = fold(content);
    let needle = fold(query.trim());
    let idx = find_folded(&folded, &needle)?;

    let mut start = idx.saturating_sub(context_length);
    let mut end = (idx + needle.len() + context_length).min(original.len());
    if excerpt_length > 0 && end - start > excerpt_length {
        // Keep the match centred when the window has to shrink.
        let centre = idx + needle.len() / 2;
        start = centre.saturating_sub(excerpt_length / 2);
        end = (start + excerpt_length).min(original.len());
        start = end.saturating_sub(excerpt_length);
    }

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.extend(&original[start..end]);
    if end < original.len() {
        out.push_str("...");
    }
    Some(out)
}

/// Base score and excerpt for one entry, or `None` if nothing matched.
pub fn score_entry(
    entry: &IndexEntry,
    query: &str,
    params: &SearchParams,
) -> Option<(f64, Option<String>)> {
    let needle = fold(query.trim());
    let scores = &params.base_scores;
    let mut score = 0.0;
    let mut matched = false;

    if find_folded(&fold(&entry.title), &needle).is_some() {
        score += scores.title;
        matched = true;
    }
    if find_folded(&fold(&entry.description), &needle).is_some() {
        score += scores.description;
        matched = true;
    }

    let mut excerpt = None;
    if entry.source_type == SourceType::Content {
        if let Some(e) = create_excerpt(
            &entry.content,
            query,
            params.context_length,
            params.excerpt_length,
        ) {
            score += scores.content;
            matched = true;
            excerpt = Some(e);
        }
    }

    matched.then_some((score.max(0.0), excerpt))
}

struct Hit<'a> {
    position: usize,
    entry: &'a IndexEntry,
    base: f64,
    score: f64,
    excerpt: Option<String>,
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn decay_group(hits: &mut [Hit<'_>], factor: f64) {
    hits.sort_by(|a, b| by_score_desc(a.base, b.base).then(a.position.cmp(&b.position)));
    let mut weight = 1.0;
    for hit in hits.iter_mut() {
        hit.score = hit.base * weight;
        weight *= factor;
    }
}

/// Score, rank and truncate `entries` for `query`.
///
/// `entries` order is the tie-break order.
pub fn rank_entries(
    entries: &[IndexEntry],
    query: &str,
    params: &SearchParams,
    limit: usize,
) -> Vec<SearchResult> {
    if !is_searchable(query, params.min_query_length) {
        return Vec::new();
    }

    let mut index_hits = Vec::new();
    let mut content_hits = Vec::new();
    for (position, entry) in entries.iter().enumerate() {
        if let Some((base, excerpt)) = score_entry(entry, query, params) {
            let hit = Hit {
                position,
                entry,
                base,
                score: base,
                excerpt,
            };
            match entry.source_type {
                SourceType::Index => index_hits.push(hit),
                SourceType::Content => content_hits.push(hit),
            }
        }
    }

    decay_group(&mut index_hits, params.rank_decay_factor);
    decay_group(&mut content_hits, params.rank_decay_factor);

    let mut hits: Vec<Hit<'_>> = index_hits.into_iter().chain(content_hits).collect();
    hits.sort_by(|a, b| by_score_desc(a.score, b.score).then(a.position.cmp(&b.position)));
    hits.truncate(limit);

    hits.into_iter()
        .map(|h| SearchResult {
            id: h.entry.id.clone(),
            title: h.entry.title.clone(),
            description: h.entry.description.clone(),
            path: h.entry.path.clone(),
            category: h.entry.category.clone(),
            score: h.score,
            matched_content: h.excerpt,
            source_type: h.entry.source_type,
            thumbnail: h.entry.thumbnail.clone(),
            metadata: None,
        })
        .collect()
}

/// Distinct titles of the best matches, for type-ahead suggestions.
pub fn suggest_titles(
    entries: &[IndexEntry],
    query: &str,
    params: &SearchParams,
    limit: usize,
) -> Vec<String> {
    let mut titles: Vec<String> = Vec::new();
    for result in rank_entries(entries, query, params, entries.len()) {
        if titles.len() >= limit {
            break;
        }
        if !titles.contains(&result.title) {
            titles.push(result.title);
        }
    }
    titles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, title: &str, description: &str, content: &str, source: SourceType) -> IndexEntry {
        IndexEntry {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            content: content.to_string(),
            path: format!("/{}", id),
            category: "wiki".to_string(),
            source_type: source,
            thumbnail: None,
        }
    }

    fn no_decay() -> SearchParams {
        SearchParams {
            rank_decay_factor: 1.0,
            ..SearchParams::default()
        }
    }

    #[test]
    fn test_short_query_returns_nothing() {
        let entries = vec![entry("a", "a", "", "", SourceType::Content)];
        assert!(rank_entries(&entries, "a", &SearchParams::default(), 10).is_empty());
        assert!(rank_entries(&entries, "   ", &SearchParams::default(), 10).is_empty());
        assert!(is_searchable("ab", 2));
        assert!(!is_searchable(" a ", 2));
    }

    #[test]
    fn test_scores_sum_matching_fields() {
        let params = no_decay();
        let e = entry("a", "Rust Guide", "All about rust", "rust body", SourceType::Content);
        let (score, excerpt) = score_entry(&e, "RUST", &params).unwrap();
        assert!((score - (1.0 + 0.8 + 0.6)).abs() < 1e-9);
        assert_eq!(excerpt.as_deref(), Some("rust body"));

        let title_only = entry("b", "Rust", "", "", SourceType::Content);
        let (score, excerpt) = score_entry(&title_only, "rust", &params).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
        assert!(excerpt.is_none());

        assert!(score_entry(&title_only, "python", &params).is_none());
    }

    #[test]
    fn test_index_entries_ignore_body() {
        let params = no_decay();
        let e = entry("a", "Guides", "", "the word rust appears here", SourceType::Index);
        assert!(score_entry(&e, "rust", &params).is_none());

        let results = rank_entries(&[e], "rust", &params, 10);
        assert!(results.is_empty());
    }

    #[test]
    fn test_excerpt_window_and_markers() {
        let content = "0123456789abcdefghij0123456789";
        let ex = create_excerpt(content, "ABC", 3, 200).unwrap();
        assert_eq!(ex, "...789abcdef...");

        let ex = create_excerpt(content, "0123", 3, 200).unwrap();
        assert_eq!(ex, "0123456...");

        assert!(create_excerpt(content, "zzz", 3, 200).is_none());
    }

    #[test]
    fn test_excerpt_truncated_to_length() {
        let content = "x".repeat(100) + "needle" + &"y".repeat(100);
        let ex = create_excerpt(&content, "needle", 50, 20).unwrap();
        let body = ex.trim_start_matches("...").trim_end_matches("...");
        assert_eq!(body.chars().count(), 20);
        assert_eq!(ex, format!("...{}needle{}...", "x".repeat(7), "y".repeat(7)));
    }

    #[test]
    fn test_truncated_excerpt_keeps_match_near_edges() {
        let content = "needle".to_string() + &"y".repeat(100);
        let ex = create_excerpt(&content, "needle", 50, 20).unwrap();
        assert_eq!(ex, format!("needle{}...", "y".repeat(14)));

        let content = "x".repeat(100) + "needle";
        let ex = create_excerpt(&content, "needle", 50, 20).unwrap();
        assert_eq!(ex, format!("...{}needle", "x".repeat(14)));
    }

    #[test]
    fn test_excerpt_handles_multibyte_text() {
        let content = "これはRustの説明です。Rustは安全です。";
        let ex = create_excerpt(content, "rust", 2, 200).unwrap();
        assert_eq!(ex, "...れはRustの説...");
    }

    #[test]
    fn test_results_sorted_and_stable() {
        let params = no_decay();
        let entries = vec![
            entry("a", "other", "", "rust in body", SourceType::Content),
            entry("b", "Rust", "", "", SourceType::Content),
            entry("c", "more", "", "rust again", SourceType::Content),
            entry("d", "Rust too", "", "", SourceType::Content),
        ];
        let results = rank_entries(&entries, "rust", &params, 10);
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_rank_decay_per_source() {
        let params = SearchParams {
            rank_decay_factor: 0.5,
            ..SearchParams::default()
        };
        let entries = vec![
            entry("c1", "Rust one", "", "", SourceType::Content),
            entry("c2", "Rust two", "", "", SourceType::Content),
            entry("i1", "Rust index", "", "", SourceType::Index),
        ];
        let results = rank_entries(&entries, "rust", &params, 10);
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        // c1 and i1 lead their groups at full score; c2 is halved.
        assert_eq!(ids, vec!["c1", "i1", "c2"]);
        assert!((results[2].score - 0.5).abs() < 1e-9);
        assert!(results.iter().all(|r| r.score >= 0.0));
    }

    #[test]
    fn test_limit_truncates() {
        let entries: Vec<_> = (0..5)
            .map(|i| entry(&format!("e{}", i), "rust", "", "", SourceType::Content))
            .collect();
        assert_eq!(rank_entries(&entries, "rust", &no_decay(), 3).len(), 3);
    }

    #[test]
    fn test_suggestions_are_distinct_titles() {
        let entries = vec![
            entry("a", "Rust", "", "", SourceType::Content),
            entry("b", "Rust", "", "", SourceType::Index),
            entry("c", "Rustacean", "", "", SourceType::Content),
        ];
        let titles = suggest_titles(&entries, "rust", &no_decay(), 5);
        assert_eq!(titles, vec!["Rust".to_string(), "Rustacean".to_string()]);
        assert_eq!(suggest_titles(&entries, "rust", &no_decay(), 1).len(), 1);
    }
}

//! `[[keyword]]` link rendering for markdown bodies.
//!
//! `[[keyword]]` and `[[keyword|label]]` become regular markdown links
//! to the resolved document. Unresolved keywords are replaced by their
//! label as plain text. Fenced code blocks are left untouched.

use serde::Serialize;

use crate::resolve::ResolvedLink;

/// Rendered markdown plus the keywords that need attention.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedMarkdown {
    pub content: String,
    pub linked: usize,
    pub unresolved: Vec<String>,
    pub ambiguous: Vec<String>,
}

/// Rewrite every `[[keyword]]` in `markdown` using `resolve`.
///
/// `resolve` receives the raw keyword text.
pub fn render_keyword_links(
    markdown: &str,
    mut resolve: impl FnMut(&str) -> Option<ResolvedLink>,
) -> LinkedMarkdown {
    let mut out = LinkedMarkdown::default();
    let mut in_fence = false;

    for (i, line) in markdown.split('\n').enumerate() {
        if i > 0 {
            out.content.push('\n');
        }
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.content.push_str(line);
            continue;
        }
        if in_fence {
            out.content.push_str(line);
            continue;
        }

        let mut rest = line;
        while let Some(start) = rest.find("[[") {
            let Some(len) = rest[start + 2..].find("]]") else {
                break;
            };
            out.content.push_str(&rest[..start]);
            let inner = &rest[start + 2..start + 2 + len];
            let (keyword, label) = match inner.split_once('|') {
                Some((k, l)) => (k.trim(), l.trim()),
                None => (inner.trim(), inner.trim()),
            };

            match resolve(keyword) {
                Some(link) => {
                    if link.ambiguous && !out.ambiguous.iter().any(|k| k == &link.keyword) {
                        out.ambiguous.push(link.keyword.clone());
                    }
                    out.content
                        .push_str(&format!("[{}]({})", label, link.target.path));
                    out.linked += 1;
                }
                None => {
                    if !out.unresolved.iter().any(|k| k == keyword) {
                        out.unresolved.push(keyword.to_string());
                    }
                    out.content.push_str(label);
                }
            }
            rest = &rest[start + 2 + len + 2..];
        }
        out.content.push_str(rest);
    }

    out
}

/// Distinct raw keywords referenced by `markdown`, in order of first use.
///
/// Sees exactly what [`render_keyword_links`] would resolve, so callers can
/// look the keywords up ahead of rendering.
pub fn keyword_refs(markdown: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    render_keyword_links(markdown, |k| {
        if !refs.iter().any(|r| r == k) {
            refs.push(k.to_string());
        }
        None
    });
    refs
}

//! YAML front matter and `index.json` directory descriptors.
//!
//! Pages carry metadata in a leading `---` YAML block; directories carry
//! it in `index.json` (preferred) or in the front matter of `index.mdx`.
//! Both deserialize into [`FrontMatter`].

use anyhow::{Context, Result};
use gray_matter::engine::YAML;
use gray_matter::Matter;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub description: Option<String>,
    pub order: Option<i64>,
    /// `published` (default), `private` or `draft`.
    pub status: Option<String>,
    pub keywords: Vec<String>,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    pub icon: Option<String>,
    pub hidden: bool,
}

impl FrontMatter {
    /// Private and draft pages are only served when private content is on.
    pub fn is_restricted(&self) -> bool {
        matches!(self.status.as_deref(), Some("private") | Some("draft"))
    }
}

/// A markdown file split into metadata and body.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub front_matter: Option<FrontMatter>,
    pub body: String,
}

/// Split `raw` into front matter and body.
///
/// A file without a front matter block parses with `front_matter: None`;
/// a block that is present but does not match [`FrontMatter`] is an error.
pub fn parse_document(raw: &str) -> Result<ParsedDocument> {
    let matter = Matter::<YAML>::new();
    let parsed = matter
        .parse::<FrontMatter>(raw)
        .map_err(|e| anyhow::anyhow!("Invalid front matter: {}", e))?;
    Ok(ParsedDocument {
        front_matter: parsed.data,
        body: parsed.content,
    })
}

/// Read a markdown file's front matter and body.
pub fn read_document(path: &Path) -> Result<ParsedDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_document(&raw).with_context(|| format!("In {}", path.display()))
}

/// Descriptor for a directory, from `index.json` or `index.mdx`.
///
/// `Ok(None)` when the directory has neither file.
pub fn read_descriptor(dir: &Path) -> Result<Option<FrontMatter>> {
    let json_path = dir.join("index.json");
    if json_path.is_file() {
        let raw = std::fs::read_to_string(&json_path)
            .with_context(|| format!("Failed to read {}", json_path.display()))?;
        let fm: FrontMatter = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid descriptor {}", json_path.display()))?;
        return Ok(Some(fm));
    }

    for name in ["index.mdx", "index.md"] {
        let path = dir.join(name);
        if path.is_file() {
            let doc = read_document(&path)?;
            return Ok(Some(doc.front_matter.unwrap_or_default()));
        }
    }

    Ok(None)
}

//! Doc tree snapshots: `{category}-tree.json` files.
//!
//! `doclink export <dir>` writes one snapshot per published category so
//! the server can run with `content.mode = "snapshot"` where the content
//! directory is not available. Loading goes through the validated parser
//! in [`doclink_core::tree::parse_tree_snapshot`]:
//!
//! | Situation | Result |
//! |-----------|--------|
//! | snapshot file missing | `[]` |
//! | file present, valid | the tree |
//! | file present, malformed | [`DocsError::InvalidSnapshot`] |

use anyhow::{Context, Result as AnyResult};
use doclink_core::models::{count_nodes, DocCategory, DocNode};
use doclink_core::tree::parse_tree_snapshot;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::doc_tree::build_doc_tree;
use crate::error::{DocsError, Result};

pub fn snapshot_path(dir: &Path, category: DocCategory) -> PathBuf {
    dir.join(format!("{}-tree.json", category))
}

/// Load one category's snapshot from `dir`.
pub fn load_snapshot(dir: &Path, category: DocCategory) -> Result<Vec<DocNode>> {
    let path = snapshot_path(dir, category);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DocsError::fs(path, e)),
    };
    parse_tree_snapshot(category, &raw).map_err(|e| DocsError::InvalidSnapshot {
        path,
        message: format!("{:#}", e),
    })
}

/// Build every published category from the content directory and write
/// its snapshot into `out_dir`.
pub fn run_export(config: &Config, out_dir: &Path) -> AnyResult<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for category in DocCategory::PUBLISHED {
        let nodes = build_doc_tree(
            &config.content.root,
            category,
            config.content.include_private,
        )
        .with_context(|| format!("Failed to build {} tree", category))?;

        let path = snapshot_path(out_dir, category);
        let json = serde_json::to_string_pretty(&nodes)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(category = %category, nodes = count_nodes(&nodes), "wrote snapshot");
        println!(
            "{}: {} nodes -> {}",
            category,
            count_nodes(&nodes),
            path.display()
        );
    }

    Ok(())
}

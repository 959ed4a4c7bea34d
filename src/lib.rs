//! # doclink
//!
//! Documentation tree, keyword-link and search services for a markdown
//! content directory.
//!
//! doclink walks a directory of `.md`/`.mdx` files grouped by category
//! (`documents`, `wiki`, `journals`), builds navigable doc trees, resolves
//! `[[keyword]]` links between pages, and serves full-text search, all
//! behind explicitly constructed TTL caches. The pure algorithms live in
//! the `doclink-core` crate; this crate adds filesystem access, caching,
//! the CLI, and the HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  content/    │──▶│  DocTrees    │──▶│ KeywordIndex │
//! │  md / mdx    │   │ (or snapshot)│   │  + resolver  │
//! └──────┬───────┘   └──────────────┘   └──────┬───────┘
//!        │                                     │
//!        ▼                                     ▼
//! ┌──────────────┐                      ┌──────────────┐
//! │   Indexer    │────▶ SearchService ─▶│ CacheManager │
//! └──────────────┘                      └──────┬───────┘
//!                       ┌───────────────────────┤
//!                       ▼                       ▼
//!                  ┌──────────┐           ┌──────────┐
//!                  │   CLI    │           │   HTTP   │
//!                  │(doclink) │           │  (axum)  │
//!                  └──────────┘           └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy with stable codes |
//! | [`frontmatter`] | YAML front matter and directory descriptors |
//! | [`doc_tree`] | Doc tree construction from the content directory |
//! | [`snapshot`] | `{category}-tree.json` export and loading |
//! | [`cache`] | Cache manager, persistence and sweeper |
//! | [`keywords`] | Keyword index and resolution service |
//! | [`indexer`] | Search snapshot builder |
//! | [`search`] | Search service |
//! | [`images`] | Thumbnail rewriting, OG images, image proxy |
//! | [`services`] | Service wiring |
//! | [`server`] | HTTP API |

pub mod cache;
pub mod config;
pub mod doc_tree;
pub mod error;
pub mod frontmatter;
pub mod images;
pub mod indexer;
pub mod keywords;
pub mod search;
pub mod server;
pub mod services;
pub mod snapshot;

//! # doclink core
//!
//! Shared, I/O-free logic for doclink: document tree models, keyword
//! indexing and resolution, the TTL/LRU cache, and search scoring.
//!
//! This crate contains no tokio, filesystem or network access. Callers
//! materialize doc trees and search entries themselves and hand them in;
//! time is passed explicitly (or through a [`cache::Clock`]) so every
//! algorithm here is deterministic under test.

pub mod cache;
pub mod keyword;
pub mod links;
pub mod models;
pub mod resolve;
pub mod scoring;
pub mod tree;

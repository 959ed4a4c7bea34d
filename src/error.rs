//! Error taxonomy for the docs services.
//!
//! | Variant | Code | Handling |
//! |---------|------|----------|
//! | [`DocsError::IndexNotFound`] | `INDEX_NOT_FOUND` | logged, triggers an index rebuild |
//! | [`DocsError::InvalidQuery`] | `INVALID_QUERY` | empty result set |
//! | [`DocsError::Cache`] | `CACHE_ERROR` | logged, in-memory path continues |
//! | [`DocsError::FileSystem`] | `FILE_SYSTEM_ERROR` | surfaced as a failed build |
//! | [`DocsError::InvalidSnapshot`] | `INVALID_SNAPSHOT` | surfaced to the caller |
//! | [`DocsError::SearchEngine`] | `SEARCH_ENGINE_ERROR` | HTTP 500 with a generic message |

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, DocsError>;

#[derive(Debug, thiserror::Error)]
pub enum DocsError {
    #[error("search index not found or unreadable: {0}")]
    IndexNotFound(PathBuf),

    #[error("query must be at least {min} characters")]
    InvalidQuery { min: usize },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("cannot read {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot {}: {message}", path.display())]
    InvalidSnapshot { path: PathBuf, message: String },

    #[error("search engine error: {0}")]
    SearchEngine(String),
}

impl DocsError {
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocsError::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DocsError::IndexNotFound(_) => "INDEX_NOT_FOUND",
            DocsError::InvalidQuery { .. } => "INVALID_QUERY",
            DocsError::Cache(_) => "CACHE_ERROR",
            DocsError::FileSystem { .. } => "FILE_SYSTEM_ERROR",
            DocsError::InvalidSnapshot { .. } => "INVALID_SNAPSHOT",
            DocsError::SearchEngine(_) => "SEARCH_ENGINE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_messages() {
        let err = DocsError::fs(
            "/missing/wiki",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        );
        assert_eq!(err.code(), "FILE_SYSTEM_ERROR");
        assert!(err.to_string().contains("/missing/wiki"));

        assert_eq!(DocsError::InvalidQuery { min: 2 }.code(), "INVALID_QUERY");
        assert_eq!(
            DocsError::SearchEngine("boom".into()).to_string(),
            "search engine error: boom"
        );
    }
}

//! Error types shared across the finloom workspace.

use std::time::Duration;
use thiserror::Error;

/// Result type for finloom operations.
pub type Result<T> = std::result::Result<T, FinloomError>;

/// Errors that can occur across the ingestion, parsing, storage and
/// retrieval layers.
#[derive(Debug, Error)]
pub enum FinloomError {
    /// Network transport error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Filing archive returned a non-success status
    #[error("Archive API error: {0}")]
    ArchiveApi(String),

    /// Archive asked us to back off (HTTP 429)
    #[error("Rate limited by archive{}", .retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited {
        /// Server-provided Retry-After, when present
        retry_after: Option<Duration>,
    },

    /// Document download failed
    #[error("Download error for {url}: {reason}")]
    Download {
        /// URL that failed
        url: String,
        /// Failure description
        reason: String,
    },

    /// XBRL instance or linkbase parsing error
    #[error("XBRL parsing error: {0}")]
    XbrlParse(String),

    /// HTML section extraction error
    #[error("Section parsing error: {0}")]
    SectionParse(String),

    /// XML-level error from the pull parser
    #[error("XML error: {0}")]
    Xml(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema violation detected at a repository boundary
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Data failed a validation rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// A pipeline stage failed
    #[error("Pipeline stage '{stage}' failed: {reason}")]
    Pipeline {
        /// Stage name (e.g. "xbrl_parse")
        stage: String,
        /// Failure description
        reason: String,
    },

    /// LLM call failed (routing, pruning, extraction or summarization)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding provider error
    #[error("Embeddings error: {0}")]
    Embeddings(String),

    /// Reranker provider error
    #[error("Reranker error: {0}")]
    Reranker(String),

    /// Vector, keyword or knowledge-graph store unreachable
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Required configuration key missing
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Analytical frame construction error
    #[error("DataFrame error: {0}")]
    Frame(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl FinloomError {
    /// True when the error is a transient transport condition worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::ArchiveApi(msg) => {
                msg.contains("500") || msg.contains("502") || msg.contains("503") || msg.contains("504")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display() {
        let err = FinloomError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert!(err.to_string().contains("30s"));

        let err = FinloomError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "Rate limited by archive");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FinloomError::RateLimited { retry_after: None }.is_retryable());
        assert!(FinloomError::ArchiveApi("HTTP 503".to_string()).is_retryable());
        assert!(!FinloomError::ArchiveApi("HTTP 404".to_string()).is_retryable());
        assert!(!FinloomError::MissingConfig("user_agent".to_string()).is_retryable());
    }
}

use thiserror::Error;

/// A convenience `Result` alias using [`HebelkiError`].
pub type HebelkiResult<T> = Result<T, HebelkiError>;

/// Top-level error type for Hebelki retrieval.
///
/// Only [`HebelkiError::InvalidAccessContext`] ever reaches the caller of a
/// search. Sub-source failures (`EmbeddingUnavailable`,
/// `DatastoreQueryFailed`) are absorbed by the orchestrator, which degrades
/// to the remaining sources.
#[derive(Error, Debug)]
pub enum HebelkiError {
    /// The embedding service failed or timed out.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A read against the knowledge or document store failed.
    #[error("Datastore query failed: {0}")]
    DatastoreQueryFailed(String),

    /// The access context is structurally invalid (e.g. missing tenant).
    #[error("Invalid access context: {0}")]
    InvalidAccessContext(String),

    /// Configuration could not be parsed or failed validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HebelkiError {
    /// Whether the orchestrator may absorb this error and continue with the
    /// remaining sources.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            HebelkiError::EmbeddingUnavailable(_)
                | HebelkiError::DatastoreQueryFailed(_)
        )
    }
}

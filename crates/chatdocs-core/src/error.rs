use thiserror::Error;

/// Fatal retrieval errors. Per-item problems (a malformed hit, a chunk without
/// ordering keys) are not errors; they are counted on the retrieval result.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Permission filter rejected: {0}")]
    PermissionFilter(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Search backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl Error {
    pub fn embedding(err: anyhow::Error) -> Self {
        Self::EmbeddingUnavailable(format!("{err:#}"))
    }

    pub fn backend(err: anyhow::Error) -> Self {
        Self::BackendUnavailable(format!("{err:#}"))
    }

    /// Message safe to show an end user; the variant detail stays in logs.
    pub fn user_message(&self) -> &'static str {
        "retrieval failed, try again"
    }
}

pub type Result<T> = std::result::Result<T, Error>;

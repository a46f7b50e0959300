use thiserror::Error;

/// Failures talking to a search backend over HTTP. Errors outside this type
/// (bad responses, unknown indexes in the in-memory backend) are permanent.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("search backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("search backend unreachable: {0}")]
    Transport(#[source] reqwest::Error),
}

impl BackendError {
    /// Worth retrying: connection trouble, throttling and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Transport(_) => true,
        }
    }
}

/// Whether any error in the chain is a transient [`BackendError`].
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<BackendError>().is_some_and(BackendError::is_transient))
}

/// Shared error type used across all ModelRelay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider {
        provider: String,
        /// Upstream HTTP status, when the failure was an error response
        /// rather than a transport problem.
        status: Option<u16>,
        message: String,
    },

    #[error("session store: {0}")]
    Store(String),

    #[error("config: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when a caller may reasonably retry later (store connectivity).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

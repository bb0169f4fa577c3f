/// Errors from calls to the animation API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The status endpoint does not know the handle (HTTP 404).
    #[error("Job not found")]
    NotFound,

    /// The request never produced a response (network, DNS, TLS, decode).
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The configured API root is not a usable base URL.
    #[error("Invalid API base URL: {0}")]
    InvalidUrl(String),

    /// The API answered with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Server {
        status: u16,
        /// Machine-readable `code` from the error body, when present.
        code: Option<String>,
        message: String,
    },
}

impl FetchError {
    /// Whether a poller should treat this as "not visible yet".
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

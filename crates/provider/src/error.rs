/// Errors from a provider adapter.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Credentials for this provider are missing.
    #[error("{provider} API key not configured")]
    NotConfigured { provider: &'static str },

    /// The provider refused the request. The body is kept verbatim so it can
    /// be shown to the user as the failure detail.
    #[error("{body}")]
    Rejected { status: u16, body: String },

    /// Timeouts, throttling, 5xx and transport failures.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with a body we could not interpret.
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether trying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_) | ProviderError::Malformed(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

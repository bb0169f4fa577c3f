use memoria_core::animation::ProviderKind;

/// Provider credentials and endpoints loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub heygen_api_key: Option<String>,
    pub heygen_api_url: String,
    pub did_api_key: Option<String>,
    pub did_api_url: String,
    /// Callback URL D-ID notifies on completion. Informational only: the
    /// worker polls regardless.
    pub did_webhook_url: Option<String>,
    /// Route new jobs to HeyGen instead of D-ID by default.
    pub use_heygen: bool,
    /// Voice used for the narration.
    pub voice_id: Option<String>,
    /// Timeout for a single provider HTTP call, in seconds.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                     |
    /// |-------------------------|-----------------------------|
    /// | `HEYGEN_API_KEY`        | unset                       |
    /// | `HEYGEN_API_URL`        | `https://api.heygen.com/v2` |
    /// | `DID_API_KEY`           | unset                       |
    /// | `DID_API_URL`           | `https://api.d-id.com`      |
    /// | `DID_WEBHOOK_URL`       | unset                       |
    /// | `USE_HEYGEN`            | `false`                     |
    /// | `ANIMATION_VOICE_ID`    | unset                       |
    /// | `PROVIDER_TIMEOUT_SECS` | `30`                        |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let use_heygen = non_empty("USE_HEYGEN")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let timeout_secs: u64 = non_empty("PROVIDER_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .expect("PROVIDER_TIMEOUT_SECS must be a valid u64");

        Self {
            heygen_api_key: non_empty("HEYGEN_API_KEY"),
            heygen_api_url: non_empty("HEYGEN_API_URL")
                .unwrap_or_else(|| "https://api.heygen.com/v2".into()),
            did_api_key: non_empty("DID_API_KEY"),
            did_api_url: non_empty("DID_API_URL").unwrap_or_else(|| "https://api.d-id.com".into()),
            did_webhook_url: non_empty("DID_WEBHOOK_URL"),
            use_heygen,
            voice_id: non_empty("ANIMATION_VOICE_ID"),
            timeout_secs,
        }
    }

    /// Provider used when a request does not name one.
    pub fn default_provider(&self) -> ProviderKind {
        if self.use_heygen {
            ProviderKind::HeyGen
        } else {
            ProviderKind::Did
        }
    }
}

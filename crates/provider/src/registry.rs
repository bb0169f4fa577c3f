//! Lookup of provider adapters by [`ProviderKind`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use memoria_core::animation::ProviderKind;

use crate::config::ProviderConfig;
use crate::did::DidProvider;
use crate::heygen::HeyGenProvider;
use crate::AnimationProvider;

/// The set of adapters available to the dispatcher, worker and status
/// endpoint, plus the provider used when a request does not name one.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn AnimationProvider>>,
    default_kind: ProviderKind,
}

impl ProviderRegistry {
    /// An empty registry. Used with [`Self::with_provider`] in tests.
    pub fn new(default_kind: ProviderKind) -> Self {
        Self {
            providers: HashMap::new(),
            default_kind,
        }
    }

    /// Build the HeyGen and D-ID adapters over one pooled HTTP client.
    ///
    /// Adapters are registered even without credentials; they report
    /// [`ProviderError::NotConfigured`](crate::ProviderError::NotConfigured)
    /// when called.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let heygen = HeyGenProvider::new(
            client.clone(),
            config.heygen_api_url.clone(),
            config.heygen_api_key.clone(),
            config.voice_id.clone(),
        );
        let did = DidProvider::new(
            client,
            config.did_api_url.clone(),
            config.did_api_key.clone(),
            config.voice_id.clone(),
            config.did_webhook_url.clone(),
        );

        Ok(Self::new(config.default_provider())
            .with_provider(Arc::new(heygen))
            .with_provider(Arc::new(did)))
    }

    /// Register `provider` under its own kind, replacing any previous one.
    pub fn with_provider(mut self, provider: Arc<dyn AnimationProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn AnimationProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.default_kind
    }
}

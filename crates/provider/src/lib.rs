//! Adapters for the external photo-animation providers.
//!
//! Each provider speaks its own HTTP dialect and status vocabulary. The
//! adapters here translate both into [`ProviderStatus`] so the worker and
//! the status endpoint only ever see one vocabulary.

pub mod config;
pub mod did;
pub mod error;
pub mod heygen;
pub mod http;
pub mod registry;

use async_trait::async_trait;
use memoria_core::animation::{ProviderKind, ProviderStatus};
use memoria_core::types::DbId;

pub use config::ProviderConfig;
pub use error::ProviderError;
pub use registry::ProviderRegistry;

/// Narration used when the user gave no prompt.
pub const DEFAULT_SCRIPT: &str = "Hello, I'm here to share memories with you.";

/// What a provider needs to know about the photo being animated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub media_id: DbId,
    /// Publicly reachable URL of the still image.
    pub image_url: String,
    /// Narration script. `None` uses [`DEFAULT_SCRIPT`].
    pub script: Option<String>,
}

impl MediaReference {
    pub fn script(&self) -> &str {
        self.script
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SCRIPT)
    }
}

/// One external animation service.
#[async_trait]
pub trait AnimationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Start an animation and return the provider's handle for it.
    async fn submit(&self, media: &MediaReference) -> Result<String, ProviderError>;

    /// Read the current status of a previously submitted animation.
    ///
    /// `media` is passed for logging and for providers that key lookups on
    /// the source; most ignore it.
    async fn check_status(
        &self,
        provider_handle: &str,
        media: &MediaReference,
    ) -> Result<ProviderStatus, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_prompt_uses_default_script() {
        let mut media = MediaReference {
            media_id: 1,
            image_url: "https://cdn/a.jpg".into(),
            script: None,
        };
        assert_eq!(media.script(), DEFAULT_SCRIPT);

        media.script = Some("   ".into());
        assert_eq!(media.script(), DEFAULT_SCRIPT);

        media.script = Some("Happy birthday".into());
        assert_eq!(media.script(), "Happy birthday");
    }
}

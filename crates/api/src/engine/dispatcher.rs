//! Animation dispatch.
//!
//! Accepts a request, records a `pending` job and puts it on the queue. It
//! never talks to a provider: submission happens in the worker, so the
//! caller gets a handle back immediately.

use std::sync::Arc;
use std::time::Duration;

use memoria_core::animation::{ensure_can_animate, NormalizedStatus, ProviderKind};
use memoria_core::error::CoreError;
use memoria_core::media::resolve_image_url;
use memoria_core::queue::Broker;
use memoria_core::store::{JobStore, MediaCatalog, NewAnimationJob};
use memoria_core::types::DbId;
use memoria_provider::ProviderRegistry;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Message returned when the queue cannot accept work.
pub const QUEUE_UNAVAILABLE_MESSAGE: &str =
    "Animation queue is not running. Please try again later.";

/// Body of `POST /api/v1/animations`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnimateRequest {
    #[validate(range(min = 1, message = "media_id must be a positive id"))]
    pub media_id: DbId,
    /// Narration script for the animated photo.
    #[validate(length(max = 1000, message = "prompt must be at most 1000 characters"))]
    pub prompt: Option<String>,
    /// Overrides the configured default provider.
    pub provider: Option<String>,
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchedJob {
    pub job_handle: String,
    pub provider: ProviderKind,
    pub status: NormalizedStatus,
    pub message: String,
}

pub struct AnimationDispatcher {
    store: Arc<dyn JobStore>,
    media: Arc<dyn MediaCatalog>,
    broker: Arc<dyn Broker>,
    providers: ProviderRegistry,
    public_api_url: Option<String>,
}

impl AnimationDispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        media: Arc<dyn MediaCatalog>,
        broker: Arc<dyn Broker>,
        providers: ProviderRegistry,
        public_api_url: Option<String>,
    ) -> Self {
        Self {
            store,
            media,
            broker,
            providers,
            public_api_url,
        }
    }

    /// Validate, record and enqueue an animation request.
    ///
    /// Errors:
    /// - invalid input or a non-photo media item: `Validation`
    /// - unknown media: `NotFound`
    /// - already animated, or a job still in flight: `Conflict`
    /// - queue or store unreachable: `Unavailable`
    pub async fn dispatch(&self, request: AnimateRequest) -> Result<DispatchedJob, CoreError> {
        request
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let provider = match request.provider.as_deref() {
            Some(tag) => tag.parse::<ProviderKind>()?,
            None => self.providers.default_kind(),
        };
        if self.providers.get(provider).is_none() {
            return Err(CoreError::Validation(format!(
                "Animation provider '{provider}' is not available"
            )));
        }

        let media = self
            .media
            .get_media(request.media_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Media",
                id: request.media_id,
            })?;

        let latest = self.store.latest_for_media(media.id).await?;
        ensure_can_animate(&media, latest.as_ref())?;

        if self.public_api_url.is_none() {
            tracing::warn!(
                media_id = media.id,
                "PUBLIC_API_URL is not set; providers may not be able to fetch the image",
            );
        }
        let image_url = resolve_image_url(&media, self.public_api_url.as_deref());

        let job = self
            .store
            .create(NewAnimationJob {
                job_handle: uuid::Uuid::new_v4().to_string(),
                media_id: media.id,
                provider,
                image_url,
                prompt: request
                    .prompt
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty()),
            })
            .await?;

        if let Err(e) = self.broker.enqueue(&job.job_handle, Duration::ZERO).await {
            tracing::error!(job_handle = %job.job_handle, error = %e, "Failed to enqueue animation job");
            if let Err(discard_err) = self.store.discard(&job.job_handle).await {
                tracing::warn!(
                    job_handle = %job.job_handle,
                    error = %discard_err,
                    "Failed to discard unqueued job",
                );
            }
            return Err(CoreError::Unavailable(QUEUE_UNAVAILABLE_MESSAGE.into()));
        }

        tracing::info!(
            job_handle = %job.job_handle,
            media_id = media.id,
            provider = %provider,
            "Animation job dispatched",
        );

        Ok(DispatchedJob {
            job_handle: job.job_handle,
            provider,
            status: NormalizedStatus::Pending,
            message: format!("Animation task started with {provider}. Check status later."),
        })
    }
}

//! Status resolution for the polling endpoint.
//!
//! Jobs this service knows about are answered from the store alone, so a
//! reader sees `success` and its result URL together or not at all. Only a
//! handle with no record behind it costs an upstream call, and at most one.

use std::sync::Arc;
use std::time::Duration;

use memoria_core::animation::{AnimationJob, NormalizedStatus, ProviderKind, ProviderStatus};
use memoria_core::error::CoreError;
use memoria_core::store::JobStore;
use memoria_core::types::DbId;
use memoria_provider::{MediaReference, ProviderError, ProviderRegistry};
use serde::Serialize;

/// Normalized view of a job returned to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusView {
    pub job_handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    pub status: NormalizedStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl JobStatusView {
    fn from_job(job: &AnimationJob) -> Self {
        Self {
            job_handle: job.job_handle.clone(),
            provider: Some(job.provider),
            status: job.status.into(),
            result_url: job.result_url.clone(),
            error_detail: job.error_detail.clone(),
        }
    }

    fn not_found(job_handle: &str, provider: Option<ProviderKind>) -> Self {
        Self {
            job_handle: job_handle.to_string(),
            provider,
            status: NormalizedStatus::NotFound,
            result_url: None,
            error_detail: None,
        }
    }

    fn failed(job_handle: &str, provider: ProviderKind, detail: &str) -> Self {
        Self {
            job_handle: job_handle.to_string(),
            provider: Some(provider),
            status: NormalizedStatus::Failed,
            result_url: None,
            error_detail: Some(memoria_core::animation::failure_detail(detail)),
        }
    }

    fn from_observation(job_handle: &str, provider: ProviderKind, observed: &ProviderStatus) -> Self {
        let status = observed.normalized();
        Self {
            job_handle: job_handle.to_string(),
            provider: Some(provider),
            status,
            result_url: (status == NormalizedStatus::Success)
                .then(|| observed.result_url().map(str::to_string))
                .flatten(),
            error_detail: match observed {
                ProviderStatus::Failed { detail } => {
                    Some(memoria_core::animation::failure_detail(detail))
                }
                _ => None,
            },
        }
    }
}

pub struct StatusService {
    store: Arc<dyn JobStore>,
    providers: ProviderRegistry,
    upstream_timeout: Duration,
}

impl StatusService {
    pub fn new(store: Arc<dyn JobStore>, providers: ProviderRegistry, upstream_timeout: Duration) -> Self {
        Self {
            store,
            providers,
            upstream_timeout,
        }
    }

    /// Resolve `job_handle` to a normalized status.
    ///
    /// Lookup order: dispatcher handle, provider handle (for `provider`, or
    /// every provider when none is given), most recent job for `media_id`,
    /// then a single direct provider check treating `job_handle` as the
    /// provider's own id.
    pub async fn resolve(
        &self,
        job_handle: &str,
        provider: Option<ProviderKind>,
        media_id: Option<DbId>,
    ) -> Result<JobStatusView, CoreError> {
        if let Some(job) = self.store.find_by_handle(job_handle).await? {
            return Ok(JobStatusView::from_job(&job));
        }

        let kinds: Vec<ProviderKind> = match provider {
            Some(kind) => vec![kind],
            None => ProviderKind::ALL.to_vec(),
        };
        for kind in kinds {
            if let Some(job) = self.store.find_by_provider_handle(kind, job_handle).await? {
                return Ok(JobStatusView::from_job(&job));
            }
        }

        if let Some(media_id) = media_id {
            if let Some(job) = self.store.latest_for_media(media_id).await? {
                tracing::debug!(
                    job_handle,
                    media_id,
                    resolved = %job.job_handle,
                    "Resolved status through media fallback",
                );
                return Ok(JobStatusView::from_job(&job));
            }
        }

        self.check_upstream(job_handle, provider, media_id).await
    }

    async fn check_upstream(
        &self,
        job_handle: &str,
        provider: Option<ProviderKind>,
        media_id: Option<DbId>,
    ) -> Result<JobStatusView, CoreError> {
        let kind = provider.unwrap_or_else(|| self.providers.default_kind());
        let Some(adapter) = self.providers.get(kind) else {
            return Ok(JobStatusView::not_found(job_handle, Some(kind)));
        };

        let media = MediaReference {
            media_id: media_id.unwrap_or_default(),
            image_url: String::new(),
            script: None,
        };

        let observed =
            match tokio::time::timeout(self.upstream_timeout, adapter.check_status(job_handle, &media))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Unavailable(format!(
                    "no answer within {}s",
                    self.upstream_timeout.as_secs()
                ))),
            };

        match observed {
            Ok(observed) => Ok(JobStatusView::from_observation(job_handle, kind, &observed)),
            Err(ProviderError::Rejected { status: 404 | 410, .. }) => {
                tracing::debug!(job_handle, provider = %kind, "Upstream does not know this handle");
                Ok(JobStatusView::not_found(job_handle, Some(kind)))
            }
            Err(ProviderError::Rejected { status, body }) => {
                tracing::warn!(job_handle, provider = %kind, status, "Upstream rejected status check");
                Ok(JobStatusView::failed(job_handle, kind, &body))
            }
            Err(e @ ProviderError::NotConfigured { .. }) => {
                tracing::error!(job_handle, provider = %kind, error = %e, "Upstream status check impossible");
                Err(CoreError::Unavailable(e.to_string()))
            }
            Err(e @ (ProviderError::Unavailable(_) | ProviderError::Malformed(_))) => {
                tracing::warn!(job_handle, provider = %kind, error = %e, "Upstream status check failed");
                Err(CoreError::Unavailable(format!(
                    "Could not reach the {kind} animation provider"
                )))
            }
        }
    }
}

//! Persistence seams for animation jobs and the media they reference.
//!
//! Implemented by `memoria-db` for Postgres and in memory. All writes are
//! conditional on the job's current status so a redelivered queue message
//! cannot move a job backwards or overwrite a terminal outcome.

use async_trait::async_trait;

use crate::animation::{AnimationJob, CheckCounters, ProviderKind};
use crate::error::CoreError;
use crate::media::Media;
use crate::types::DbId;

/// Input for [`JobStore::create`].
#[derive(Debug, Clone)]
pub struct NewAnimationJob {
    pub job_handle: String,
    pub media_id: DbId,
    pub provider: ProviderKind,
    pub image_url: String,
    pub prompt: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness rule was violated (e.g. a second active job for a media item).
    #[error("{0}")]
    Conflict(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Internal(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::Unavailable(msg) => CoreError::Unavailable(msg),
            StoreError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}

/// Storage for animation jobs, keyed by job handle.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Cheap reachability probe used by health checks.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Insert a new `pending` job.
    ///
    /// Fails with [`StoreError::Conflict`] when the media item already has a
    /// non-terminal job, so concurrent duplicate submissions yield exactly
    /// one accepted job.
    async fn create(&self, job: NewAnimationJob) -> Result<AnimationJob, StoreError>;

    /// Remove a `pending` job that never reached the queue.
    async fn discard(&self, job_handle: &str) -> Result<(), StoreError>;

    async fn find_by_handle(&self, job_handle: &str) -> Result<Option<AnimationJob>, StoreError>;

    async fn find_by_provider_handle(
        &self,
        provider: ProviderKind,
        provider_handle: &str,
    ) -> Result<Option<AnimationJob>, StoreError>;

    /// Most recently created job for a media item, terminal or not.
    async fn latest_for_media(&self, media_id: DbId) -> Result<Option<AnimationJob>, StoreError>;

    /// `pending -> processing`, recording the provider's handle.
    /// Returns `false` if the job was not pending.
    async fn mark_processing(
        &self,
        job_handle: &str,
        provider_handle: &str,
    ) -> Result<bool, StoreError>;

    /// Persist the worker's retry counters for a non-terminal job.
    async fn record_counters(
        &self,
        job_handle: &str,
        counters: CheckCounters,
    ) -> Result<(), StoreError>;

    /// `processing -> success`.
    ///
    /// Records `result_url` and flips the owning media item's animated flag
    /// in one atomic write: no reader can see one without the other.
    /// Returns `false` if the job was not processing.
    async fn complete(&self, job_handle: &str, result_url: &str) -> Result<bool, StoreError>;

    /// Any non-terminal state `-> failed` with `detail` stored verbatim.
    /// Returns `false` if the job was already terminal.
    async fn fail(&self, job_handle: &str, detail: &str) -> Result<bool, StoreError>;
}

/// Read access to the media subsystem.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    async fn get_media(&self, media_id: DbId) -> Result<Option<Media>, StoreError>;
}

//! Postgres-backed [`JobStore`], [`MediaCatalog`] and [`Broker`].

use std::time::Duration;

use async_trait::async_trait;
use memoria_core::animation::{AnimationJob, CheckCounters, ProviderKind};
use memoria_core::media::Media;
use memoria_core::queue::{Broker, BrokerError, Delivery};
use memoria_core::store::{JobStore, MediaCatalog, NewAnimationJob, StoreError};
use memoria_core::types::DbId;
use sqlx::PgPool;

use crate::models::animation_job::AnimationJobRow;
use crate::repositories::{AnimationJobRepo, MediaRepo, QueueRepo};

/// Name of the partial unique index guarding one active job per media item.
const ACTIVE_MEDIA_CONSTRAINT: &str = "uq_animation_jobs_active_media";

/// Classify a sqlx error for the store seam.
///
/// - Unique violations on `uq_` constraints become [`StoreError::Conflict`].
/// - Connection-level failures become [`StoreError::Unavailable`].
/// - Everything else is [`StoreError::Internal`].
pub fn classify_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            let constraint = db_err.constraint().unwrap_or("unknown");
            if constraint == ACTIVE_MEDIA_CONSTRAINT {
                StoreError::Conflict("Media already has an animation in progress".into())
            } else if constraint.starts_with("uq_") {
                StoreError::Conflict(format!(
                    "Duplicate value violates unique constraint: {constraint}"
                ))
            } else {
                StoreError::Internal(err.to_string())
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Internal(err.to_string()),
    }
}

fn broker_error(err: sqlx::Error) -> BrokerError {
    match classify_sqlx_error(err) {
        StoreError::Unavailable(msg) => BrokerError::Unavailable(msg),
        other => BrokerError::Internal(other.to_string()),
    }
}

fn into_job(row: AnimationJobRow) -> Result<AnimationJob, StoreError> {
    AnimationJob::try_from(row).map_err(|e| StoreError::Internal(e.to_string()))
}

fn into_job_opt(row: Option<AnimationJobRow>) -> Result<Option<AnimationJob>, StoreError> {
    row.map(into_job).transpose()
}

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

/// Job store and media catalog over a shared connection pool.
#[derive(Clone)]
pub struct PgAnimationStore {
    pool: PgPool,
}

impl PgAnimationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgAnimationStore {
    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool)
            .await
            .map_err(classify_sqlx_error)
    }

    async fn create(&self, job: NewAnimationJob) -> Result<AnimationJob, StoreError> {
        let row = AnimationJobRepo::create(&self.pool, &job)
            .await
            .map_err(classify_sqlx_error)?;
        into_job(row)
    }

    async fn discard(&self, job_handle: &str) -> Result<(), StoreError> {
        AnimationJobRepo::delete_pending(&self.pool, job_handle)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn find_by_handle(&self, job_handle: &str) -> Result<Option<AnimationJob>, StoreError> {
        let row = AnimationJobRepo::find_by_handle(&self.pool, job_handle)
            .await
            .map_err(classify_sqlx_error)?;
        into_job_opt(row)
    }

    async fn find_by_provider_handle(
        &self,
        provider: ProviderKind,
        provider_handle: &str,
    ) -> Result<Option<AnimationJob>, StoreError> {
        let row = AnimationJobRepo::find_by_provider_handle(&self.pool, provider, provider_handle)
            .await
            .map_err(classify_sqlx_error)?;
        into_job_opt(row)
    }

    async fn latest_for_media(&self, media_id: DbId) -> Result<Option<AnimationJob>, StoreError> {
        let row = AnimationJobRepo::latest_for_media(&self.pool, media_id)
            .await
            .map_err(classify_sqlx_error)?;
        into_job_opt(row)
    }

    async fn mark_processing(
        &self,
        job_handle: &str,
        provider_handle: &str,
    ) -> Result<bool, StoreError> {
        AnimationJobRepo::mark_processing(&self.pool, job_handle, provider_handle)
            .await
            .map_err(classify_sqlx_error)
    }

    async fn record_counters(
        &self,
        job_handle: &str,
        counters: CheckCounters,
    ) -> Result<(), StoreError> {
        AnimationJobRepo::update_counters(&self.pool, job_handle, counters)
            .await
            .map_err(classify_sqlx_error)
    }

    async fn complete(&self, job_handle: &str, result_url: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;

        let media_id = AnimationJobRepo::complete(&mut *tx, job_handle, result_url)
            .await
            .map_err(classify_sqlx_error)?;

        let Some(media_id) = media_id else {
            // Not processing any more; nothing to write.
            tx.rollback().await.map_err(classify_sqlx_error)?;
            return Ok(false);
        };

        MediaRepo::set_animated(&mut *tx, media_id, result_url)
            .await
            .map_err(classify_sqlx_error)?;

        tx.commit().await.map_err(classify_sqlx_error)?;

        tracing::debug!(job_handle, media_id, "Recorded animation result and media flag");
        Ok(true)
    }

    async fn fail(&self, job_handle: &str, detail: &str) -> Result<bool, StoreError> {
        AnimationJobRepo::fail(&self.pool, job_handle, detail)
            .await
            .map_err(classify_sqlx_error)
    }
}

#[async_trait]
impl MediaCatalog for PgAnimationStore {
    async fn get_media(&self, media_id: DbId) -> Result<Option<Media>, StoreError> {
        let row = MediaRepo::find_by_id(&self.pool, media_id)
            .await
            .map_err(classify_sqlx_error)?;
        row.map(Media::try_from)
            .transpose()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// Work queue stored in the `animation_queue` table.
#[derive(Clone)]
pub struct PgBroker {
    pool: PgPool,
}

impl PgBroker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Broker for PgBroker {
    async fn enqueue(&self, job_handle: &str, delay: Duration) -> Result<(), BrokerError> {
        QueueRepo::push(&self.pool, job_handle, delay)
            .await
            .map_err(broker_error)?;
        Ok(())
    }

    async fn dequeue(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let row = QueueRepo::claim_next(&self.pool, worker_id, lease)
            .await
            .map_err(broker_error)?;
        Ok(row.map(Delivery::from))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let held = QueueRepo::delete(&self.pool, delivery.id, delivery.deliveries)
            .await
            .map_err(broker_error)?;
        if !held {
            tracing::debug!(job_handle = %delivery.job_handle, "Ack for a lost lease ignored");
        }
        Ok(())
    }

    async fn retry_after(&self, delivery: &Delivery, delay: Duration) -> Result<(), BrokerError> {
        let held = QueueRepo::reschedule(&self.pool, delivery.id, delivery.deliveries, delay)
            .await
            .map_err(broker_error)?;
        if !held {
            tracing::debug!(job_handle = %delivery.job_handle, "Retry for a lost lease ignored");
        }
        Ok(())
    }
}

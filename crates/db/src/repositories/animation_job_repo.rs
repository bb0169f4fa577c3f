//! Repository for the `animation_jobs` table.
//!
//! Every status write is guarded by a `WHERE status_id ...` clause so a
//! redelivered queue message cannot move a job backwards or overwrite a
//! terminal outcome. Callers learn whether the write applied from the
//! returned `bool`.

use memoria_core::animation::{CheckCounters, JobStatus, ProviderKind};
use memoria_core::store::NewAnimationJob;
use memoria_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::animation_job::AnimationJobRow;

/// Column list for `animation_jobs` queries.
const COLUMNS: &str = "\
    id, job_handle, media_id, provider, provider_handle, status_id, \
    result_url, error_detail, image_url, prompt, \
    consecutive_errors, not_found_checks, \
    created_at, updated_at, completed_at";

/// Provides CRUD operations for animation jobs.
pub struct AnimationJobRepo;

impl AnimationJobRepo {
    /// Insert a new pending job.
    ///
    /// Violates `uq_animation_jobs_active_media` when the media item already
    /// has a pending or processing job.
    pub async fn create(
        pool: &PgPool,
        input: &NewAnimationJob,
    ) -> Result<AnimationJobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO animation_jobs (job_handle, media_id, provider, status_id, image_url, prompt) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AnimationJobRow>(&query)
            .bind(&input.job_handle)
            .bind(input.media_id)
            .bind(input.provider.as_str())
            .bind(JobStatus::Pending.id())
            .bind(&input.image_url)
            .bind(&input.prompt)
            .fetch_one(pool)
            .await
    }

    /// Delete a job that is still pending. Used when enqueueing failed.
    pub async fn delete_pending(pool: &PgPool, job_handle: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM animation_jobs WHERE job_handle = $1 AND status_id = $2")
            .bind(job_handle)
            .bind(JobStatus::Pending.id())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_handle(
        pool: &PgPool,
        job_handle: &str,
    ) -> Result<Option<AnimationJobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM animation_jobs WHERE job_handle = $1");
        sqlx::query_as::<_, AnimationJobRow>(&query)
            .bind(job_handle)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_provider_handle(
        pool: &PgPool,
        provider: ProviderKind,
        provider_handle: &str,
    ) -> Result<Option<AnimationJobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM animation_jobs \
             WHERE provider = $1 AND provider_handle = $2 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        sqlx::query_as::<_, AnimationJobRow>(&query)
            .bind(provider.as_str())
            .bind(provider_handle)
            .fetch_optional(pool)
            .await
    }

    /// Most recent job for a media item.
    pub async fn latest_for_media(
        pool: &PgPool,
        media_id: DbId,
    ) -> Result<Option<AnimationJobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM animation_jobs \
             WHERE media_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        sqlx::query_as::<_, AnimationJobRow>(&query)
            .bind(media_id)
            .fetch_optional(pool)
            .await
    }

    /// `pending -> processing`. Resets the error counter.
    pub async fn mark_processing(
        pool: &PgPool,
        job_handle: &str,
        provider_handle: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE animation_jobs \
             SET status_id = $3, provider_handle = $2, consecutive_errors = 0, updated_at = NOW() \
             WHERE job_handle = $1 AND status_id = $4",
        )
        .bind(job_handle)
        .bind(provider_handle)
        .bind(JobStatus::Processing.id())
        .bind(JobStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_counters(
        pool: &PgPool,
        job_handle: &str,
        counters: CheckCounters,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE animation_jobs \
             SET consecutive_errors = $2, not_found_checks = $3, updated_at = NOW() \
             WHERE job_handle = $1 AND status_id IN ($4, $5)",
        )
        .bind(job_handle)
        .bind(counters.consecutive_errors)
        .bind(counters.not_found_checks)
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// `processing -> success`. Returns the media id when the row changed.
    ///
    /// Takes a connection so the caller can run it inside the same
    /// transaction as [`MediaRepo::set_animated`](super::MediaRepo::set_animated).
    pub async fn complete(
        conn: &mut PgConnection,
        job_handle: &str,
        result_url: &str,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE animation_jobs \
             SET status_id = $3, result_url = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE job_handle = $1 AND status_id = $4 \
             RETURNING media_id",
        )
        .bind(job_handle)
        .bind(result_url)
        .bind(JobStatus::Success.id())
        .bind(JobStatus::Processing.id())
        .fetch_optional(conn)
        .await
    }

    /// Any non-terminal state `-> failed`.
    pub async fn fail(pool: &PgPool, job_handle: &str, detail: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE animation_jobs \
             SET status_id = $3, error_detail = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE job_handle = $1 AND status_id IN ($4, $5)",
        )
        .bind(job_handle)
        .bind(detail)
        .bind(JobStatus::Failed.id())
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

//! Repository for the `animation_queue` table.
//!
//! Claims use `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
//! receive the same row, and a lease column so a crashed worker's row is
//! delivered again once the lease runs out.

use std::time::Duration;

use memoria_core::types::DbId;
use sqlx::PgPool;

use crate::models::queue::QueueRow;

pub struct QueueRepo;

impl QueueRepo {
    pub async fn push(pool: &PgPool, job_handle: &str, delay: Duration) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO animation_queue (job_handle, available_at) \
             VALUES ($1, NOW() + make_interval(secs => $2)) \
             RETURNING id",
        )
        .bind(job_handle)
        .bind(delay.as_secs_f64())
        .fetch_one(pool)
        .await
    }

    /// Atomically lease the oldest deliverable row for `worker_id`.
    pub async fn claim_next(
        pool: &PgPool,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<QueueRow>, sqlx::Error> {
        sqlx::query_as::<_, QueueRow>(
            "UPDATE animation_queue \
             SET claimed_by = $1, \
                 lease_expires_at = NOW() + make_interval(secs => $2), \
                 deliveries = deliveries + 1 \
             WHERE id = ( \
                 SELECT id FROM animation_queue \
                 WHERE available_at <= NOW() \
                   AND (lease_expires_at IS NULL OR lease_expires_at < NOW()) \
                 ORDER BY available_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, job_handle, deliveries",
        )
        .bind(worker_id)
        .bind(lease.as_secs_f64())
        .fetch_optional(pool)
        .await
    }

    /// Delete the row if claim number `deliveries` still holds it.
    ///
    /// Returns `false` when the lease has since passed to a later claim.
    pub async fn delete(pool: &PgPool, id: DbId, deliveries: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM animation_queue WHERE id = $1 AND deliveries = $2")
            .bind(id)
            .bind(deliveries)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop the lease and push the row's availability `delay` into the future.
    ///
    /// Same ownership check as [`QueueRepo::delete`].
    pub async fn reschedule(
        pool: &PgPool,
        id: DbId,
        deliveries: i32,
        delay: Duration,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE animation_queue \
             SET claimed_by = NULL, lease_expires_at = NULL, \
                 available_at = NOW() + make_interval(secs => $3) \
             WHERE id = $1 AND deliveries = $2",
        )
        .bind(id)
        .bind(deliveries)
        .bind(delay.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

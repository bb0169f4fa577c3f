//! Row model for the `animation_jobs` table.

use memoria_core::animation::{AnimationJob, JobStatus, ProviderKind};
use memoria_core::error::CoreError;
use memoria_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `animation_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct AnimationJobRow {
    pub id: DbId,
    pub job_handle: String,
    pub media_id: DbId,
    pub provider: String,
    pub provider_handle: Option<String>,
    pub status_id: i16,
    pub result_url: Option<String>,
    pub error_detail: Option<String>,
    pub image_url: String,
    pub prompt: Option<String>,
    pub consecutive_errors: i32,
    pub not_found_checks: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl TryFrom<AnimationJobRow> for AnimationJob {
    type Error = CoreError;

    fn try_from(row: AnimationJobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_id(row.status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "animation job {} has unknown status_id {}",
                row.job_handle, row.status_id
            ))
        })?;

        Ok(AnimationJob {
            id: row.id,
            job_handle: row.job_handle,
            media_id: row.media_id,
            provider: row.provider.parse::<ProviderKind>()?,
            provider_handle: row.provider_handle,
            status,
            result_url: row.result_url,
            error_detail: row.error_detail,
            image_url: row.image_url,
            prompt: row.prompt,
            consecutive_errors: row.consecutive_errors,
            not_found_checks: row.not_found_checks,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

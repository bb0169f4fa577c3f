//! Repository for the animation-relevant columns of the `media` table.

use memoria_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::media::MediaRow;

const COLUMNS: &str =
    "id, memorial_id, file_name, file_url, media_type, is_animated, animation_url";

pub struct MediaRepo;

impl MediaRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<MediaRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM media WHERE id = $1");
        sqlx::query_as::<_, MediaRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Flip the animated flag and record the produced video.
    ///
    /// The only write the animation pipeline makes into `media`. Called
    /// inside the transaction that marks the job successful.
    pub async fn set_animated(
        conn: &mut PgConnection,
        id: DbId,
        animation_url: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE media SET is_animated = TRUE, animation_url = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(animation_url)
        .execute(conn)
        .await?;
        Ok(())
    }
}

use memoria_core::error::CoreError;
use memoria_core::media::{Media, MediaType};
use memoria_core::types::DbId;
use sqlx::FromRow;

/// A row from the `media` table (animation-relevant columns only).
#[derive(Debug, Clone, FromRow)]
pub struct MediaRow {
    pub id: DbId,
    pub memorial_id: DbId,
    pub file_name: String,
    pub file_url: Option<String>,
    pub media_type: String,
    pub is_animated: bool,
    pub animation_url: Option<String>,
}

impl TryFrom<MediaRow> for Media {
    type Error = CoreError;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        Ok(Media {
            id: row.id,
            memorial_id: row.memorial_id,
            file_name: row.file_name,
            file_url: row.file_url,
            media_type: row.media_type.parse::<MediaType>()?,
            is_animated: row.is_animated,
            animation_url: row.animation_url,
        })
    }
}

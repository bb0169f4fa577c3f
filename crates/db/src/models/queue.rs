use memoria_core::queue::Delivery;
use memoria_core::types::DbId;
use sqlx::FromRow;

/// A claimed row from the `animation_queue` table.
#[derive(Debug, Clone, FromRow)]
pub struct QueueRow {
    pub id: DbId,
    pub job_handle: String,
    pub deliveries: i32,
}

impl From<QueueRow> for Delivery {
    fn from(row: QueueRow) -> Self {
        Delivery {
            id: row.id,
            job_handle: row.job_handle,
            deliveries: row.deliveries,
        }
    }
}

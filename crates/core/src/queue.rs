//! Work queue seam between the dispatcher and the workers.
//!
//! Delivery is at-least-once: a message stays invisible to other workers
//! while its lease is held, and becomes deliverable again if the lease
//! expires before it is acknowledged or rescheduled.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::DbId;

/// A leased queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: DbId,
    pub job_handle: String,
    /// How many times this message has been handed to a worker, including
    /// this delivery.
    pub deliveries: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The queue backend is not running or not reachable.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Queue error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Make `job_handle` deliverable after `delay`.
    async fn enqueue(&self, job_handle: &str, delay: Duration) -> Result<(), BrokerError>;

    /// Claim the next deliverable message for `worker_id`, leasing it for
    /// `lease`. No two workers hold the same message at once.
    async fn dequeue(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Delivery>, BrokerError>;

    /// Remove a message permanently.
    ///
    /// Ignored when the lease has expired and the message was claimed again.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Release the lease and make the message deliverable again after `delay`.
    ///
    /// Ignored when the lease has expired and the message was claimed again.
    async fn retry_after(&self, delivery: &Delivery, delay: Duration) -> Result<(), BrokerError>;
}

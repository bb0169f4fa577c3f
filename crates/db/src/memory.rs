//! In-process store and broker.
//!
//! Used when no `DATABASE_URL` is configured and by the test suites. They
//! follow the same conditional-write rules as the Postgres implementations:
//! a single lock guards jobs and media together, so recording a result and
//! flipping the media flag are observed as one step.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use memoria_core::animation::{AnimationJob, CheckCounters, JobStatus, ProviderKind};
use memoria_core::media::Media;
use memoria_core::queue::{Broker, BrokerError, Delivery};
use memoria_core::store::{JobStore, MediaCatalog, NewAnimationJob, StoreError};
use memoria_core::types::DbId;
use tokio::sync::Mutex;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    next_id: DbId,
    /// Jobs in insertion order.
    jobs: Vec<AnimationJob>,
    media: HashMap<DbId, Media>,
    unavailable: bool,
}

impl StoreState {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }

    fn job_mut(&mut self, job_handle: &str) -> Option<&mut AnimationJob> {
        self.jobs.iter_mut().find(|j| j.job_handle == job_handle)
    }
}

/// [`JobStore`] and [`MediaCatalog`] held in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a media item.
    pub async fn insert_media(&self, media: Media) {
        self.state.lock().await.media.insert(media.id, media);
    }

    /// Snapshot of every job, oldest first.
    pub async fn jobs(&self) -> Vec<AnimationJob> {
        self.state.lock().await.jobs.clone()
    }

    /// Simulate an outage: every call fails with [`StoreError::Unavailable`].
    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.unavailable = !available;
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.state.lock().await.check_available()
    }

    async fn create(&self, job: NewAnimationJob) -> Result<AnimationJob, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        if state.jobs.iter().any(|j| j.job_handle == job.job_handle) {
            return Err(StoreError::Conflict(format!(
                "Duplicate value violates unique constraint: uq_animation_jobs_job_handle ({})",
                job.job_handle
            )));
        }
        if state
            .jobs
            .iter()
            .any(|j| j.media_id == job.media_id && !j.is_terminal())
        {
            return Err(StoreError::Conflict(
                "Media already has an animation in progress".into(),
            ));
        }

        state.next_id += 1;
        let now = Utc::now();
        let created = AnimationJob {
            id: state.next_id,
            job_handle: job.job_handle,
            media_id: job.media_id,
            provider: job.provider,
            provider_handle: None,
            status: JobStatus::Pending,
            result_url: None,
            error_detail: None,
            image_url: job.image_url,
            prompt: job.prompt,
            consecutive_errors: 0,
            not_found_checks: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.jobs.push(created.clone());
        Ok(created)
    }

    async fn discard(&self, job_handle: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state
            .jobs
            .retain(|j| !(j.job_handle == job_handle && j.status == JobStatus::Pending));
        Ok(())
    }

    async fn find_by_handle(&self, job_handle: &str) -> Result<Option<AnimationJob>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .jobs
            .iter()
            .find(|j| j.job_handle == job_handle)
            .cloned())
    }

    async fn find_by_provider_handle(
        &self,
        provider: ProviderKind,
        provider_handle: &str,
    ) -> Result<Option<AnimationJob>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .jobs
            .iter()
            .rev()
            .find(|j| j.provider == provider && j.provider_handle.as_deref() == Some(provider_handle))
            .cloned())
    }

    async fn latest_for_media(&self, media_id: DbId) -> Result<Option<AnimationJob>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .jobs
            .iter()
            .rev()
            .find(|j| j.media_id == media_id)
            .cloned())
    }

    async fn mark_processing(
        &self,
        job_handle: &str,
        provider_handle: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let Some(job) = state
            .job_mut(job_handle)
            .filter(|j| j.status == JobStatus::Pending)
        else {
            return Ok(false);
        };
        job.status = JobStatus::Processing;
        job.provider_handle = Some(provider_handle.to_string());
        job.consecutive_errors = 0;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_counters(
        &self,
        job_handle: &str,
        counters: CheckCounters,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        if let Some(job) = state.job_mut(job_handle).filter(|j| !j.is_terminal()) {
            job.consecutive_errors = counters.consecutive_errors;
            job.not_found_checks = counters.not_found_checks;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete(&self, job_handle: &str, result_url: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        let now = Utc::now();
        let Some(job) = state
            .job_mut(job_handle)
            .filter(|j| j.status == JobStatus::Processing)
        else {
            return Ok(false);
        };
        job.status = JobStatus::Success;
        job.result_url = Some(result_url.to_string());
        job.completed_at = Some(now);
        job.updated_at = now;
        let media_id = job.media_id;

        if let Some(media) = state.media.get_mut(&media_id) {
            media.is_animated = true;
            media.animation_url = Some(result_url.to_string());
        }
        Ok(true)
    }

    async fn fail(&self, job_handle: &str, detail: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let Some(job) = state.job_mut(job_handle).filter(|j| !j.is_terminal()) else {
            return Ok(false);
        };
        let now = Utc::now();
        job.status = JobStatus::Failed;
        job.error_detail = Some(detail.to_string());
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }
}

#[async_trait]
impl MediaCatalog for MemoryStore {
    async fn get_media(&self, media_id: DbId) -> Result<Option<Media>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.media.get(&media_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

struct QueueEntry {
    id: DbId,
    job_handle: String,
    available_at: Instant,
    lease_expires_at: Option<Instant>,
    deliveries: i32,
}

impl QueueEntry {
    fn is_deliverable(&self, now: Instant) -> bool {
        self.available_at <= now && self.lease_expires_at.is_none_or(|until| until <= now)
    }

    /// A later claim bumps `deliveries`, so an older delivery no longer matches.
    fn is_held_by(&self, delivery: &Delivery) -> bool {
        self.id == delivery.id && self.deliveries == delivery.deliveries
    }
}

#[derive(Default)]
struct BrokerState {
    next_id: DbId,
    entries: Vec<QueueEntry>,
    unavailable: bool,
}

impl BrokerState {
    fn check_available(&self) -> Result<(), BrokerError> {
        if self.unavailable {
            return Err(BrokerError::Unavailable(
                "in-memory queue switched off".into(),
            ));
        }
        Ok(())
    }
}

/// [`Broker`] held in memory, with leases measured on the tokio clock.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages not yet acknowledged.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Simulate the queue service being down.
    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.unavailable = !available;
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, job_handle: &str, delay: Duration) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.next_id += 1;
        let id = state.next_id;
        state.entries.push(QueueEntry {
            id,
            job_handle: job_handle.to_string(),
            available_at: Instant::now() + delay,
            lease_expires_at: None,
            deliveries: 0,
        });
        Ok(())
    }

    async fn dequeue(
        &self,
        _worker_id: &str,
        lease: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        let now = Instant::now();
        let next = state
            .entries
            .iter_mut()
            .filter(|e| e.is_deliverable(now))
            .min_by_key(|e| (e.available_at, e.id));

        Ok(next.map(|entry| {
            entry.lease_expires_at = Some(now + lease);
            entry.deliveries += 1;
            Delivery {
                id: entry.id,
                job_handle: entry.job_handle.clone(),
                deliveries: entry.deliveries,
            }
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.entries.retain(|e| !e.is_held_by(delivery));
        Ok(())
    }

    async fn retry_after(&self, delivery: &Delivery, delay: Duration) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        if let Some(entry) = state.entries.iter_mut().find(|e| e.is_held_by(delivery)) {
            entry.lease_expires_at = None;
            entry.available_at = Instant::now() + delay;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use memoria_core::media::MediaType;

    use super::*;

    fn photo(id: DbId) -> Media {
        Media {
            id,
            memorial_id: 1,
            file_name: "photo.jpg".into(),
            file_url: None,
            media_type: MediaType::Photo,
            is_animated: false,
            animation_url: None,
        }
    }

    fn new_job(handle: &str, media_id: DbId) -> NewAnimationJob {
        NewAnimationJob {
            job_handle: handle.into(),
            media_id,
            provider: ProviderKind::HeyGen,
            image_url: "https://cdn/photo.jpg".into(),
            prompt: None,
        }
    }

    // -- Store --

    #[tokio::test]
    async fn concurrent_creates_for_same_media_accept_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        store.insert_media(photo(42)).await;

        let a = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.create(new_job("a", 42)).await }
        });
        let b = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.create(new_job("b", 42)).await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::Conflict(_))))
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(conflicts, 1);
    }

    #[tokio::test]
    async fn terminal_job_allows_new_submission() {
        let store = MemoryStore::new();
        store.create(new_job("a", 42)).await.unwrap();
        assert!(store.fail("a", "bad image").await.unwrap());
        assert!(store.create(new_job("b", 42)).await.is_ok());

        let latest = store.latest_for_media(42).await.unwrap().unwrap();
        assert_eq!(latest.job_handle, "b");
    }

    #[tokio::test]
    async fn complete_sets_result_and_media_flag_together() {
        let store = MemoryStore::new();
        store.insert_media(photo(42)).await;
        store.create(new_job("h1", 42)).await.unwrap();
        assert!(store.mark_processing("h1", "vid-1").await.unwrap());

        assert!(store.complete("h1", "https://cdn/x.mp4").await.unwrap());

        let job = store.find_by_handle("h1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.result_url.as_deref(), Some("https://cdn/x.mp4"));
        job.check_invariants().unwrap();

        let media = store.get_media(42).await.unwrap().unwrap();
        assert!(media.is_animated);
        assert_eq!(media.animation_url.as_deref(), Some("https://cdn/x.mp4"));
    }

    #[tokio::test]
    async fn terminal_jobs_ignore_further_writes() {
        let store = MemoryStore::new();
        store.create(new_job("h1", 42)).await.unwrap();
        store.mark_processing("h1", "vid-1").await.unwrap();
        store.complete("h1", "https://cdn/x.mp4").await.unwrap();

        assert!(!store.complete("h1", "https://cdn/other.mp4").await.unwrap());
        assert!(!store.fail("h1", "late").await.unwrap());
        assert!(!store.mark_processing("h1", "vid-2").await.unwrap());

        let job = store.find_by_handle("h1").await.unwrap().unwrap();
        assert_eq!(job.result_url.as_deref(), Some("https://cdn/x.mp4"));
        assert!(job.error_detail.is_none());
    }

    #[tokio::test]
    async fn complete_requires_processing() {
        let store = MemoryStore::new();
        store.create(new_job("h1", 42)).await.unwrap();
        assert!(!store.complete("h1", "https://cdn/x.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn discard_only_removes_pending_jobs() {
        let store = MemoryStore::new();
        store.create(new_job("h1", 42)).await.unwrap();
        store.discard("h1").await.unwrap();
        assert!(store.find_by_handle("h1").await.unwrap().is_none());

        store.create(new_job("h2", 42)).await.unwrap();
        store.mark_processing("h2", "vid").await.unwrap();
        store.discard("h2").await.unwrap();
        assert!(store.find_by_handle("h2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn provider_handle_lookup() {
        let store = MemoryStore::new();
        store.create(new_job("h1", 42)).await.unwrap();
        store.mark_processing("h1", "vid-9").await.unwrap();

        let found = store
            .find_by_provider_handle(ProviderKind::HeyGen, "vid-9")
            .await
            .unwrap();
        assert_eq!(found.map(|j| j.job_handle), Some("h1".to_string()));
        assert!(store
            .find_by_provider_handle(ProviderKind::Did, "vid-9")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unavailable_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false).await;
        assert_matches!(store.ping().await, Err(StoreError::Unavailable(_)));
        assert_matches!(
            store.create(new_job("h1", 42)).await,
            Err(StoreError::Unavailable(_))
        );
    }

    // -- Broker --

    #[tokio::test(start_paused = true)]
    async fn leased_message_is_hidden_until_lease_expires() {
        let broker = MemoryBroker::new();
        broker.enqueue("h1", Duration::ZERO).await.unwrap();

        let first = broker
            .dequeue("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .expect("message should be deliverable");
        assert_eq!(first.deliveries, 1);
        assert!(broker
            .dequeue("w2", Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());

        tokio::time::advance(Duration::from_secs(31)).await;

        let redelivered = broker
            .dequeue("w2", Duration::from_secs(30))
            .await
            .unwrap()
            .expect("expired lease should be redelivered");
        assert_eq!(redelivered.id, first.id);
        assert_eq!(redelivered.deliveries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_holder_cannot_release_new_lease() {
        let broker = MemoryBroker::new();
        broker.enqueue("h1", Duration::ZERO).await.unwrap();

        let stale = broker
            .dequeue("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let current = broker
            .dequeue("w2", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.deliveries, 2);

        broker.retry_after(&stale, Duration::ZERO).await.unwrap();
        broker.ack(&stale).await.unwrap();

        assert_eq!(broker.len().await, 1);
        assert!(broker
            .dequeue("w3", Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());

        broker.ack(&current).await.unwrap();
        assert!(broker.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_delays_redelivery() {
        let broker = MemoryBroker::new();
        broker.enqueue("h1", Duration::ZERO).await.unwrap();
        let delivery = broker
            .dequeue("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        broker
            .retry_after(&delivery, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(broker
            .dequeue("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(broker
            .dequeue("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn ack_removes_message() {
        let broker = MemoryBroker::new();
        broker.enqueue("h1", Duration::ZERO).await.unwrap();
        let delivery = broker
            .dequeue("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        broker.ack(&delivery).await.unwrap();
        assert!(broker.is_empty().await);
    }

    #[tokio::test]
    async fn unavailable_broker_rejects_enqueue() {
        let broker = MemoryBroker::new();
        broker.set_available(false).await;
        assert_matches!(
            broker.enqueue("h1", Duration::ZERO).await,
            Err(BrokerError::Unavailable(_))
        );
    }
}

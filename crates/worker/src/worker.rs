//! The animation worker loop.
//!
//! Consumes deliveries from the [`Broker`] and advances each job one step.
//! Every store write is conditional on the job's current status, so a
//! delivery that is redelivered after a crash (or processed twice after a
//! lease expiry) cannot move a job backwards or change a terminal outcome.

use std::sync::Arc;
use std::time::Duration;

use memoria_core::animation::{
    transition_on_status, AnimationJob, CheckCounters, JobStatus, ProviderStatus, Transition,
    PROVIDER_LOST_JOB_DETAIL, PROVIDER_UNAVAILABLE_DETAIL,
};
use memoria_core::queue::{Broker, BrokerError, Delivery};
use memoria_core::store::{JobStore, StoreError};
use memoria_provider::{AnimationProvider, MediaReference, ProviderError, ProviderRegistry};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffConfig;
use crate::config::WorkerConfig;

/// What happened to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The message was removed; the job is terminal or gone.
    Acked,
    /// The job is still running; the message comes back after the delay.
    Rescheduled(Duration),
    /// Infrastructure failure. The lease is left to expire so another
    /// attempt picks the message up later.
    Abandoned,
}

/// Drives animation jobs from the queue.
#[derive(Clone)]
pub struct AnimationWorker {
    store: Arc<dyn JobStore>,
    broker: Arc<dyn Broker>,
    providers: ProviderRegistry,
    config: Arc<WorkerConfig>,
}

impl AnimationWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        broker: Arc<dyn Broker>,
        providers: ProviderRegistry,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            broker,
            providers,
            config: Arc::new(config),
        }
    }

    /// Run the worker loop until the cancellation token is triggered.
    ///
    /// At most `concurrency` deliveries are processed at once. In-flight
    /// steps are allowed to finish before this returns.
    pub async fn run(&self, cancel: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut in_flight = JoinSet::new();

        tracing::info!(
            worker_id = %self.config.worker_id,
            concurrency = self.config.concurrency,
            check_interval_ms = self.config.check_interval.as_millis() as u64,
            "Animation worker started",
        );

        loop {
            while in_flight.try_join_next().is_some() {}

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.broker.dequeue(&self.config.worker_id, self.config.lease) => next,
            };

            match next {
                Ok(Some(delivery)) => {
                    let worker = self.clone();
                    in_flight.spawn(async move {
                        worker.process(&delivery).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.idle_poll) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::warn!(error = %e, "Failed to dequeue animation job");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.idle_poll) => {}
                    }
                }
            }
        }

        tracing::info!(in_flight = in_flight.len(), "Animation worker shutting down");
        while in_flight.join_next().await.is_some() {}
    }

    /// Dequeue and process a single delivery, if one is available.
    pub async fn run_once(&self) -> Result<Option<StepOutcome>, BrokerError> {
        let Some(delivery) = self
            .broker
            .dequeue(&self.config.worker_id, self.config.lease)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(self.process(&delivery).await))
    }

    /// Advance the job behind `delivery` by one step.
    pub async fn process(&self, delivery: &Delivery) -> StepOutcome {
        let job = match self.store.find_by_handle(&delivery.job_handle).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_handle = %delivery.job_handle, "Queued animation job no longer exists");
                return self.ack(delivery).await;
            }
            Err(e) => return self.abandon(delivery, &e),
        };

        if job.is_terminal() {
            tracing::debug!(job_handle = %job.job_handle, status = job.status.as_str(), "Job already terminal");
            return self.ack(delivery).await;
        }

        let Some(provider) = self.providers.get(job.provider) else {
            let detail = format!("No adapter registered for provider {}", job.provider);
            return self.fail(delivery, &job, &detail).await;
        };

        let media = MediaReference {
            media_id: job.media_id,
            image_url: job.image_url.clone(),
            script: job.prompt.clone(),
        };

        match job.status {
            JobStatus::Pending => self.submit(delivery, &job, provider.as_ref(), &media).await,
            JobStatus::Processing => self.check(delivery, &job, provider.as_ref(), &media).await,
            JobStatus::Success | JobStatus::Failed => self.ack(delivery).await,
        }
    }

    // ---- steps ----

    async fn submit(
        &self,
        delivery: &Delivery,
        job: &AnimationJob,
        provider: &dyn AnimationProvider,
        media: &MediaReference,
    ) -> StepOutcome {
        let provider_handle = match provider.submit(media).await {
            Ok(handle) => handle,
            Err(e) => return self.provider_error(delivery, job, e).await,
        };

        match self
            .store
            .mark_processing(&job.job_handle, &provider_handle)
            .await
        {
            Ok(true) => {
                tracing::info!(
                    job_handle = %job.job_handle,
                    provider = %job.provider,
                    provider_handle = %provider_handle,
                    media_id = job.media_id,
                    "Animation submitted",
                );
            }
            Ok(false) => {
                tracing::warn!(
                    job_handle = %job.job_handle,
                    provider_handle = %provider_handle,
                    "Job left pending before submission was recorded",
                );
            }
            Err(e) => return self.abandon(delivery, &e),
        }

        self.reschedule(delivery, self.config.check_interval).await
    }

    async fn check(
        &self,
        delivery: &Delivery,
        job: &AnimationJob,
        provider: &dyn AnimationProvider,
        media: &MediaReference,
    ) -> StepOutcome {
        let Some(provider_handle) = job.provider_handle.as_deref() else {
            return self
                .fail(delivery, job, "Animation job has no provider handle")
                .await;
        };

        let observed = match provider.check_status(provider_handle, media).await {
            Ok(observed) => observed,
            Err(e) => return self.provider_error(delivery, job, e).await,
        };

        tracing::debug!(
            job_handle = %job.job_handle,
            provider_handle,
            observed = ?observed,
            "Provider status read",
        );

        match transition_on_status(job.status, &observed) {
            Transition::Succeed { result_url } => {
                match self.store.complete(&job.job_handle, &result_url).await {
                    Ok(applied) => {
                        if applied {
                            tracing::info!(
                                job_handle = %job.job_handle,
                                media_id = job.media_id,
                                result_url = %result_url,
                                "Animation completed",
                            );
                        }
                        self.ack(delivery).await
                    }
                    Err(e) => self.abandon(delivery, &e),
                }
            }
            Transition::Fail { detail } => self.fail(delivery, job, &detail).await,
            Transition::Unchanged => {
                let counters = CheckCounters {
                    consecutive_errors: 0,
                    not_found_checks: if observed == ProviderStatus::NotFound {
                        job.not_found_checks + 1
                    } else {
                        0
                    },
                };

                if counters.not_found_checks >= self.config.max_not_found_checks {
                    return self.fail(delivery, job, PROVIDER_LOST_JOB_DETAIL).await;
                }

                if counters != CheckCounters::from(job) {
                    if let Err(e) = self.store.record_counters(&job.job_handle, counters).await {
                        return self.abandon(delivery, &e);
                    }
                }

                self.reschedule(delivery, self.config.check_interval).await
            }
        }
    }

    /// Terminal provider errors fail the job with the provider's message.
    /// Retryable ones count toward the error budget and back off.
    async fn provider_error(
        &self,
        delivery: &Delivery,
        job: &AnimationJob,
        error: ProviderError,
    ) -> StepOutcome {
        if !error.is_retryable() {
            tracing::warn!(job_handle = %job.job_handle, error = %error, "Provider rejected animation");
            return self.fail(delivery, job, &error.to_string()).await;
        }

        let counters = CheckCounters {
            consecutive_errors: job.consecutive_errors + 1,
            not_found_checks: job.not_found_checks,
        };

        tracing::warn!(
            job_handle = %job.job_handle,
            consecutive_errors = counters.consecutive_errors,
            error = %error,
            "Provider call failed",
        );

        if counters.consecutive_errors >= self.config.max_consecutive_errors {
            return self.fail(delivery, job, PROVIDER_UNAVAILABLE_DETAIL).await;
        }

        if let Err(e) = self.store.record_counters(&job.job_handle, counters).await {
            return self.abandon(delivery, &e);
        }

        let delay = BackoffConfig::starting_at(self.config.check_interval)
            .delay_after(counters.consecutive_errors);
        self.reschedule(delivery, delay).await
    }

    // ---- store and queue helpers ----

    async fn fail(&self, delivery: &Delivery, job: &AnimationJob, detail: &str) -> StepOutcome {
        match self.store.fail(&job.job_handle, detail).await {
            Ok(applied) => {
                if applied {
                    tracing::info!(
                        job_handle = %job.job_handle,
                        media_id = job.media_id,
                        detail,
                        "Animation failed",
                    );
                }
                self.ack(delivery).await
            }
            Err(e) => self.abandon(delivery, &e),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> StepOutcome {
        match self.broker.ack(delivery).await {
            Ok(()) => StepOutcome::Acked,
            Err(e) => {
                tracing::error!(job_handle = %delivery.job_handle, error = %e, "Failed to ack delivery");
                StepOutcome::Abandoned
            }
        }
    }

    async fn reschedule(&self, delivery: &Delivery, delay: Duration) -> StepOutcome {
        match self.broker.retry_after(delivery, delay).await {
            Ok(()) => StepOutcome::Rescheduled(delay),
            Err(e) => {
                tracing::error!(job_handle = %delivery.job_handle, error = %e, "Failed to reschedule delivery");
                StepOutcome::Abandoned
            }
        }
    }

    fn abandon(&self, delivery: &Delivery, error: &StoreError) -> StepOutcome {
        tracing::error!(
            job_handle = %delivery.job_handle,
            deliveries = delivery.deliveries,
            error = %error,
            "Store write failed, leaving delivery for redelivery",
        );
        StepOutcome::Abandoned
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

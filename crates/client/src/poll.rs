//! Cancellable status polling for a single job.

use std::time::Duration;

use memoria_core::animation::{NormalizedStatus, DEFAULT_FAILURE_DETAIL};
use tokio_util::sync::CancellationToken;

use crate::api::{StatusQuery, StatusSource};

/// Spacing and budget for [`poll_job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Longest a single status request may take. An unanswered request
    /// still spends its attempt.
    pub request_timeout: Duration,
}

impl Default for PollPolicy {
    /// 5 s apart, 120 attempts: about ten minutes.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// How a poll ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success { result_url: String },
    /// The job failed upstream; `detail` is the provider's message.
    Failed { detail: String },
    /// Attempt budget exhausted. The job itself may still finish.
    TimedOut { attempts: u32 },
    /// The status endpoint could not be reached.
    Error { message: String },
    Cancelled,
}

/// Poll `source` until the job reaches a terminal state, the attempt budget
/// runs out, or `cancel` fires.
///
/// The first request goes out one interval after the call. A request already
/// in flight when `cancel` fires is allowed to finish, but its answer is
/// dropped. A request that outlives `policy.request_timeout` is abandoned and
/// polling carries on, so the loop always ends within
/// `max_attempts * (interval + request_timeout)`.
pub async fn poll_job(
    source: &dyn StatusSource,
    query: &StatusQuery,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> PollOutcome {
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return PollOutcome::Cancelled,
            () = tokio::time::sleep(policy.interval) => {}
        }

        let result =
            tokio::time::timeout(policy.request_timeout, source.fetch_status(query)).await;
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }
        let Ok(result) = result else {
            tracing::warn!(
                job_handle = %query.job_handle,
                attempt,
                timeout_secs = policy.request_timeout.as_secs(),
                "Status request got no answer in time",
            );
            continue;
        };

        match result {
            Ok(report) => match report.status {
                NormalizedStatus::Success => match report.result_url.filter(|u| !u.is_empty()) {
                    Some(result_url) => {
                        tracing::debug!(job_handle = %query.job_handle, attempt, "Animation finished");
                        return PollOutcome::Success { result_url };
                    }
                    None => {
                        tracing::debug!(
                            job_handle = %query.job_handle,
                            attempt,
                            "Success reported without a result URL, polling again",
                        );
                    }
                },
                NormalizedStatus::Failed => {
                    let detail = report
                        .error_detail
                        .filter(|d| !d.is_empty())
                        .unwrap_or_else(|| DEFAULT_FAILURE_DETAIL.to_string());
                    return PollOutcome::Failed { detail };
                }
                NormalizedStatus::Pending
                | NormalizedStatus::Processing
                | NormalizedStatus::NotFound => {}
            },
            Err(e) if e.is_not_found() => {
                tracing::debug!(job_handle = %query.job_handle, attempt, "Job not visible yet");
            }
            Err(e) => {
                tracing::warn!(job_handle = %query.job_handle, attempt, error = %e, "Status check failed");
                return PollOutcome::Error {
                    message: e.to_string(),
                };
            }
        }
    }

    tracing::info!(
        job_handle = %query.job_handle,
        attempts = policy.max_attempts,
        "Gave up waiting for animation",
    );
    PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::api::StatusReport;
    use crate::error::FetchError;

    /// Answers from a script, then `processing` forever.
    pub(crate) struct ScriptedSource {
        script: Mutex<VecDeque<Result<StatusReport, FetchError>>>,
        pub(crate) calls: AtomicU32,
        /// Cancelled from inside the request with this many calls made.
        cancel_on_call: Option<(u32, CancellationToken)>,
    }

    impl ScriptedSource {
        pub(crate) fn new(script: Vec<Result<StatusReport, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                cancel_on_call: None,
            }
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch_status(&self, query: &StatusQuery) -> Result<StatusReport, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((at, token)) = &self.cancel_on_call {
                if *at == call {
                    token.cancel();
                }
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(StatusReport::bare(&query.job_handle, NormalizedStatus::Processing)))
        }
    }

    /// Never answers.
    struct SilentSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl StatusSource for SilentSource {
        async fn fetch_status(&self, _query: &StatusQuery) -> Result<StatusReport, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    pub(crate) fn processing() -> Result<StatusReport, FetchError> {
        Ok(StatusReport::bare("h1", NormalizedStatus::Processing))
    }

    pub(crate) fn success(url: Option<&str>) -> Result<StatusReport, FetchError> {
        Ok(StatusReport {
            result_url: url.map(str::to_string),
            ..StatusReport::bare("h1", NormalizedStatus::Success)
        })
    }

    fn failed(detail: &str) -> Result<StatusReport, FetchError> {
        Ok(StatusReport {
            error_detail: Some(detail.to_string()),
            ..StatusReport::bare("h1", NormalizedStatus::Failed)
        })
    }

    fn query() -> StatusQuery {
        StatusQuery {
            job_handle: "h1".into(),
            provider: None,
            media_id: Some(42),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn perpetual_processing_times_out_after_budget() {
        let source = ScriptedSource::new(vec![]);
        let start = Instant::now();

        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &CancellationToken::new()).await;

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 120 });
        assert_eq!(source.calls(), 120);
        assert_eq!(start.elapsed(), Duration::from_secs(600));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 120);
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_waits_one_interval() {
        let source = ScriptedSource::new(vec![success(Some("https://cdn/x.mp4"))]);
        let start = Instant::now();

        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &CancellationToken::new()).await;

        assert_matches!(outcome, PollOutcome::Success { .. });
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_early_keeps_polling() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::NotFound),
            Ok(StatusReport::bare("h1", NormalizedStatus::NotFound)),
            processing(),
            success(Some("https://cdn/x.mp4")),
        ]);

        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            PollOutcome::Success {
                result_url: "https://cdn/x.mp4".into()
            }
        );
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_on_second_poll_stops_immediately() {
        let source = ScriptedSource::new(vec![processing(), failed("quota_exceeded")]);

        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                detail: "quota_exceeded".into()
            }
        );
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_without_detail_uses_generic_message() {
        let source = ScriptedSource::new(vec![Ok(StatusReport::bare("h1", NormalizedStatus::Failed))]);

        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                detail: DEFAULT_FAILURE_DETAIL.into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_url_is_not_terminal() {
        let source = ScriptedSource::new(vec![
            success(None),
            success(Some("")),
            success(Some("https://cdn/x.mp4")),
        ]);

        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &CancellationToken::new()).await;

        assert_matches!(outcome, PollOutcome::Success { result_url } if result_url == "https://cdn/x.mp4");
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_url_counts_toward_budget() {
        let source = ScriptedSource::new(vec![success(None), success(None), success(None)]);
        let policy = PollPolicy {
            max_attempts: 3,
            ..PollPolicy::default()
        };

        let outcome = poll_job(&source, &query(), &policy, &CancellationToken::new()).await;

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_stops_with_error() {
        let source = ScriptedSource::new(vec![
            processing(),
            Err(FetchError::Transport("connection refused".into())),
        ]);

        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &CancellationToken::new()).await;

        assert_matches!(outcome, PollOutcome::Error { message } if message.contains("connection refused"));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_poll_issues_no_request() {
        let source = ScriptedSource::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &cancel).await;

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn answer_arriving_after_cancel_is_discarded() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource {
            cancel_on_call: Some((2, cancel.clone())),
            ..ScriptedSource::new(vec![processing(), success(Some("https://cdn/x.mp4"))])
        };

        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &cancel).await;

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_requests_still_time_out() {
        let source = SilentSource {
            calls: AtomicU32::new(0),
        };
        let policy = PollPolicy::default();
        let start = Instant::now();

        let outcome = poll_job(&source, &query(), &policy, &CancellationToken::new()).await;

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 120 });
        assert_eq!(source.calls.load(Ordering::SeqCst), 120);
        assert_eq!(start.elapsed(), (policy.interval + policy.request_timeout) * 120);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_is_abandoned_and_polling_continues() {
        struct SlowFirst {
            calls: AtomicU32,
        }

        #[async_trait]
        impl StatusSource for SlowFirst {
            async fn fetch_status(&self, _query: &StatusQuery) -> Result<StatusReport, FetchError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                success(Some("https://cdn/x.mp4"))
            }
        }

        let source = SlowFirst {
            calls: AtomicU32::new(0),
        };
        let outcome = poll_job(&source, &query(), &PollPolicy::default(), &CancellationToken::new()).await;

        assert_matches!(outcome, PollOutcome::Success { result_url } if result_url == "https://cdn/x.mp4");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}

//! Per-view animation state.
//!
//! An [`AnimationSession`] belongs to one view. It tracks which media items
//! have an animation in flight, runs one poll task per job, and tears all of
//! them down when the view goes away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use memoria_core::types::DbId;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::api::{StatusQuery, StatusSource};
use crate::poll::{poll_job, PollOutcome, PollPolicy};

/// Called once per successful job with the media id and result URL.
pub type RefreshCallback = Arc<dyn Fn(DbId, &str) + Send + Sync>;

/// What the view shows for one media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Pending { job_handle: String },
    Succeeded { result_url: String },
    Failed { detail: String },
    TimedOut,
    Errored { message: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Media {media_id} is already being animated")]
    AlreadyWatching { media_id: DbId },

    #[error("Session is closed")]
    Closed,
}

type States = Arc<Mutex<HashMap<DbId, WatchState>>>;

pub struct AnimationSession {
    source: Arc<dyn StatusSource>,
    policy: PollPolicy,
    cancel: CancellationToken,
    states: States,
    tasks: Mutex<JoinSet<()>>,
    on_refresh: RefreshCallback,
}

impl AnimationSession {
    /// Must be called inside a tokio runtime; poll tasks are spawned on it.
    pub fn new(source: Arc<dyn StatusSource>, policy: PollPolicy, on_refresh: RefreshCallback) -> Self {
        Self {
            source,
            policy,
            cancel: CancellationToken::new(),
            states: Arc::default(),
            tasks: Mutex::new(JoinSet::new()),
            on_refresh,
        }
    }

    /// Start tracking `query` for `media_id`.
    ///
    /// Refused while an earlier job for the same media item is still
    /// pending. A finished entry is replaced.
    pub fn watch(&self, media_id: DbId, query: StatusQuery) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }

        {
            let mut states = lock(&self.states);
            if let Some(WatchState::Pending { .. }) = states.get(&media_id) {
                return Err(SessionError::AlreadyWatching { media_id });
            }
            states.insert(
                media_id,
                WatchState::Pending {
                    job_handle: query.job_handle.clone(),
                },
            );
        }

        let source = Arc::clone(&self.source);
        let states = Arc::clone(&self.states);
        let on_refresh = Arc::clone(&self.on_refresh);
        let policy = self.policy;
        let token = self.cancel.child_token();

        lock(&self.tasks).spawn(async move {
            let outcome = poll_job(source.as_ref(), &query, &policy, &token).await;

            let next = match outcome {
                PollOutcome::Cancelled => return,
                PollOutcome::Success { result_url } => WatchState::Succeeded { result_url },
                PollOutcome::Failed { detail } => WatchState::Failed { detail },
                PollOutcome::TimedOut { .. } => WatchState::TimedOut,
                PollOutcome::Error { message } => WatchState::Errored { message },
            };

            let refresh_url = {
                let mut states = lock(&states);
                // close() cancels before clearing, so this check under the
                // lock keeps a late result out of a torn-down session.
                if token.is_cancelled() {
                    return;
                }
                let url = match &next {
                    WatchState::Succeeded { result_url } => Some(result_url.clone()),
                    _ => None,
                };
                states.insert(media_id, next);
                url
            };

            if let Some(url) = refresh_url {
                on_refresh(media_id, &url);
            }
        });

        Ok(())
    }

    pub fn state(&self, media_id: DbId) -> Option<WatchState> {
        lock(&self.states).get(&media_id).cloned()
    }

    pub fn is_pending(&self, media_id: DbId) -> bool {
        matches!(self.state(media_id), Some(WatchState::Pending { .. }))
    }

    /// Wait for every poll task started so far to end.
    pub async fn settled(&self) {
        let mut tasks = std::mem::take(&mut *lock(&self.tasks));
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Animation poll task failed");
            }
        }
    }

    /// Stop every poll and forget all state.
    pub fn close(&self) {
        self.cancel.cancel();
        lock(&self.states).clear();
    }
}

impl Drop for AnimationSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//! Animation job model and the status state machine.
//!
//! A job moves `pending -> processing -> success | failed`. Only the worker
//! drives these transitions; the functions here decide *what* the next state
//! is from a provider observation, without touching storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::media::Media;
use crate::types::{DbId, Timestamp};

/// Detail recorded when a provider reports failure without a message.
pub const DEFAULT_FAILURE_DETAIL: &str = "Animation failed";

/// Detail recorded when the worker gives up after repeated adapter errors.
pub const PROVIDER_UNAVAILABLE_DETAIL: &str =
    "Animation provider is unavailable. Please try again later.";

/// Detail recorded when the provider never acknowledges a submitted job.
pub const PROVIDER_LOST_JOB_DETAIL: &str = "Animation provider does not recognise this job";

// ---------------------------------------------------------------------------
// Provider identity
// ---------------------------------------------------------------------------

/// External animation provider a job is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "heygen")]
    HeyGen,
    #[serde(rename = "did", alias = "d-id")]
    Did,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::HeyGen, ProviderKind::Did];

    /// Canonical lowercase tag, as stored on the job row.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::HeyGen => "heygen",
            ProviderKind::Did => "did",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heygen" => Ok(ProviderKind::HeyGen),
            "did" | "d-id" => Ok(ProviderKind::Did),
            other => Err(CoreError::Validation(format!(
                "Unknown animation provider '{other}'. Expected one of: heygen, did"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Stored job status
// ---------------------------------------------------------------------------

/// Persisted job status. Discriminants match `animation_job_statuses` seed ids.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Enqueued, not yet submitted to the provider.
    Pending = 1,
    /// Submitted; provider reports in-progress or has not indexed it yet.
    Processing = 2,
    Success = 3,
    Failed = 4,
}

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> i16 {
        self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(JobStatus::Pending),
            2 => Some(JobStatus::Processing),
            3 => Some(JobStatus::Success),
            4 => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Wire status
// ---------------------------------------------------------------------------

/// The status vocabulary exposed to clients of the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedStatus {
    Pending,
    #[serde(alias = "in_progress")]
    Processing,
    #[serde(alias = "completed", alias = "done")]
    Success,
    #[serde(alias = "error")]
    Failed,
    NotFound,
}

impl NormalizedStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NormalizedStatus::Success | NormalizedStatus::Failed)
    }
}

impl From<JobStatus> for NormalizedStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => NormalizedStatus::Pending,
            JobStatus::Processing => NormalizedStatus::Processing,
            JobStatus::Success => NormalizedStatus::Success,
            JobStatus::Failed => NormalizedStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider observation
// ---------------------------------------------------------------------------

/// One status reading from a provider, already translated out of the
/// provider's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    /// Accepted but not started.
    Pending,
    InProgress,
    /// The provider has no record of the handle (yet).
    NotFound,
    /// Provider says it is done. The URL may still be missing.
    Completed { result_url: Option<String> },
    Failed { detail: String },
}

impl ProviderStatus {
    /// The usable result URL, if this reading carries one.
    pub fn result_url(&self) -> Option<&str> {
        match self {
            ProviderStatus::Completed {
                result_url: Some(url),
            } => {
                let url = url.trim();
                (!url.is_empty()).then_some(url)
            }
            _ => None,
        }
    }

    /// Completion without a URL is reported as `processing`.
    pub fn normalized(&self) -> NormalizedStatus {
        match self {
            ProviderStatus::Pending => NormalizedStatus::Pending,
            ProviderStatus::InProgress => NormalizedStatus::Processing,
            ProviderStatus::NotFound => NormalizedStatus::NotFound,
            ProviderStatus::Completed { .. } => match self.result_url() {
                Some(_) => NormalizedStatus::Success,
                None => NormalizedStatus::Processing,
            },
            ProviderStatus::Failed { .. } => NormalizedStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// What the worker must write after a status reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Stay in the current state and check again later.
    Unchanged,
    Succeed { result_url: String },
    Fail { detail: String },
}

/// Decide the next transition for a job in `current` after observing
/// `observed` from the provider.
///
/// Terminal and not-yet-submitted jobs never move on a status reading.
pub fn transition_on_status(current: JobStatus, observed: &ProviderStatus) -> Transition {
    if current != JobStatus::Processing {
        return Transition::Unchanged;
    }

    match observed {
        ProviderStatus::Completed { .. } => match observed.result_url() {
            Some(url) => Transition::Succeed {
                result_url: url.to_string(),
            },
            None => Transition::Unchanged,
        },
        ProviderStatus::Failed { detail } => Transition::Fail {
            detail: failure_detail(detail),
        },
        ProviderStatus::Pending | ProviderStatus::InProgress | ProviderStatus::NotFound => {
            Transition::Unchanged
        }
    }
}

/// Keep the provider's message verbatim, substituting a default when empty.
pub fn failure_detail(detail: &str) -> String {
    if detail.trim().is_empty() {
        DEFAULT_FAILURE_DETAIL.to_string()
    } else {
        detail.to_string()
    }
}

// ---------------------------------------------------------------------------
// Job record
// ---------------------------------------------------------------------------

/// One animation request and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationJob {
    pub id: DbId,
    /// Dispatcher-assigned handle returned to the client.
    pub job_handle: String,
    pub media_id: DbId,
    pub provider: ProviderKind,
    /// Handle assigned by the provider once submission succeeded.
    pub provider_handle: Option<String>,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error_detail: Option<String>,
    /// Public URL of the still image sent to the provider.
    pub image_url: String,
    /// Optional narration script.
    pub prompt: Option<String>,
    pub consecutive_errors: i32,
    pub not_found_checks: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl AnimationJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Verify that `result_url` is set iff success and `error_detail` iff failed.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        let success = self.status == JobStatus::Success;
        let failed = self.status == JobStatus::Failed;

        if self.result_url.is_some() != success {
            return Err(CoreError::Internal(format!(
                "job {} has status {} but result_url is {}",
                self.job_handle,
                self.status.as_str(),
                if self.result_url.is_some() { "set" } else { "missing" },
            )));
        }
        if self.error_detail.is_some() != failed {
            return Err(CoreError::Internal(format!(
                "job {} has status {} but error_detail is {}",
                self.job_handle,
                self.status.as_str(),
                if self.error_detail.is_some() { "set" } else { "missing" },
            )));
        }
        Ok(())
    }
}

/// Counters the worker carries between deliveries of the same job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckCounters {
    pub consecutive_errors: i32,
    pub not_found_checks: i32,
}

impl From<&AnimationJob> for CheckCounters {
    fn from(job: &AnimationJob) -> Self {
        Self {
            consecutive_errors: job.consecutive_errors,
            not_found_checks: job.not_found_checks,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch eligibility
// ---------------------------------------------------------------------------

/// Check that `media` may be animated, given the most recent job for it.
///
/// - Only still photos can be animated (`Validation`).
/// - Already animated media, or media with a non-terminal job, is a `Conflict`.
pub fn ensure_can_animate(media: &Media, latest: Option<&AnimationJob>) -> Result<(), CoreError> {
    if !media.is_still_image() {
        return Err(CoreError::Validation(format!(
            "Media {} is not a photo and cannot be animated",
            media.id
        )));
    }

    if media.is_animated {
        return Err(CoreError::Conflict(format!(
            "Media {} is already animated",
            media.id
        )));
    }

    if let Some(job) = latest.filter(|job| !job.is_terminal()) {
        return Err(CoreError::Conflict(format!(
            "Media {} already has an animation in progress ({})",
            media.id, job.job_handle
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;
    use crate::media::MediaType;

    fn job(status: JobStatus) -> AnimationJob {
        let now = Utc::now();
        AnimationJob {
            id: 1,
            job_handle: "h1".into(),
            media_id: 42,
            provider: ProviderKind::HeyGen,
            provider_handle: None,
            status,
            result_url: None,
            error_detail: None,
            image_url: "https://cdn/photo.jpg".into(),
            prompt: None,
            consecutive_errors: 0,
            not_found_checks: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn photo() -> Media {
        Media {
            id: 42,
            memorial_id: 7,
            file_name: "grandma.jpg".into(),
            file_url: None,
            media_type: MediaType::Photo,
            is_animated: false,
            animation_url: None,
        }
    }

    // -- Provider kind --

    #[test]
    fn provider_kind_parses_aliases() {
        assert_eq!("heygen".parse::<ProviderKind>().unwrap(), ProviderKind::HeyGen);
        assert_eq!("D-ID".parse::<ProviderKind>().unwrap(), ProviderKind::Did);
        assert_eq!(" did ".parse::<ProviderKind>().unwrap(), ProviderKind::Did);
    }

    #[test]
    fn provider_kind_rejects_unknown() {
        assert_matches!(
            "runway".parse::<ProviderKind>(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn provider_kind_serializes_as_tag() {
        assert_eq!(serde_json::to_string(&ProviderKind::Did).unwrap(), "\"did\"");
        let parsed: ProviderKind = serde_json::from_str("\"d-id\"").unwrap();
        assert_eq!(parsed, ProviderKind::Did);
    }

    // -- Status ids --

    #[test]
    fn status_ids_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Success,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(JobStatus::from_id(9), None);
    }

    #[test]
    fn only_success_and_failed_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn normalized_status_accepts_error_alias() {
        let parsed: NormalizedStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, NormalizedStatus::Failed);
        let parsed: NormalizedStatus = serde_json::from_str("\"not_found\"").unwrap();
        assert_eq!(parsed, NormalizedStatus::NotFound);
    }

    // -- Provider observations --

    #[test]
    fn completed_without_url_normalizes_to_processing() {
        let empty = ProviderStatus::Completed {
            result_url: Some("  ".into()),
        };
        assert_eq!(empty.normalized(), NormalizedStatus::Processing);
        assert_eq!(
            ProviderStatus::Completed { result_url: None }.normalized(),
            NormalizedStatus::Processing
        );
    }

    #[test]
    fn completed_with_url_normalizes_to_success() {
        let done = ProviderStatus::Completed {
            result_url: Some("https://cdn/x.mp4".into()),
        };
        assert_eq!(done.normalized(), NormalizedStatus::Success);
        assert_eq!(done.result_url(), Some("https://cdn/x.mp4"));
    }

    // -- Transitions --

    #[test]
    fn processing_job_succeeds_only_with_url() {
        let with_url = ProviderStatus::Completed {
            result_url: Some("https://cdn/x.mp4".into()),
        };
        assert_eq!(
            transition_on_status(JobStatus::Processing, &with_url),
            Transition::Succeed {
                result_url: "https://cdn/x.mp4".into()
            }
        );

        let without_url = ProviderStatus::Completed {
            result_url: Some(String::new()),
        };
        assert_eq!(
            transition_on_status(JobStatus::Processing, &without_url),
            Transition::Unchanged
        );
    }

    #[test]
    fn in_progress_and_not_found_keep_processing() {
        for observed in [
            ProviderStatus::Pending,
            ProviderStatus::InProgress,
            ProviderStatus::NotFound,
        ] {
            assert_eq!(
                transition_on_status(JobStatus::Processing, &observed),
                Transition::Unchanged
            );
        }
    }

    #[test]
    fn explicit_failure_preserves_detail() {
        let failed = ProviderStatus::Failed {
            detail: "quota_exceeded".into(),
        };
        assert_eq!(
            transition_on_status(JobStatus::Processing, &failed),
            Transition::Fail {
                detail: "quota_exceeded".into()
            }
        );
    }

    #[test]
    fn empty_failure_detail_gets_default() {
        let failed = ProviderStatus::Failed { detail: " ".into() };
        assert_eq!(
            transition_on_status(JobStatus::Processing, &failed),
            Transition::Fail {
                detail: DEFAULT_FAILURE_DETAIL.into()
            }
        );
    }

    #[test]
    fn terminal_jobs_never_move() {
        let failed = ProviderStatus::Failed {
            detail: "late failure".into(),
        };
        assert_eq!(
            transition_on_status(JobStatus::Success, &failed),
            Transition::Unchanged
        );
        let done = ProviderStatus::Completed {
            result_url: Some("https://cdn/y.mp4".into()),
        };
        assert_eq!(
            transition_on_status(JobStatus::Failed, &done),
            Transition::Unchanged
        );
    }

    // -- Invariants --

    #[test]
    fn invariants_hold_for_consistent_records() {
        assert!(job(JobStatus::Pending).check_invariants().is_ok());

        let mut ok = job(JobStatus::Success);
        ok.result_url = Some("https://cdn/x.mp4".into());
        assert!(ok.check_invariants().is_ok());

        let mut failed = job(JobStatus::Failed);
        failed.error_detail = Some("bad image".into());
        assert!(failed.check_invariants().is_ok());
    }

    #[test]
    fn invariants_reject_url_without_success() {
        let mut broken = job(JobStatus::Processing);
        broken.result_url = Some("https://cdn/x.mp4".into());
        assert_matches!(broken.check_invariants(), Err(CoreError::Internal(_)));
    }

    #[test]
    fn invariants_reject_failure_without_detail() {
        assert_matches!(
            job(JobStatus::Failed).check_invariants(),
            Err(CoreError::Internal(_))
        );
    }

    // -- Eligibility --

    #[test]
    fn fresh_photo_can_be_animated() {
        assert!(ensure_can_animate(&photo(), None).is_ok());
        assert!(ensure_can_animate(&photo(), Some(&job(JobStatus::Failed))).is_ok());
    }

    #[test]
    fn non_photo_is_rejected_as_validation() {
        let mut video = photo();
        video.media_type = MediaType::Video;
        assert_matches!(
            ensure_can_animate(&video, None),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn animated_or_in_flight_media_conflicts() {
        let mut animated = photo();
        animated.is_animated = true;
        assert_matches!(
            ensure_can_animate(&animated, None),
            Err(CoreError::Conflict(_))
        );
        assert_matches!(
            ensure_can_animate(&photo(), Some(&job(JobStatus::Processing))),
            Err(CoreError::Conflict(_))
        );
    }
}

//! Client side of the animation protocol.
//!
//! [`ApiClient`] talks to the HTTP API, [`poll_job`] tracks one job to a
//! terminal state, and [`AnimationSession`] keeps the in-flight animation
//! state for a single view.

pub mod api;
pub mod error;
pub mod poll;
pub mod session;

pub use api::{ApiClient, DEFAULT_REQUEST_TIMEOUT, DispatchResponse, StatusQuery, StatusReport, StatusSource};
pub use error::FetchError;
pub use poll::{poll_job, PollOutcome, PollPolicy};
pub use session::{AnimationSession, SessionError, WatchState};

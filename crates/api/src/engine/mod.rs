//! Request-side orchestration: dispatching new animations and answering
//! status polls.

pub mod dispatcher;
pub mod status;

pub use dispatcher::{AnimateRequest, AnimationDispatcher, DispatchedJob};
pub use status::{JobStatusView, StatusService};

//! Queue consumer that drives animation jobs through their lifecycle.
//!
//! Each queue delivery advances one job by exactly one step: submit it to
//! the provider, or read its status once. Non-terminal jobs go back on the
//! queue with a delay, so a single worker can carry many jobs at once and a
//! crashed worker only loses its leases.

pub mod backoff;
pub mod config;
pub mod shutdown;
pub mod worker;

pub use config::WorkerConfig;
pub use shutdown::{shutdown_signal, ShutdownSignal};
pub use worker::{AnimationWorker, StepOutcome};

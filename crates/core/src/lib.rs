//! Memoria domain core.
//!
//! Pure types and rules for the photo-animation pipeline: job status state
//! machine, provider identities, the media model referenced by jobs, and the
//! collaborator traits (job store, queue broker, media catalog) that the
//! persistence crate implements. No I/O lives here.

pub mod animation;
pub mod error;
pub mod media;
pub mod queue;
pub mod store;
pub mod types;

//! Database row structs.
//!
//! Rows decode with `FromRow` and convert into the `memoria_core` domain
//! types, validating status ids and provider tags on the way.

pub mod animation_job;
pub mod media;
pub mod queue;

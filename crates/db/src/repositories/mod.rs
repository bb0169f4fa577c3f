//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async SQL methods
//! that accept `&PgPool` (or a connection, for transactional steps) as the
//! first argument.

pub mod animation_job_repo;
pub mod media_repo;
pub mod queue_repo;

pub use animation_job_repo::AnimationJobRepo;
pub use media_repo::MediaRepo;
pub use queue_repo::QueueRepo;

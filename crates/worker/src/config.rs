use std::time::Duration;

/// Worker tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifies this worker on queue leases.
    pub worker_id: String,
    /// Maximum deliveries processed at once.
    pub concurrency: usize,
    /// Delay between status checks of a non-terminal job.
    pub check_interval: Duration,
    /// Sleep when the queue is empty.
    pub idle_poll: Duration,
    /// How long a delivery stays invisible to other workers.
    pub lease: Duration,
    /// Consecutive adapter errors tolerated before a job is failed.
    pub max_consecutive_errors: i32,
    /// Consecutive `not_found` readings tolerated before a job is failed.
    pub max_not_found_checks: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-local".into(),
            concurrency: 8,
            check_interval: Duration::from_secs(5),
            idle_poll: Duration::from_millis(1000),
            lease: Duration::from_secs(120),
            max_consecutive_errors: 5,
            max_not_found_checks: 60,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default            |
    /// |---------------------------------|--------------------|
    /// | `WORKER_ID`                     | `worker-{uuid}`    |
    /// | `WORKER_CONCURRENCY`            | `8`                |
    /// | `WORKER_CHECK_INTERVAL_SECS`    | `5`                |
    /// | `WORKER_IDLE_POLL_MS`           | `1000`             |
    /// | `WORKER_LEASE_SECS`             | `120`              |
    /// | `WORKER_MAX_CONSECUTIVE_ERRORS` | `5`                |
    /// | `WORKER_MAX_NOT_FOUND_CHECKS`   | `60`               |
    pub fn from_env() -> Self {
        let worker_id = std::env::var("WORKER_ID")
            .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4()));

        let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| "8".into())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");

        let check_interval_secs: u64 = std::env::var("WORKER_CHECK_INTERVAL_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("WORKER_CHECK_INTERVAL_SECS must be a valid u64");

        let idle_poll_ms: u64 = std::env::var("WORKER_IDLE_POLL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("WORKER_IDLE_POLL_MS must be a valid u64");

        let lease_secs: u64 = std::env::var("WORKER_LEASE_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("WORKER_LEASE_SECS must be a valid u64");

        let max_consecutive_errors: i32 = std::env::var("WORKER_MAX_CONSECUTIVE_ERRORS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("WORKER_MAX_CONSECUTIVE_ERRORS must be a valid i32");

        let max_not_found_checks: i32 = std::env::var("WORKER_MAX_NOT_FOUND_CHECKS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("WORKER_MAX_NOT_FOUND_CHECKS must be a valid i32");

        Self {
            worker_id,
            concurrency: concurrency.max(1),
            check_interval: Duration::from_secs(check_interval_secs),
            idle_poll: Duration::from_millis(idle_poll_ms),
            lease: Duration::from_secs(lease_secs),
            max_consecutive_errors: max_consecutive_errors.max(1),
            max_not_found_checks: max_not_found_checks.max(1),
        }
    }
}

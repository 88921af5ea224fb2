use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The poll interval must be strictly positive.
    #[error("`poll_interval_ms` cannot be zero")]
    PollIntervalZero,
    /// A deletion timeout must be strictly positive.
    #[error("`{0}` cannot be zero")]
    TimeoutZero(&'static str),
    /// The poll interval must fit at least once inside every timeout.
    #[error("`poll_interval_ms` ({interval_ms}) must not exceed `{field}` ({timeout_ms})")]
    IntervalExceedsTimeout {
        field: &'static str,
        interval_ms: u64,
        timeout_ms: u64,
    },
}

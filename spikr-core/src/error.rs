use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration problems. Everything that can go wrong once a run has started is recorded in
/// the statistics instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`workers` must be a positive integer")]
    InvalidWorkers,

    #[error("`rate` must be a positive, finite number")]
    InvalidRate,

    #[error("`time_unit` must be a positive duration")]
    InvalidTimeUnit,

    #[error("`max_workers` must be a positive integer")]
    InvalidMaxWorkers,

    #[error("`min_workers` ({min}) must be <= `max_workers` ({max})")]
    InvalidMinWorkers { min: u64, max: u64 },

    #[error("`max_burst` must be a positive integer")]
    InvalidMaxBurst,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`request_timeout` must be a positive duration")]
    InvalidRequestTimeout,

    #[error(
        "`request_timeout` ({timeout:?}) must be shorter than `graceful_stop` ({grace:?})"
    )]
    RequestTimeoutNotBelowGrace { timeout: Duration, grace: Duration },

    #[error("`live_threshold_interval` must be a positive duration")]
    InvalidLiveThresholdInterval,

    #[error("`exact_sample_limit` must be a positive integer")]
    InvalidExactSampleLimit,

    #[error("invalid base url `{0}` (expected http:// or https://)")]
    InvalidBaseUrl(String),

    #[error(
        "invalid executor `{0}` (expected `closed-loop`, `constant-vus`, `open-loop`, or `constant-arrival-rate`)"
    )]
    InvalidExecutor(String),

    #[error("invalid threshold `{expr}`: {reason}")]
    InvalidThreshold { expr: String, reason: String },

    #[error("run already started")]
    AlreadyStarted,
}

impl Error {
    pub(crate) fn threshold(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidThreshold {
            expr: expr.into(),
            reason: reason.into(),
        }
    }
}

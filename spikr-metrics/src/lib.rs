#![forbid(unsafe_code)]

mod collector;
mod digest;
mod rps;
mod stats;

pub use collector::{DropReason, InFlightGuard, LatencyWindow, MetricsCollector};
pub use digest::{
    DEFAULT_EXACT_SAMPLE_LIMIT, LatencyDigest, is_supported_percentile, percentile_ladder,
};
pub use rps::RpsSummary;
pub use stats::{
    CheckSummary, EndpointSummary, LatencySummary, PercentileValue, RunningStats,
    StatusClassCounts,
};

use std::time::Duration;

use crate::scheduler::SchedulerState;

#[derive(Debug, Clone, Default)]
pub struct LiveMetrics {
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,

    /// Failed requests / total requests during the last progress interval (0..=1).
    pub error_rate_now: f64,

    /// Iterations/sec completed during the last progress interval.
    pub iterations_per_sec_now: f64,

    pub requests_total: u64,
    pub errors_total: u64,
    pub iterations_total: u64,
    pub checks_failed_total: u64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,

    /// `None` when no request finished during the interval.
    pub latency_p50_ms_now: Option<f64>,
    pub latency_p95_ms_now: Option<f64>,

    pub in_flight: u64,
}

#[derive(Debug, Clone)]
pub enum ScenarioProgress {
    ClosedLoop {
        workers: u64,
        duration: Duration,
    },
    OpenLoop {
        rate: f64,
        time_unit: Duration,
        duration: Duration,
        active_workers: u64,
        busy_workers: u64,
        max_workers: u64,
        dropped_iterations_total: u64,
    },
}

impl ScenarioProgress {
    pub fn duration(&self) -> Duration {
        match self {
            Self::ClosedLoop { duration, .. } | Self::OpenLoop { duration, .. } => *duration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    pub scenario: String,
    pub state: SchedulerState,
    pub metrics: LiveMetrics,
    pub progress: ScenarioProgress,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

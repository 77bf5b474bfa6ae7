#![forbid(unsafe_code)]

mod config;
mod controller;
mod error;
mod pacer;
mod pool;
mod progress;
mod scheduler;
mod thresholds;
mod worker;
mod workload;

pub use config::{
    DEFAULT_GRACEFUL_STOP, DEFAULT_IDLE_RECLAIM, DEFAULT_REQUEST_TIMEOUT, ExecutionModel,
    MissedTickPolicy, RunConfig, ScenarioConfig, ScenarioExecutor,
};
pub use controller::RunController;
pub use error::{Error, Result};
pub use pacer::{ArrivalClock, TickBatch};
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress};
pub use scheduler::{ScenarioScheduler, SchedulerReport, SchedulerState};
pub use thresholds::{
    RunVerdict, ThresholdMetric, ThresholdOp, ThresholdResult, ThresholdSpec, evaluate,
    first_abort,
};
pub use workload::{IterationContext, Workload};

pub use tokio_util::sync::CancellationToken;

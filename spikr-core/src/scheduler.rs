use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use spikr_http::RequestIssuer;
use spikr_metrics::{DropReason, MetricsCollector};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::config::{ScenarioConfig, ScenarioExecutor};
use crate::pacer::ArrivalClock;
use crate::pool::{PoolGauge, WorkerPool};
use crate::worker::WorkerShared;
use crate::workload::Workload;
use crate::{Error, Result};

/// Lifecycle of one scheduler run. Only ever moves forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    /// Iterations are being started.
    Running,
    /// No new iterations; in-flight ones get `graceful_stop` to finish.
    Draining,
    /// Every worker has exited.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerReport {
    /// From entering `Running` to entering `Stopped`.
    pub elapsed: Duration,
    /// The stop token fired before the configured duration elapsed.
    pub cancelled: bool,
    /// The drain grace expired and outstanding requests were abandoned.
    pub grace_expired: bool,
}

/// Drives a [`Workload`] under one execution model and feeds every outcome into a
/// [`MetricsCollector`].
pub struct ScenarioScheduler<I> {
    scenario: ScenarioConfig,
    base_url: Arc<str>,
    workload: Arc<dyn Workload>,
    issuer: Arc<I>,
    metrics: Arc<MetricsCollector>,
    request_timeout: Option<Duration>,
    seed: Option<u64>,
    stop: CancellationToken,
    abort: CancellationToken,
    gauge: Arc<PoolGauge>,
    state: watch::Sender<SchedulerState>,
}

impl<I: RequestIssuer> ScenarioScheduler<I> {
    pub fn new(
        scenario: ScenarioConfig,
        base_url: impl Into<Arc<str>>,
        workload: Arc<dyn Workload>,
        issuer: Arc<I>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            scenario,
            base_url: base_url.into(),
            workload,
            issuer,
            metrics,
            request_timeout: None,
            seed: None,
            stop: CancellationToken::new(),
            abort: CancellationToken::new(),
            gauge: Arc::new(PoolGauge::default()),
            state,
        }
    }

    /// Default timeout for requests whose spec does not set one.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Cancelling `parent` stops this scheduler.
    #[must_use]
    pub fn with_stop_token(mut self, parent: &CancellationToken) -> Self {
        self.stop = parent.child_token();
        self
    }

    pub fn scenario(&self) -> &ScenarioConfig {
        &self.scenario
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Ends the run early. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Workers currently alive (pool size for open-loop).
    pub fn active_workers(&self) -> u64 {
        self.gauge.workers()
    }

    /// Workers currently running an iteration.
    pub fn busy_workers(&self) -> u64 {
        self.gauge.busy()
    }

    pub fn max_workers(&self) -> u64 {
        self.scenario.executor.max_workers()
    }

    fn transition(&self, next: SchedulerState) {
        let prev = self.state.send_replace(next);
        log::info!("scheduler {prev} -> {next}");
    }

    /// Runs the scenario to completion. Can only be called once.
    pub async fn run(&self) -> Result<SchedulerReport> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Running;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(Error::AlreadyStarted);
        }
        log::info!(
            "scheduler idle -> running ({}, {:?})",
            self.scenario.model(),
            self.scenario.duration
        );

        let start = Instant::now();
        let deadline = start + self.scenario.duration;
        let shared = Arc::new(WorkerShared {
            issuer: self.issuer.clone(),
            workload: self.workload.clone(),
            metrics: self.metrics.clone(),
            base_url: self.base_url.clone(),
            think_time: self.scenario.think_time,
            request_timeout: self.request_timeout,
            seed: self.seed,
            stop: self.stop.clone(),
            abort: self.abort.clone(),
        });

        let tasks = match &self.scenario.executor {
            ScenarioExecutor::ClosedLoop { workers } => {
                self.closed_loop(shared, *workers, deadline).await
            }
            ScenarioExecutor::OpenLoop {
                rate,
                time_unit,
                min_workers,
                max_workers,
                missed_ticks,
                idle_reclaim,
            } => {
                let pool = WorkerPool::new(
                    shared,
                    *min_workers,
                    *max_workers,
                    *idle_reclaim,
                    self.gauge.clone(),
                );
                let clock = ArrivalClock::new(
                    start.into_std(),
                    *rate,
                    *time_unit,
                    self.scenario.duration,
                    *missed_ticks,
                    *max_workers,
                );
                log::debug!(
                    "open loop: {} tick(s) every {:?}",
                    clock.total_ticks(),
                    clock.interval()
                );
                self.open_loop(pool, clock, deadline).await
            }
        };

        let cancelled = self.stop.is_cancelled();
        if cancelled {
            log::info!("run cancelled after {:?}", start.elapsed());
        }
        self.stop.cancel();
        self.transition(SchedulerState::Draining);

        let grace_expired = self.drain(tasks).await;
        self.gauge.set_workers(0);
        self.transition(SchedulerState::Stopped);

        Ok(SchedulerReport {
            elapsed: start.elapsed(),
            cancelled,
            grace_expired,
        })
    }

    async fn closed_loop(
        &self,
        shared: Arc<WorkerShared<I>>,
        workers: u64,
        deadline: Instant,
    ) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for worker_id in 1..=workers {
            tasks.spawn(shared.clone().run_closed_loop(worker_id));
        }
        self.gauge.set_workers(workers);

        tokio::select! {
            _ = sleep_until(deadline) => {}
            _ = self.stop.cancelled() => {}
        }
        tasks
    }

    async fn open_loop(
        &self,
        mut pool: WorkerPool<I>,
        mut clock: ArrivalClock,
        deadline: Instant,
    ) -> JoinSet<()> {
        let mut warned_capacity = false;

        while !clock.is_finished() {
            let due = Instant::from_std(clock.next_due());
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return pool.shutdown(),
                _ = sleep_until(due) => {}
            }

            let batch = clock.poll(std::time::Instant::now());
            if batch.dropped > 0 {
                log::debug!(
                    "dispatcher fell behind; dropped {} tick(s) at tick {}",
                    batch.dropped,
                    clock.next_tick()
                );
                self.metrics
                    .record_dropped_iterations(batch.dropped, DropReason::MissedSchedule);
            }

            let mut refused = 0;
            for _ in 0..batch.dispatch {
                if !pool.dispatch() {
                    refused += 1;
                }
            }
            if refused > 0 {
                if !warned_capacity {
                    log::warn!(
                        "all {} workers busy; dropping iterations (insufficient max_workers)",
                        pool.len()
                    );
                    warned_capacity = true;
                }
                self.metrics
                    .record_dropped_iterations(refused, DropReason::CapacityExhausted);
            }

            pool.reclaim_idle();
        }

        tokio::select! {
            biased;
            _ = self.stop.cancelled() => {}
            _ = sleep_until(deadline) => {}
        }
        pool.shutdown()
    }

    /// Waits up to `graceful_stop` for workers, then abandons whatever is still in flight.
    /// Returns whether the grace expired.
    async fn drain(&self, mut tasks: JoinSet<()>) -> bool {
        let grace = self.scenario.graceful_stop;
        if tokio::time::timeout(grace, join_all(&mut tasks))
            .await
            .is_ok()
        {
            return false;
        }

        log::warn!(
            "graceful stop ({grace:?}) expired with {} worker(s) still running; abandoning in-flight requests",
            tasks.len()
        );
        self.abort.cancel();
        join_all(&mut tasks).await;
        true
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.join_next().await {
        if let Err(err) = res {
            log::error!("worker task failed: {err}");
        }
    }
}

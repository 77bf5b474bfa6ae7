use std::convert::Infallible;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use spikr_http::RequestIssuer;
use spikr_metrics::{MetricsCollector, RunningStats};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::config::{RunConfig, ScenarioExecutor};
use crate::progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress};
use crate::scheduler::{ScenarioScheduler, SchedulerState};
use crate::thresholds::{self, RunVerdict};
use crate::workload::Workload;
use crate::{Error, Result};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Totals at the previous progress tick, for per-interval deltas.
#[derive(Debug, Default, Clone, Copy)]
struct LastTotals {
    requests: u64,
    errors: u64,
    iterations: u64,
}

/// Owns one run: scheduler, collector, progress and threshold evaluation.
pub struct RunController<I> {
    config: RunConfig,
    metrics: Arc<MetricsCollector>,
    scheduler: ScenarioScheduler<I>,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
    started: OnceLock<Instant>,
}

impl<I: RequestIssuer> RunController<I> {
    /// Validates `config` up front; nothing runs until [`RunController::run`].
    pub fn new(config: RunConfig, workload: Arc<dyn Workload>, issuer: Arc<I>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(MetricsCollector::new(config.exact_sample_limit));
        let cancel = CancellationToken::new();
        let scheduler = ScenarioScheduler::new(
            config.scenario.clone(),
            config.base_url.as_str(),
            workload,
            issuer,
            metrics.clone(),
        )
        .with_request_timeout(config.request_timeout)
        .with_seed(config.seed)
        .with_stop_token(&cancel);

        Ok(Self {
            config,
            metrics,
            scheduler,
            cancel,
            progress: None,
            started: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Moves the scheduler to `Draining`. The verdict is still produced.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels the run when cancelled, e.g. from a ctrl-c handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.scheduler.subscribe()
    }

    pub fn current_snapshot(&self) -> RunningStats {
        let elapsed = self.started.get().map_or(Duration::ZERO, Instant::elapsed);
        self.metrics.snapshot(elapsed)
    }

    /// Runs to completion and judges the result. Can only be called once.
    pub async fn run(&self) -> Result<RunVerdict> {
        let start = Instant::now();
        if self.started.set(start).is_err() {
            return Err(Error::AlreadyStarted);
        }

        log::info!(
            "run `{}` starting: {} against {} for {:?}",
            self.config.name,
            self.config.scenario.model(),
            self.config.base_url,
            self.config.scenario.duration
        );

        let report = tokio::select! {
            report = self.scheduler.run() => report?,
            never = self.monitor(start) => match never {},
        };

        let stats = self.metrics.snapshot(report.elapsed);
        let mut verdict = thresholds::evaluate(&stats, &self.config.thresholds);
        verdict.cancelled = report.cancelled;

        for v in &verdict.violations {
            log::info!(
                "threshold `{}` failed: observed {}",
                v.threshold,
                v.observed
                    .map_or_else(|| "nothing".to_string(), |o| format!("{o:.4}"))
            );
        }
        log::info!(
            "run `{}` {} after {:?}: {} requests, {} errors, {} dropped iterations",
            self.config.name,
            if verdict.passed { "passed" } else { "failed" },
            report.elapsed,
            stats.requests,
            stats.errors,
            stats.dropped_iterations()
        );

        Ok(verdict)
    }

    /// Progress and live thresholds. Never finishes on its own; dropped when the scheduler
    /// stops.
    async fn monitor(&self, start: Instant) -> Infallible {
        let mut progress = interval_at(start + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut live = self.config.live_threshold_interval.map(|every| {
            let mut i = interval_at(start + every, every);
            i.set_missed_tick_behavior(MissedTickBehavior::Delay);
            i
        });

        let mut tick_id: u64 = 0;
        let mut last_at = start;
        let mut last = LastTotals::default();

        loop {
            tokio::select! {
                _ = progress.tick() => {
                    tick_id = tick_id.saturating_add(1);
                    let now = Instant::now();
                    let dt = now.duration_since(last_at);
                    last_at = now;
                    self.on_progress_tick(tick_id, now.duration_since(start), dt, &mut last);
                }
                _ = async {
                    match live.as_mut() {
                        Some(i) => {
                            i.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => self.check_live(start),
            }
        }
    }

    fn on_progress_tick(&self, tick: u64, elapsed: Duration, dt: Duration, last: &mut LastTotals) {
        let stats = self.metrics.snapshot(elapsed);
        let window = self.metrics.take_latency_window();
        let secs = dt.as_secs_f64().max(1e-9);

        let delta_requests = stats.requests.saturating_sub(last.requests);
        let delta_errors = stats.errors.saturating_sub(last.errors);
        let delta_iterations = stats.iterations.saturating_sub(last.iterations);
        *last = LastTotals {
            requests: stats.requests,
            errors: stats.errors,
            iterations: stats.iterations,
        };

        let rps_now = delta_requests as f64 / secs;
        self.metrics.record_rps_sample(rps_now);

        let Some(progress) = &self.progress else {
            return;
        };

        let error_rate_now = if delta_requests == 0 {
            0.0
        } else {
            delta_errors as f64 / delta_requests as f64
        };

        let metrics = LiveMetrics {
            rps_now,
            error_rate_now,
            iterations_per_sec_now: delta_iterations as f64 / secs,
            requests_total: stats.requests,
            errors_total: stats.errors,
            iterations_total: stats.iterations,
            checks_failed_total: stats.checks_failed(),
            bytes_received_total: stats.bytes_received,
            bytes_sent_total: stats.bytes_sent,
            latency_p50_ms_now: window.map(|w| w.p50_ms),
            latency_p95_ms_now: window.map(|w| w.p95_ms),
            in_flight: stats.in_flight,
        };

        (progress)(ProgressUpdate {
            tick,
            elapsed,
            scenario: self.config.name.clone(),
            state: self.scheduler.state(),
            metrics,
            progress: self.scenario_progress(&stats),
        });
    }

    fn scenario_progress(&self, stats: &RunningStats) -> ScenarioProgress {
        let duration = self.config.scenario.duration;
        match &self.config.scenario.executor {
            ScenarioExecutor::ClosedLoop { workers } => ScenarioProgress::ClosedLoop {
                workers: *workers,
                duration,
            },
            ScenarioExecutor::OpenLoop {
                rate,
                time_unit,
                max_workers,
                ..
            } => ScenarioProgress::OpenLoop {
                rate: *rate,
                time_unit: *time_unit,
                duration,
                active_workers: self.scheduler.active_workers(),
                busy_workers: self.scheduler.busy_workers(),
                max_workers: *max_workers,
                dropped_iterations_total: stats.dropped_iterations(),
            },
        }
    }

    fn check_live(&self, start: Instant) {
        if self.cancel.is_cancelled() {
            return;
        }

        let stats = self.metrics.snapshot(start.elapsed());
        if let Some(hit) = thresholds::first_abort(&stats, &self.config.thresholds) {
            log::warn!(
                "threshold `{}` failed during the run (observed {:?}); aborting",
                hit.threshold,
                hit.observed
            );
            self.cancel.cancel();
        }
    }
}

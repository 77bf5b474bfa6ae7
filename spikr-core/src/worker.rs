use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use spikr_http::{RequestIssuer, RequestOutcome};
use spikr_metrics::MetricsCollector;
use tokio_util::sync::CancellationToken;

use crate::workload::{IterationContext, Workload};

/// Everything a worker task needs, shared by all workers of a run.
pub(crate) struct WorkerShared<I> {
    pub(crate) issuer: Arc<I>,
    pub(crate) workload: Arc<dyn Workload>,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) base_url: Arc<str>,
    pub(crate) think_time: Duration,
    /// Applied to specs that carry no timeout of their own.
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) seed: Option<u64>,
    /// No new iterations once cancelled.
    pub(crate) stop: CancellationToken,
    /// Fired when the drain grace expires; in-flight requests become abandoned.
    pub(crate) abort: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IterationEnd {
    Completed,
    Aborted,
}

impl<I: RequestIssuer> WorkerShared<I> {
    pub(crate) fn context(&self, worker_id: u64) -> IterationContext {
        IterationContext::new(worker_id, self.base_url.clone(), self.seed)
    }

    /// Runs one iteration: build the specs, issue them in order, then think.
    pub(crate) async fn run_iteration(&self, ctx: &mut IterationContext) -> IterationEnd {
        let mut specs = self.workload.iteration(ctx);
        ctx.iteration += 1;
        if let Some(timeout) = self.request_timeout {
            for spec in &mut specs {
                spec.timeout.get_or_insert(timeout);
            }
        }

        for spec in &specs {
            if self.abort.is_cancelled() {
                return IterationEnd::Aborted;
            }

            let _in_flight = self.metrics.in_flight_guard();
            let started_at = SystemTime::now();
            let started = Instant::now();

            let outcome = tokio::select! {
                biased;
                outcome = self.issuer.issue(spec) => outcome,
                _ = self.abort.cancelled() => {
                    RequestOutcome::abandoned(spec, started_at, started.elapsed())
                }
            };

            self.metrics.record(&outcome);
            if outcome.status == spikr_http::OutcomeStatus::Abandoned {
                return IterationEnd::Aborted;
            }
        }

        self.metrics.record_iteration();

        if !self.think_time.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.think_time) => {}
                _ = self.stop.cancelled() => {}
            }
        }

        IterationEnd::Completed
    }

    /// Closed-loop worker: iterate back to back until stopped.
    pub(crate) async fn run_closed_loop(self: Arc<Self>, worker_id: u64) {
        let mut ctx = self.context(worker_id);
        while !self.stop.is_cancelled() {
            if self.run_iteration(&mut ctx).await == IterationEnd::Aborted {
                break;
            }
            // Iterations that never suspend must not starve the timer driver.
            tokio::task::yield_now().await;
        }
        log::trace!(
            "worker {worker_id} exiting after {} iteration(s)",
            ctx.iteration
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spikr_http::{OutcomeStatus, RequestSpec};
    use std::future::Future;

    struct Pending;

    impl RequestIssuer for Pending {
        fn issue(&self, _spec: &RequestSpec) -> impl Future<Output = RequestOutcome> + Send {
            std::future::pending()
        }
    }

    struct Instant200;

    impl RequestIssuer for Instant200 {
        async fn issue(&self, spec: &RequestSpec) -> RequestOutcome {
            RequestOutcome::new(spec, OutcomeStatus::Http(200), SystemTime::now(), Duration::ZERO)
        }
    }

    /// 200 only when the request carries a 5s timeout.
    struct RequiresTimeout;

    impl RequestIssuer for RequiresTimeout {
        async fn issue(&self, spec: &RequestSpec) -> RequestOutcome {
            let status = if spec.timeout == Some(Duration::from_secs(5)) { 200 } else { 500 };
            RequestOutcome::new(spec, OutcomeStatus::Http(status), SystemTime::now(), Duration::ZERO)
        }
    }

    fn shared<I: RequestIssuer>(issuer: I) -> Arc<WorkerShared<I>> {
        let workload = |ctx: &mut IterationContext| {
            vec![
                RequestSpec::get(ctx.url("/lb/enroll")),
                RequestSpec::get(ctx.url("/lb/queue/status")),
            ]
        };
        Arc::new(WorkerShared {
            issuer: Arc::new(issuer),
            workload: Arc::new(workload),
            metrics: Arc::new(MetricsCollector::default()),
            base_url: Arc::from("http://h"),
            think_time: Duration::ZERO,
            request_timeout: None,
            seed: Some(1),
            stop: CancellationToken::new(),
            abort: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn iteration_issues_every_spec_in_order() {
        let shared = shared(Instant200);
        let mut ctx = shared.context(1);

        assert_eq!(shared.run_iteration(&mut ctx).await, IterationEnd::Completed);

        let s = shared.metrics.snapshot(Duration::from_secs(1));
        assert_eq!(s.requests, 2);
        assert_eq!(s.iterations, 1);
        assert_eq!(ctx.iteration, 1);
    }

    #[tokio::test]
    async fn default_request_timeout_fills_unset_specs() {
        let mut shared = shared(RequiresTimeout);
        Arc::get_mut(&mut shared)
            .unwrap_or_else(|| panic!("unique"))
            .request_timeout = Some(Duration::from_secs(5));
        let mut ctx = shared.context(1);

        shared.run_iteration(&mut ctx).await;

        let s = shared.metrics.snapshot(Duration::from_secs(1));
        assert_eq!(s.requests, 2);
        assert_eq!(s.errors, 0);
    }

    #[tokio::test]
    async fn abort_turns_in_flight_request_into_abandoned() {
        let shared = shared(Pending);
        let abort = shared.abort.clone();
        let task = {
            let shared = shared.clone();
            tokio::spawn(async move {
                let mut ctx = shared.context(1);
                shared.run_iteration(&mut ctx).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(shared.metrics.in_flight(), 1);
        abort.cancel();

        let end = task.await.unwrap_or_else(|e| panic!("join: {e}"));
        assert_eq!(end, IterationEnd::Aborted);

        let s = shared.metrics.snapshot(Duration::from_secs(1));
        // The second spec is never issued.
        assert_eq!(s.requests, 1);
        assert_eq!(s.abandoned, 1);
        assert_eq!(s.errors, 1);
        assert_eq!(s.iterations, 0);
        assert_eq!(shared.metrics.in_flight(), 0);
    }
}

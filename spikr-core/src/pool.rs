use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use spikr_http::RequestIssuer;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::worker::{IterationEnd, WorkerShared};

/// Live pool size, readable from outside the dispatcher.
#[derive(Debug, Default)]
pub(crate) struct PoolGauge {
    workers: AtomicU64,
    busy: AtomicU64,
}

impl PoolGauge {
    pub(crate) fn workers(&self) -> u64 {
        self.workers.load(Ordering::Relaxed)
    }

    pub(crate) fn busy(&self) -> u64 {
        self.busy.load(Ordering::Relaxed)
    }

    pub(crate) fn set_workers(&self, n: u64) {
        self.workers.store(n, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct SlotState {
    busy: AtomicBool,
    /// Milliseconds since the pool epoch at which the worker last went idle.
    idle_since_ms: AtomicU64,
}

struct Slot {
    worker_id: u64,
    tx: mpsc::Sender<()>,
    state: Arc<SlotState>,
}

/// Elastic set of open-loop workers.
///
/// Owned by the dispatcher, which is the only place slots are added or retired. A worker
/// only flips its own slot back to idle.
pub(crate) struct WorkerPool<I> {
    shared: Arc<WorkerShared<I>>,
    slots: Vec<Slot>,
    tasks: JoinSet<()>,
    min_workers: u64,
    max_workers: u64,
    idle_reclaim: Duration,
    epoch: Instant,
    next_worker_id: u64,
    gauge: Arc<PoolGauge>,
}

impl<I: RequestIssuer> WorkerPool<I> {
    pub(crate) fn new(
        shared: Arc<WorkerShared<I>>,
        min_workers: u64,
        max_workers: u64,
        idle_reclaim: Duration,
        gauge: Arc<PoolGauge>,
    ) -> Self {
        let mut pool = Self {
            shared,
            slots: Vec::new(),
            tasks: JoinSet::new(),
            min_workers,
            max_workers,
            idle_reclaim,
            epoch: Instant::now(),
            next_worker_id: 1,
            gauge,
        };
        for _ in 0..min_workers {
            pool.grow();
        }
        pool
    }

    pub(crate) fn len(&self) -> u64 {
        self.slots.len() as u64
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn grow(&mut self) -> usize {
        let worker_id = self.next_worker_id;
        self.next_worker_id += 1;

        let (tx, rx) = mpsc::channel(1);
        let state = Arc::new(SlotState {
            busy: AtomicBool::new(false),
            idle_since_ms: AtomicU64::new(self.now_ms()),
        });

        self.tasks.spawn(run_slot(
            self.shared.clone(),
            worker_id,
            rx,
            state.clone(),
            self.gauge.clone(),
            self.epoch,
        ));
        self.slots.push(Slot {
            worker_id,
            tx,
            state,
        });
        self.gauge.set_workers(self.len());
        self.slots.len() - 1
    }

    /// Hands one iteration to an idle worker, growing the pool if needed.
    ///
    /// Returns `false` when the pool is at `max_workers` and every worker is busy.
    pub(crate) fn dispatch(&mut self) -> bool {
        let idle = self
            .slots
            .iter()
            .position(|s| !s.state.busy.load(Ordering::Acquire));

        let idx = match idle {
            Some(idx) => idx,
            None if self.len() < self.max_workers => {
                let idx = self.grow();
                log::debug!(
                    "worker pool grew to {} (max {})",
                    self.slots.len(),
                    self.max_workers
                );
                idx
            }
            None => return false,
        };

        let slot = &self.slots[idx];
        slot.state.busy.store(true, Ordering::Release);
        self.gauge.busy.fetch_add(1, Ordering::Relaxed);
        if slot.tx.try_send(()).is_err() {
            // The worker exited (only happens if its task panicked).
            slot.state.busy.store(false, Ordering::Release);
            self.gauge.busy.fetch_sub(1, Ordering::Relaxed);
            let worker_id = slot.worker_id;
            self.slots.remove(idx);
            self.gauge.set_workers(self.len());
            log::warn!("worker {worker_id} is gone; dropping it from the pool");
            return self.dispatch();
        }
        true
    }

    /// Retires workers above `min_workers` that have been idle for at least `idle_reclaim`.
    pub(crate) fn reclaim_idle(&mut self) {
        if self.len() <= self.min_workers {
            return;
        }

        let now = self.now_ms();
        let grace = u64::try_from(self.idle_reclaim.as_millis()).unwrap_or(u64::MAX);
        let mut excess = self.len() - self.min_workers;
        let before = self.slots.len();

        // Newest slots go first so long-lived workers keep their connections warm.
        let mut idx = self.slots.len();
        while idx > 0 && excess > 0 {
            idx -= 1;
            let state = &self.slots[idx].state;
            let idle = !state.busy.load(Ordering::Acquire)
                && now.saturating_sub(state.idle_since_ms.load(Ordering::Acquire)) >= grace;
            if idle {
                // Dropping the sender ends the worker's receive loop.
                self.slots.remove(idx);
                excess -= 1;
            }
        }

        let retired = before - self.slots.len();
        if retired > 0 {
            self.gauge.set_workers(self.len());
            log::debug!(
                "reclaimed {retired} idle worker(s); pool size {}",
                self.slots.len()
            );
        }

        while let Some(res) = self.tasks.try_join_next() {
            if let Err(err) = res {
                log::warn!("worker task failed: {err}");
            }
        }
    }

    /// Closes every slot and hands back the worker tasks for draining.
    pub(crate) fn shutdown(mut self) -> JoinSet<()> {
        self.slots.clear();
        self.tasks
    }
}

async fn run_slot<I: RequestIssuer>(
    shared: Arc<WorkerShared<I>>,
    worker_id: u64,
    mut rx: mpsc::Receiver<()>,
    state: Arc<SlotState>,
    gauge: Arc<PoolGauge>,
    epoch: Instant,
) {
    let mut ctx = shared.context(worker_id);

    while rx.recv().await.is_some() {
        // A dispatch counts as started even if the stop lands before the worker wakes.
        let end = shared.run_iteration(&mut ctx).await;

        let now_ms = u64::try_from(epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        state.idle_since_ms.store(now_ms, Ordering::Release);
        state.busy.store(false, Ordering::Release);
        gauge.busy.fetch_sub(1, Ordering::Relaxed);

        if end == IterationEnd::Aborted {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::IterationContext;
    use spikr_http::{OutcomeStatus, RequestOutcome, RequestSpec};
    use spikr_metrics::MetricsCollector;
    use std::time::SystemTime;
    use tokio_util::sync::CancellationToken;

    struct Sleepy(Duration);

    impl RequestIssuer for Sleepy {
        async fn issue(&self, spec: &RequestSpec) -> RequestOutcome {
            tokio::time::sleep(self.0).await;
            RequestOutcome::new(spec, OutcomeStatus::Http(200), SystemTime::now(), self.0)
        }
    }

    fn pool(latency: Duration, min: u64, max: u64, reclaim: Duration) -> WorkerPool<Sleepy> {
        let workload =
            |ctx: &mut IterationContext| vec![RequestSpec::get(ctx.url("/lb/courses"))];
        let shared = Arc::new(WorkerShared {
            issuer: Arc::new(Sleepy(latency)),
            workload: Arc::new(workload),
            metrics: Arc::new(MetricsCollector::default()),
            base_url: Arc::from("http://h"),
            think_time: Duration::ZERO,
            request_timeout: None,
            seed: None,
            stop: CancellationToken::new(),
            abort: CancellationToken::new(),
        });
        WorkerPool::new(shared, min, max, reclaim, Arc::new(PoolGauge::default()))
    }

    #[tokio::test]
    async fn starts_with_min_and_grows_to_max_then_refuses() {
        let mut p = pool(Duration::from_millis(200), 2, 4, Duration::from_secs(60));
        assert_eq!(p.len(), 2);

        for _ in 0..4 {
            assert!(p.dispatch());
        }
        assert_eq!(p.len(), 4);
        assert!(!p.dispatch(), "all four workers are busy");
        assert_eq!(p.gauge.busy(), 4);
    }

    #[tokio::test]
    async fn idle_worker_is_reused_instead_of_growing() {
        let mut p = pool(Duration::from_millis(1), 1, 4, Duration::from_secs(60));
        assert!(p.dispatch());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(p.dispatch());
        assert_eq!(p.len(), 1);
    }

    #[tokio::test]
    async fn reclaims_idle_workers_down_to_min() {
        let mut p = pool(Duration::from_millis(1), 1, 4, Duration::from_millis(10));
        for _ in 0..4 {
            assert!(p.dispatch());
        }
        assert_eq!(p.len(), 4);

        tokio::time::sleep(Duration::from_millis(100)).await;
        p.reclaim_idle();
        assert_eq!(p.len(), 1);
        assert_eq!(p.gauge.workers(), 1);
    }

    #[tokio::test]
    async fn busy_workers_are_not_reclaimed() {
        let mut p = pool(Duration::from_millis(300), 0, 2, Duration::ZERO);
        assert!(p.dispatch());
        assert!(p.dispatch());
        p.reclaim_idle();
        assert_eq!(p.len(), 2);

        let mut tasks = p.shutdown();
        while tasks.join_next().await.is_some() {}
    }
}

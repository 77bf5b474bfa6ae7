use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use spikr_http::{OutcomeStatus, RequestOutcome};

use crate::digest::{DEFAULT_EXACT_SAMPLE_LIMIT, LatencyDigest, percentile_ladder};
use crate::rps::RpsAgg;
use crate::{
    CheckSummary, EndpointSummary, LatencySummary, PercentileValue, RunningStats,
    StatusClassCounts,
};

/// Why an iteration was never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    /// The pool was at its maximum size and every worker was busy.
    CapacityExhausted,
    /// The tick was skipped while catching up after a stall.
    MissedSchedule,
}

#[derive(Debug, Default, Clone, Copy)]
struct CheckCounts {
    passed: u64,
    failed: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct EndpointCounts {
    requests: u64,
    errors: u64,
}

/// Latency percentiles since the previous [`MetricsCollector::take_latency_window`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyWindow {
    pub count: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug)]
struct Accumulator {
    requests: u64,
    errors: u64,
    transport_errors: u64,
    abandoned: u64,
    status: StatusClassCounts,
    bytes_sent: u64,
    bytes_received: u64,
    iterations: u64,
    dropped_capacity: u64,
    dropped_missed: u64,
    checks: HashMap<Arc<str>, CheckCounts>,
    endpoints: HashMap<Arc<str>, EndpointCounts>,
    latency: LatencyDigest,
    window: Histogram<u64>,
    rps: RpsAgg,
}

impl Accumulator {
    fn new(exact_sample_limit: usize) -> Self {
        Self {
            requests: 0,
            errors: 0,
            transport_errors: 0,
            abandoned: 0,
            status: StatusClassCounts::default(),
            bytes_sent: 0,
            bytes_received: 0,
            iterations: 0,
            dropped_capacity: 0,
            dropped_missed: 0,
            checks: HashMap::new(),
            endpoints: HashMap::new(),
            latency: LatencyDigest::new(exact_sample_limit),
            window: Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3)
                .unwrap_or_else(|err| panic!("failed to init histogram: {err}")),
            rps: RpsAgg::default(),
        }
    }

    fn latency_summary(&mut self) -> LatencySummary {
        let d = &mut self.latency;
        if d.is_empty() {
            return LatencySummary::default();
        }

        let ms = |us: u64| us as f64 / 1000.0;
        let percentiles = percentile_ladder()
            .filter_map(|pm| {
                let percentile = f64::from(pm) / 10.0;
                d.percentile_us(percentile).map(|us| PercentileValue {
                    percentile,
                    ms: ms(us),
                })
            })
            .collect();

        LatencySummary {
            count: d.count(),
            min_ms: d.min_us().map_or(0.0, ms),
            max_ms: d.max_us().map_or(0.0, ms),
            mean_ms: d.mean_us().unwrap_or(0.0) / 1000.0,
            stdev_ms: d.stdev_us().unwrap_or(0.0) / 1000.0,
            percentiles,
            exact: d.is_exact(),
        }
    }
}

/// Thread-safe aggregator for one run.
///
/// Every write goes through a single short critical section, so a [`RunningStats`] snapshot
/// never observes half of a recorded outcome.
#[derive(Debug)]
pub struct MetricsCollector {
    inner: Mutex<Accumulator>,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_EXACT_SAMPLE_LIMIT)
    }
}

impl MetricsCollector {
    pub fn new(exact_sample_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Accumulator::new(exact_sample_limit)),
            in_flight: AtomicU64::new(0),
            peak_in_flight: AtomicU64::new(0),
        }
    }

    pub fn record(&self, outcome: &RequestOutcome) {
        let us = u64::try_from(outcome.latency.as_micros()).unwrap_or(u64::MAX);
        let failed = outcome.is_error();

        let mut acc = self.inner.lock();
        acc.requests += 1;
        match outcome.status {
            OutcomeStatus::Http(status) => acc.status.record(status),
            OutcomeStatus::Transport(_) => acc.transport_errors += 1,
            OutcomeStatus::Abandoned => acc.abandoned += 1,
        }
        if failed {
            acc.errors += 1;
        }
        acc.bytes_sent = acc.bytes_sent.saturating_add(outcome.bytes_sent);
        acc.bytes_received = acc.bytes_received.saturating_add(outcome.bytes_received);

        acc.latency.record_us(us);
        acc.window.saturating_record(us);

        let endpoint = acc.endpoints.entry(outcome.name.clone()).or_default();
        endpoint.requests += 1;
        if failed {
            endpoint.errors += 1;
        }

        if let Some(check) = &outcome.check {
            let counts = acc.checks.entry(check.name.clone()).or_default();
            if check.passed {
                counts.passed += 1;
            } else {
                counts.failed += 1;
            }
        }
    }

    pub fn record_iteration(&self) {
        self.inner.lock().iterations += 1;
    }

    pub fn record_dropped_iterations(&self, n: u64, reason: DropReason) {
        if n == 0 {
            return;
        }
        let mut acc = self.inner.lock();
        match reason {
            DropReason::CapacityExhausted => acc.dropped_capacity += n,
            DropReason::MissedSchedule => acc.dropped_missed += n,
        }
    }

    pub fn record_rps_sample(&self, rps_now: f64) {
        self.inner.lock().rps.record(rps_now);
    }

    /// Marks one request as in flight until the guard drops.
    pub fn in_flight_guard(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        let mut peak = self.peak_in_flight.load(Ordering::Relaxed);
        while now > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                now,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(cur) => peak = cur,
            }
        }
        InFlightGuard { collector: self }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Percentiles recorded since the previous call; resets the window.
    pub fn take_latency_window(&self) -> Option<LatencyWindow> {
        let mut acc = self.inner.lock();
        let h = &mut acc.window;
        let out = if h.is_empty() {
            None
        } else {
            Some(LatencyWindow {
                count: h.len(),
                p50_ms: h.value_at_quantile(0.50) as f64 / 1000.0,
                p95_ms: h.value_at_quantile(0.95) as f64 / 1000.0,
            })
        };
        h.reset();
        out
    }

    pub fn snapshot(&self, elapsed: Duration) -> RunningStats {
        let mut acc = self.inner.lock();

        let mut checks: Vec<CheckSummary> = acc
            .checks
            .iter()
            .map(|(name, c)| CheckSummary {
                name: name.to_string(),
                passed: c.passed,
                failed: c.failed,
            })
            .collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));

        let mut endpoints: Vec<EndpointSummary> = acc
            .endpoints
            .iter()
            .map(|(name, e)| EndpointSummary {
                name: name.to_string(),
                requests: e.requests,
                errors: e.errors,
            })
            .collect();
        endpoints.sort_by(|a, b| a.name.cmp(&b.name));

        let latency = acc.latency_summary();
        let secs = elapsed.as_secs_f64();

        RunningStats {
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            requests: acc.requests,
            errors: acc.errors,
            transport_errors: acc.transport_errors,
            abandoned: acc.abandoned,
            status: acc.status,
            bytes_sent: acc.bytes_sent,
            bytes_received: acc.bytes_received,
            iterations: acc.iterations,
            dropped_capacity: acc.dropped_capacity,
            dropped_missed: acc.dropped_missed,
            checks,
            endpoints,
            latency,
            in_flight: self.in_flight(),
            peak_in_flight: self.peak_in_flight(),
            rps: if secs > 0.0 {
                acc.requests as f64 / secs
            } else {
                0.0
            },
            rps_samples: acc.rps.summary(),
        }
    }
}

pub struct InFlightGuard<'a> {
    collector: &'a MetricsCollector,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.collector.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

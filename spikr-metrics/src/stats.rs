use serde::Serialize;

use crate::RpsSummary;
use crate::digest::per_mille;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusClassCounts {
    #[serde(rename = "2xx")]
    pub s2xx: u64,
    #[serde(rename = "3xx")]
    pub s3xx: u64,
    #[serde(rename = "4xx")]
    pub s4xx: u64,
    #[serde(rename = "5xx")]
    pub s5xx: u64,
    pub other: u64,
}

impl StatusClassCounts {
    pub(crate) fn record(&mut self, status: u16) {
        let slot = match status {
            200..=299 => &mut self.s2xx,
            300..=399 => &mut self.s3xx,
            400..=499 => &mut self.s4xx,
            500..=599 => &mut self.s5xx,
            _ => &mut self.other,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }
}

/// Requests grouped by request name (URL path unless named explicitly).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSummary {
    pub name: String,
    pub requests: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileValue {
    /// e.g. `95.0`, `99.9`.
    pub percentile: f64,
    pub ms: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub stdev_ms: f64,
    /// One entry per ladder point; empty when `count == 0`.
    pub percentiles: Vec<PercentileValue>,
    /// `true` while percentiles come from raw samples rather than the histogram.
    pub exact: bool,
}

impl LatencySummary {
    /// Latency at a ladder percentile, in milliseconds.
    pub fn percentile(&self, percentile: f64) -> Option<f64> {
        let wanted = per_mille(percentile)?;
        self.percentiles
            .iter()
            .find(|p| per_mille(p.percentile) == Some(wanted))
            .map(|p| p.ms)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Point-in-time view of a run, produced by [`crate::MetricsCollector::snapshot`].
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunningStats {
    pub elapsed_ms: u64,
    pub requests: u64,
    /// Non-2xx responses, transport errors and abandoned requests.
    pub errors: u64,
    pub transport_errors: u64,
    pub abandoned: u64,
    pub status: StatusClassCounts,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub iterations: u64,
    pub dropped_capacity: u64,
    pub dropped_missed: u64,
    pub checks: Vec<CheckSummary>,
    pub endpoints: Vec<EndpointSummary>,
    pub latency: LatencySummary,
    pub in_flight: u64,
    pub peak_in_flight: u64,
    /// Requests per second over the whole elapsed time.
    pub rps: f64,
    pub rps_samples: RpsSummary,
}

impl RunningStats {
    /// `errors / requests`; `None` before the first request.
    pub fn error_rate(&self) -> Option<f64> {
        (self.requests > 0).then(|| self.errors as f64 / self.requests as f64)
    }

    pub fn checks_total(&self) -> u64 {
        self.checks.iter().map(CheckSummary::total).sum()
    }

    pub fn checks_failed(&self) -> u64 {
        self.checks.iter().map(|c| c.failed).sum()
    }

    /// Passed checks over all evaluated checks; `None` when no check ran.
    pub fn checks_pass_rate(&self) -> Option<f64> {
        let total = self.checks_total();
        (total > 0).then(|| (total - self.checks_failed()) as f64 / total as f64)
    }

    pub fn dropped_iterations(&self) -> u64 {
        self.dropped_capacity + self.dropped_missed
    }

    pub fn percentile(&self, percentile: f64) -> Option<f64> {
        self.latency.percentile(percentile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        let mut c = StatusClassCounts::default();
        for s in [200, 201, 302, 404, 500, 503, 101] {
            c.record(s);
        }
        assert_eq!(
            c,
            StatusClassCounts {
                s2xx: 2,
                s3xx: 1,
                s4xx: 1,
                s5xx: 2,
                other: 1,
            }
        );
    }

    #[test]
    fn rates_are_none_without_observations() {
        let stats = RunningStats::default();
        assert_eq!(stats.error_rate(), None);
        assert_eq!(stats.checks_pass_rate(), None);
        assert_eq!(stats.percentile(95.0), None);
    }

    #[test]
    fn error_rate_and_check_rate() {
        let stats = RunningStats {
            requests: 200,
            errors: 20,
            checks: vec![
                CheckSummary {
                    name: "a".into(),
                    passed: 90,
                    failed: 10,
                },
                CheckSummary {
                    name: "b".into(),
                    passed: 100,
                    failed: 0,
                },
            ],
            ..RunningStats::default()
        };
        assert_eq!(stats.error_rate(), Some(0.1));
        assert_eq!(stats.checks_pass_rate(), Some(0.95));
    }

    #[test]
    fn percentile_lookup_matches_ladder_points() {
        let latency = LatencySummary {
            count: 1,
            percentiles: vec![
                PercentileValue {
                    percentile: 95.0,
                    ms: 12.0,
                },
                PercentileValue {
                    percentile: 99.9,
                    ms: 40.0,
                },
            ],
            ..LatencySummary::default()
        };
        assert_eq!(latency.percentile(95.0), Some(12.0));
        assert_eq!(latency.percentile(99.9), Some(40.0));
        assert_eq!(latency.percentile(99.5), None);
    }
}

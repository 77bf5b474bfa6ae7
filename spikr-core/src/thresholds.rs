use std::fmt;

use serde::Serialize;
use spikr_metrics::{RunningStats, is_supported_percentile};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum ThresholdOp {
    #[strum(to_string = "<")]
    #[serde(rename = "<")]
    Lt,
    #[strum(to_string = "<=")]
    #[serde(rename = "<=")]
    Lte,
    #[strum(to_string = ">")]
    #[serde(rename = ">")]
    Gt,
    #[strum(to_string = ">=")]
    #[serde(rename = ">=")]
    Gte,
    #[strum(to_string = "==")]
    #[serde(rename = "==")]
    Eq,
}

impl ThresholdOp {
    pub fn compare(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Eq => left == right,
        }
    }
}

/// What a threshold looks at. Durations are in milliseconds, rates in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdMetric {
    /// Failed requests over all requests.
    ErrorRate,
    /// Passed checks over all evaluated checks.
    ChecksRate,
    LatencyPercentile(f64),
    LatencyAvg,
    LatencyMin,
    LatencyMax,
    Requests,
    Iterations,
    DroppedIterations,
    AbandonedRequests,
    /// Requests per second over the run.
    Rps,
}

impl ThresholdMetric {
    pub fn is_rate(self) -> bool {
        matches!(self, Self::ErrorRate | Self::ChecksRate)
    }

    /// `None` when the run has nothing to measure yet (no requests, no checks).
    pub fn observe(self, stats: &RunningStats) -> Option<f64> {
        let latency = &stats.latency;
        let has_latency = !latency.is_empty();
        match self {
            Self::ErrorRate => stats.error_rate(),
            Self::ChecksRate => stats.checks_pass_rate(),
            Self::LatencyPercentile(p) => stats.percentile(p),
            Self::LatencyAvg => has_latency.then_some(latency.mean_ms),
            Self::LatencyMin => has_latency.then_some(latency.min_ms),
            Self::LatencyMax => has_latency.then_some(latency.max_ms),
            Self::Requests => Some(stats.requests as f64),
            Self::Iterations => Some(stats.iterations as f64),
            Self::DroppedIterations => Some(stats.dropped_iterations() as f64),
            Self::AbandonedRequests => Some(stats.abandoned as f64),
            Self::Rps => (stats.elapsed_ms > 0).then_some(stats.rps),
        }
    }

    fn parse_native(name: &str) -> Option<Self> {
        let metric = match name {
            "error_rate" => Self::ErrorRate,
            "checks" => Self::ChecksRate,
            "latency_avg" => Self::LatencyAvg,
            "latency_min" => Self::LatencyMin,
            "latency_max" => Self::LatencyMax,
            "requests" => Self::Requests,
            "iterations" => Self::Iterations,
            "dropped_iterations" => Self::DroppedIterations,
            "abandoned_requests" => Self::AbandonedRequests,
            "rps" => Self::Rps,
            _ => {
                let p = name.strip_prefix("latency_p")?.parse().ok()?;
                Self::LatencyPercentile(p)
            }
        };
        Some(metric)
    }

    /// `metric:aggregation` as written in k6 threshold blocks.
    fn parse_k6(metric: &str, agg: &str) -> std::result::Result<Self, String> {
        let agg = agg.to_ascii_lowercase();
        let parsed = match (metric, agg.as_str()) {
            ("http_req_failed", "rate") => Self::ErrorRate,
            ("checks", "rate") => Self::ChecksRate,
            ("http_req_duration", "avg") => Self::LatencyAvg,
            ("http_req_duration", "min") => Self::LatencyMin,
            ("http_req_duration", "max") => Self::LatencyMax,
            ("http_req_duration", "med") => Self::LatencyPercentile(50.0),
            ("http_req_duration" | "http_reqs", "count") => Self::Requests,
            ("http_reqs", "rate") => Self::Rps,
            ("iterations", "count") => Self::Iterations,
            ("dropped_iterations", "count") => Self::DroppedIterations,
            ("http_req_duration", p) => {
                let inner = p
                    .strip_prefix("p(")
                    .and_then(|v| v.strip_suffix(')'))
                    .ok_or_else(|| format!("unknown aggregation `{p}` for `{metric}`"))?;
                let p: f64 = inner
                    .parse()
                    .map_err(|_| format!("invalid percentile `{inner}`"))?;
                Self::LatencyPercentile(p)
            }
            (
                "http_req_failed" | "checks" | "http_reqs" | "iterations" | "dropped_iterations",
                _,
            ) => return Err(format!("unknown aggregation `{agg}` for `{metric}`")),
            _ => return Err(format!("unknown metric `{metric}`")),
        };
        Ok(parsed)
    }
}

impl fmt::Display for ThresholdMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ErrorRate => "error_rate",
            Self::ChecksRate => "checks",
            Self::LatencyPercentile(p) => return write!(f, "latency_p{p}"),
            Self::LatencyAvg => "latency_avg",
            Self::LatencyMin => "latency_min",
            Self::LatencyMax => "latency_max",
            Self::Requests => "requests",
            Self::Iterations => "iterations",
            Self::DroppedIterations => "dropped_iterations",
            Self::AbandonedRequests => "abandoned_requests",
            Self::Rps => "rps",
        };
        f.write_str(name)
    }
}

/// One pass/fail condition, e.g. `error_rate<0.01` or `http_req_duration: p(95)<300`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub metric: ThresholdMetric,
    pub op: ThresholdOp,
    pub bound: f64,
    /// Cancel the run as soon as a live evaluation sees this threshold fail.
    pub abort_on_fail: bool,
}

impl ThresholdSpec {
    pub fn new(metric: ThresholdMetric, op: ThresholdOp, bound: f64) -> Result<Self> {
        let spec = Self {
            metric,
            op,
            bound,
            abort_on_fail: false,
        };
        spec.validate()
            .map_err(|reason| Error::threshold(spec.expression(), reason))?;
        Ok(spec)
    }

    #[must_use]
    pub fn with_abort_on_fail(mut self) -> Self {
        self.abort_on_fail = true;
        self
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !self.bound.is_finite() {
            return Err("bound must be a finite number".to_string());
        }
        if self.metric.is_rate() && !(0.0..=1.0).contains(&self.bound) {
            return Err(format!("rate bound {} is outside 0..=1", self.bound));
        }
        if let ThresholdMetric::LatencyPercentile(p) = self.metric {
            if !is_supported_percentile(p) {
                return Err(format!(
                    "unsupported percentile {p} (use 1..=99 in steps of 1, 99.9 or 100)"
                ));
            }
        }
        Ok(())
    }

    /// Parses `metric<op>bound[;abort]`. Whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if s.is_empty() {
            return Err(Error::threshold(raw, "empty threshold"));
        }

        let (body, abort_on_fail) = match s.split_once(';') {
            None => (s.as_str(), false),
            Some((body, flag)) if is_abort_flag(flag) => (body, true),
            Some((_, flag)) => {
                return Err(Error::threshold(raw, format!("unknown option `{flag}`")));
            }
        };

        let ops = [
            ("<=", ThresholdOp::Lte),
            (">=", ThresholdOp::Gte),
            ("==", ThresholdOp::Eq),
            ("<", ThresholdOp::Lt),
            (">", ThresholdOp::Gt),
        ];
        let (op_pos, op_len, op) = ops
            .iter()
            .find_map(|(tok, op)| body.find(tok).map(|pos| (pos, tok.len(), *op)))
            .ok_or_else(|| Error::threshold(raw, "missing operator"))?;

        let (left, right_with_op) = body.split_at(op_pos);
        let right = &right_with_op[op_len..];
        if left.is_empty() || right.is_empty() {
            return Err(Error::threshold(raw, "expected `metric<op>value`"));
        }

        let metric = match left.split_once(':') {
            Some((metric, agg)) => {
                ThresholdMetric::parse_k6(metric, agg).map_err(|r| Error::threshold(raw, r))?
            }
            None => ThresholdMetric::parse_native(left)
                .ok_or_else(|| Error::threshold(raw, format!("unknown metric `{left}`")))?,
        };

        let bound: f64 = right
            .parse()
            .map_err(|_| Error::threshold(raw, format!("invalid numeric value `{right}`")))?;

        let spec = Self {
            metric,
            op,
            bound,
            abort_on_fail,
        };
        spec.validate().map_err(|r| Error::threshold(raw, r))?;
        Ok(spec)
    }

    /// Canonical text form, e.g. `latency_p95<300`.
    pub fn expression(&self) -> String {
        format!("{}{}{}", self.metric, self.op, self.bound)
    }

    pub fn check(&self, stats: &RunningStats) -> ThresholdResult {
        let observed = self.metric.observe(stats);
        let passed = observed.is_some_and(|v| self.op.compare(v, self.bound));
        ThresholdResult {
            threshold: self.expression(),
            metric: self.metric.to_string(),
            op: self.op,
            expected: self.bound,
            observed,
            passed,
            abort_on_fail: self.abort_on_fail,
        }
    }
}

fn is_abort_flag(flag: &str) -> bool {
    ["abort", "abort_on_fail", "abortonfail"]
        .iter()
        .any(|f| flag.eq_ignore_ascii_case(f))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub threshold: String,
    pub metric: String,
    pub op: ThresholdOp,
    pub expected: f64,
    /// `None` when the metric had no observation; the threshold then fails.
    pub observed: Option<f64>,
    pub passed: bool,
    pub abort_on_fail: bool,
}

/// Terminal artifact of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunVerdict {
    pub passed: bool,
    /// The run ended early, by external cancellation or an `abort_on_fail` threshold.
    pub cancelled: bool,
    pub results: Vec<ThresholdResult>,
    pub violations: Vec<ThresholdResult>,
    pub stats: RunningStats,
}

/// Judges `stats` against every threshold. Pure: same inputs, same verdict.
pub fn evaluate(stats: &RunningStats, thresholds: &[ThresholdSpec]) -> RunVerdict {
    let results: Vec<ThresholdResult> = thresholds.iter().map(|t| t.check(stats)).collect();
    let violations: Vec<ThresholdResult> = results.iter().filter(|r| !r.passed).cloned().collect();

    RunVerdict {
        passed: violations.is_empty(),
        cancelled: false,
        results,
        violations,
        stats: stats.clone(),
    }
}

/// First `abort_on_fail` threshold that fails on an actual observation.
///
/// Missing observations never abort: early in a run there is simply nothing to measure yet.
pub fn first_abort(stats: &RunningStats, thresholds: &[ThresholdSpec]) -> Option<ThresholdResult> {
    thresholds
        .iter()
        .filter(|t| t.abort_on_fail)
        .map(|t| t.check(stats))
        .find(|r| !r.passed && r.observed.is_some())
}

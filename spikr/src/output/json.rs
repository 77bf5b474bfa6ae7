use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use spikr_core::{ProgressUpdate, RunConfig, RunVerdict, ScenarioProgress, SchedulerState};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config: &RunConfig) {}

    fn progress(&self) -> Option<spikr_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, verdict: &RunVerdict) -> anyhow::Result<()> {
        let line = build_summary_line(verdict);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine<'a> {
    pub kind: &'static str,
    pub tick: u64,
    pub scenario: &'a str,
    pub state: SchedulerState,
    pub elapsed_secs: f64,

    pub requests_per_sec: f64,
    pub iterations_per_sec: f64,
    pub error_rate: f64,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,

    pub total_requests: u64,
    pub total_errors: u64,
    pub total_iterations: u64,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
    pub checks_failed_total: u64,
    pub in_flight: u64,

    pub active_workers: u64,
    pub busy_workers: u64,
    pub max_workers: u64,
    pub dropped_iterations_total: u64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine<'_> {
    let m = &u.metrics;
    let (active_workers, busy_workers, max_workers, dropped_iterations_total) = match &u.progress
    {
        ScenarioProgress::ClosedLoop { workers, .. } => (*workers, m.in_flight, *workers, 0),
        ScenarioProgress::OpenLoop {
            active_workers,
            busy_workers,
            max_workers,
            dropped_iterations_total,
            ..
        } => (
            *active_workers,
            *busy_workers,
            *max_workers,
            *dropped_iterations_total,
        ),
    };

    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        scenario: &u.scenario,
        state: u.state,
        elapsed_secs: u.elapsed.as_secs_f64(),

        requests_per_sec: m.rps_now,
        iterations_per_sec: m.iterations_per_sec_now,
        error_rate: m.error_rate_now,
        latency_p50_ms: m.latency_p50_ms_now,
        latency_p95_ms: m.latency_p95_ms_now,

        total_requests: m.requests_total,
        total_errors: m.errors_total,
        total_iterations: m.iterations_total,
        total_bytes_received: m.bytes_received_total,
        total_bytes_sent: m.bytes_sent_total,
        checks_failed_total: m.checks_failed_total,
        in_flight: m.in_flight,

        active_workers,
        busy_workers,
        max_workers,
        dropped_iterations_total,
    }
}

/// The verdict as-is, tagged so consumers can tell it from progress lines.
#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    #[serde(flatten)]
    pub verdict: &'a RunVerdict,
}

fn build_summary_line(verdict: &RunVerdict) -> JsonSummaryLine<'_> {
    JsonSummaryLine {
        kind: "summary",
        verdict,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use spikr_core::{LiveMetrics, ThresholdSpec, evaluate};
    use spikr_metrics::RunningStats;
    use std::time::Duration;

    fn to_value<T: Serialize>(v: &T) -> Value {
        match serde_json::to_value(v) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        }
    }

    #[test]
    fn progress_line_has_kind_and_pool() {
        let u = ProgressUpdate {
            tick: 2,
            elapsed: Duration::from_secs(2),
            scenario: "spike".to_string(),
            state: SchedulerState::Running,
            metrics: LiveMetrics {
                rps_now: 200.0,
                requests_total: 400,
                ..LiveMetrics::default()
            },
            progress: ScenarioProgress::OpenLoop {
                rate: 200.0,
                time_unit: Duration::from_secs(1),
                duration: Duration::from_secs(60),
                active_workers: 100,
                busy_workers: 3,
                max_workers: 500,
                dropped_iterations_total: 1,
            },
        };

        let v = to_value(&build_progress_line(&u));
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("progress"));
        assert_eq!(v.get("state").and_then(Value::as_str), Some("running"));
        assert_eq!(v.get("total_requests").and_then(Value::as_u64), Some(400));
        assert_eq!(v.get("max_workers").and_then(Value::as_u64), Some(500));
        assert_eq!(v.get("latency_p95_ms"), Some(&Value::Null));
    }

    #[test]
    fn summary_line_flattens_the_verdict() {
        let stats = RunningStats {
            requests: 10,
            errors: 2,
            ..RunningStats::default()
        };
        let thresholds = [ThresholdSpec::parse("http_req_failed: rate<0.01")
            .unwrap_or_else(|e| panic!("{e}"))];
        let verdict = evaluate(&stats, &thresholds);

        let v = to_value(&build_summary_line(&verdict));
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.get("passed").and_then(Value::as_bool), Some(false));
        assert_eq!(v.pointer("/stats/requests").and_then(Value::as_u64), Some(10));
        assert_eq!(
            v.pointer("/violations/0/threshold").and_then(Value::as_str),
            Some("error_rate<0.01")
        );
        assert_eq!(
            v.pointer("/violations/0/op").and_then(Value::as_str),
            Some("<")
        );
    }
}

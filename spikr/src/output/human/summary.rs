use std::fmt::Write as _;

use spikr_core::{RunVerdict, ThresholdResult};

use super::format::*;

const SUMMARY_PERCENTILES: [f64; 4] = [50.0, 90.0, 95.0, 99.0];

pub(crate) fn render(scenario: &str, verdict: &RunVerdict) -> String {
    let s = &verdict.stats;
    let mut out = String::new();

    let outcome = match (verdict.passed, verdict.cancelled) {
        (true, false) => "passed",
        (true, true) => "passed (stopped early)",
        (false, false) => "FAILED",
        (false, true) => "FAILED (stopped early)",
    };
    writeln!(&mut out, "summary: {scenario} {outcome}").ok();

    writeln!(
        &mut out,
        "  requests: {} (failed {}, transport {}, abandoned {})",
        s.requests, s.errors, s.transport_errors, s.abandoned
    )
    .ok();
    writeln!(
        &mut out,
        "  status: 2xx={} 3xx={} 4xx={} 5xx={} other={}",
        s.status.s2xx, s.status.s3xx, s.status.s4xx, s.status.s5xx, s.status.other
    )
    .ok();
    writeln!(
        &mut out,
        "  error_rate: {}",
        s.error_rate().map_or_else(|| "-".to_string(), format_percent)
    )
    .ok();

    let dropped = s.dropped_iterations();
    if dropped > 0 {
        writeln!(
            &mut out,
            "  iterations: {} (dropped {dropped}: capacity {}, missed {})",
            s.iterations, s.dropped_capacity, s.dropped_missed
        )
        .ok();
    } else {
        writeln!(&mut out, "  iterations: {}", s.iterations).ok();
    }

    writeln!(
        &mut out,
        "  bytes: recv {} sent {}",
        format_bytes(s.bytes_received),
        format_bytes(s.bytes_sent)
    )
    .ok();

    if s.rps_samples.samples > 0 {
        writeln!(
            &mut out,
            "  rates: rps={} per-second avg={} stdev={} max={}",
            format_rate(s.rps),
            format_rate(s.rps_samples.avg),
            format_rate(s.rps_samples.stdev),
            format_rate(s.rps_samples.max)
        )
        .ok();
    } else {
        writeln!(&mut out, "  rates: rps={}", format_rate(s.rps)).ok();
    }

    if s.latency.is_empty() {
        out.push_str("  latency: n/a\n");
    } else {
        let percentiles = SUMMARY_PERCENTILES
            .iter()
            .map(|p| format!("p{p}={}", format_ms_opt(s.latency.percentile(*p))))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            &mut out,
            "  latency: {percentiles} min={} mean={} max={} (n={}{})",
            format_ms(s.latency.min_ms),
            format_ms(s.latency.mean_ms),
            format_ms(s.latency.max_ms),
            s.latency.count,
            if s.latency.exact { ", exact" } else { "" }
        )
        .ok();
    }

    writeln!(&mut out, "  peak_in_flight: {}", s.peak_in_flight).ok();

    if !s.checks.is_empty() {
        out.push_str("  checks:\n");
        for c in &s.checks {
            writeln!(&mut out, "    {}: {}/{} passed", c.name, c.passed, c.total()).ok();
        }
    }

    if !s.endpoints.is_empty() {
        out.push_str("  endpoints:\n");
        for e in &s.endpoints {
            writeln!(
                &mut out,
                "    {}: {} (failed {})",
                e.name, e.requests, e.errors
            )
            .ok();
        }
    }

    if !verdict.results.is_empty() {
        out.push_str("thresholds\n");
        for r in &verdict.results {
            writeln!(
                &mut out,
                "  {} {}: observed {}",
                if r.passed { "ok  " } else { "FAIL" },
                r.threshold,
                observed(r)
            )
            .ok();
        }
    }

    out
}

pub(crate) fn observed(r: &ThresholdResult) -> String {
    r.observed
        .map_or_else(|| "-".to_string(), |o| format!("{o:.4}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spikr_core::{ThresholdSpec, evaluate};
    use spikr_metrics::{CheckSummary, EndpointSummary, RunningStats};

    fn stats() -> RunningStats {
        RunningStats {
            elapsed_ms: 2_000,
            requests: 100,
            errors: 10,
            iterations: 100,
            dropped_capacity: 3,
            rps: 50.0,
            checks: vec![CheckSummary {
                name: "enroll queued 200".to_string(),
                passed: 90,
                failed: 10,
            }],
            endpoints: vec![EndpointSummary {
                name: "/lb/enroll".to_string(),
                requests: 100,
                errors: 10,
            }],
            ..RunningStats::default()
        }
    }

    fn spec(raw: &str) -> ThresholdSpec {
        ThresholdSpec::parse(raw).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn failed_run_lists_every_threshold() {
        let verdict = evaluate(
            &stats(),
            &[spec("error_rate<0.01"), spec("requests>=100")],
        );
        let out = render("spike", &verdict);

        assert!(out.starts_with("summary: spike FAILED\n"), "{out}");
        assert!(out.contains("error_rate: 10.00%"));
        assert!(out.contains("iterations: 100 (dropped 3: capacity 3, missed 0)"));
        assert!(out.contains("enroll queued 200: 90/100 passed"));
        assert!(out.contains("/lb/enroll: 100 (failed 10)"));
        assert!(out.contains("latency: n/a"));
        assert!(out.contains("FAIL error_rate<0.01: observed 0.1000"));
        assert!(out.contains("ok   requests>=100: observed 100.0000"));
    }

    #[test]
    fn run_without_thresholds_has_no_threshold_section() {
        let verdict = evaluate(&stats(), &[]);
        let out = render("baseline", &verdict);
        assert!(out.starts_with("summary: baseline passed\n"));
        assert!(!out.contains("thresholds"));
    }
}

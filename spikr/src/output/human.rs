use std::sync::{Arc, OnceLock};

mod format;
mod progress;
mod summary;

use format::{format_bytes, format_duration, format_ms_opt, format_percent, format_rate};
use progress::HumanProgress;
use spikr_core::{ProgressUpdate, RunConfig, RunVerdict, ScenarioExecutor, ScenarioProgress};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
    scenario: OnceLock<String>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
            scenario: OnceLock::new(),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config: &RunConfig) {
        let _ = self.scenario.set(config.name.clone());

        let s = &config.scenario;
        println!("target: {}", config.base_url);
        match &s.executor {
            ScenarioExecutor::ClosedLoop { workers } => println!(
                "scenario: {} exec={} vus={workers} duration={} think={}",
                config.name,
                s.model(),
                format_duration(s.duration),
                format_duration(s.think_time)
            ),
            ScenarioExecutor::OpenLoop {
                rate,
                time_unit,
                min_workers,
                max_workers,
                ..
            } => println!(
                "scenario: {} exec={} rate={rate}/{} vus={min_workers}..{max_workers} duration={} think={}",
                config.name,
                s.model(),
                format_duration(*time_unit),
                format_duration(s.duration),
                format_duration(s.think_time)
            ),
        }
        if !config.thresholds.is_empty() {
            let exprs = config
                .thresholds
                .iter()
                .map(|t| t.expression())
                .collect::<Vec<_>>()
                .join(" ");
            println!("thresholds: {exprs}");
        }
        println!();
    }

    fn progress(&self) -> Option<spikr_core::ProgressFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |u| {
            let total = u.progress.duration();
            progress.update(&u.scenario, total, u.elapsed, progress_message(&u));
        }))
    }

    fn print_summary(&self, verdict: &RunVerdict) -> anyhow::Result<()> {
        self.progress.finish();

        let scenario = self.scenario.get().map_or("run", String::as_str);
        print!("{}", summary::render(scenario, verdict));

        if !verdict.violations.is_empty() {
            eprintln!("thresholds failed:");
            for v in &verdict.violations {
                eprintln!("  {} (observed {})", v.threshold, summary::observed(v));
            }
        }

        Ok(())
    }
}

fn progress_message(u: &ProgressUpdate) -> String {
    let m = &u.metrics;
    let rates = format!(
        " rps={} iters/s={} err={} p95={} in_flight={} recv={}",
        format_rate(m.rps_now),
        format_rate(m.iterations_per_sec_now),
        format_percent(m.error_rate_now),
        format_ms_opt(m.latency_p95_ms_now),
        m.in_flight,
        format_bytes(m.bytes_received_total)
    );

    match &u.progress {
        ScenarioProgress::ClosedLoop { workers, .. } => {
            format!("vus={workers} elapsed={}{rates}", format_duration(u.elapsed))
        }
        ScenarioProgress::OpenLoop {
            active_workers,
            busy_workers,
            max_workers,
            dropped_iterations_total,
            ..
        } => format!(
            "vus={busy_workers}/{active_workers}/{max_workers} dropped={dropped_iterations_total} elapsed={}{rates}",
            format_duration(u.elapsed)
        ),
    }
}

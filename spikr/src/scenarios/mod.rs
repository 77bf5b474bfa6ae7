//! Built-in scenarios: the traffic shapes the enrollment service is load-tested with.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use spikr_core::{ExecutionModel, RunConfig, ScenarioConfig, ThresholdSpec, Workload};

use crate::cli::RunArgs;

mod baseline;
mod spike;

pub(crate) const PATH_COURSES: &str = "/lb/courses";
pub(crate) const PATH_ENROLL: &str = "/lb/enroll";
pub(crate) const PATH_QUEUE_STATUS: &str = "/lb/queue/status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioName {
    /// Closed-loop GET /lb/courses load.
    Baseline,
    /// Open-loop POST /lb/enroll at a fixed arrival rate.
    Spike,
}

impl ScenarioName {
    pub(crate) const ALL: [Self; 2] = [Self::Baseline, Self::Spike];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Spike => "spike",
        }
    }

    pub(crate) fn defaults(self) -> &'static ScenarioDefaults {
        match self {
            Self::Baseline => &baseline::DEFAULTS,
            Self::Spike => &spike::DEFAULTS,
        }
    }
}

/// Values a scenario runs with when no flag or env var overrides them.
#[derive(Debug)]
pub(crate) struct ScenarioDefaults {
    pub(crate) description: &'static str,
    pub(crate) model: ExecutionModel,
    pub(crate) vus: u64,
    pub(crate) duration: Duration,
    pub(crate) rate: f64,
    pub(crate) time_unit: Duration,
    pub(crate) max_vus: u64,
    pub(crate) think_time: Duration,
    pub(crate) thresholds: &'static [&'static str],
}

/// Per-scenario knobs that reach the workload itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkloadParams {
    pub(crate) course_id: u64,
}

pub(crate) struct ResolvedScenario {
    pub(crate) config: RunConfig,
    pub(crate) workload: Arc<dyn Workload>,
}

/// Merges flags (and their env fallbacks) over the scenario defaults.
///
/// Only threshold syntax is checked here; the rest is validated when the run is built.
pub(crate) fn resolve(args: &RunArgs) -> anyhow::Result<ResolvedScenario> {
    let name = args.scenario;
    let d = name.defaults();

    let model = args.executor.unwrap_or(d.model);
    let vus = args.vus.unwrap_or(d.vus);
    let duration = args.duration.unwrap_or(d.duration);

    let mut scenario = match model {
        ExecutionModel::ClosedLoop => ScenarioConfig::closed_loop(vus, duration),
        ExecutionModel::OpenLoop => {
            let max_vus = args.max_vus.unwrap_or(d.max_vus.max(vus));
            ScenarioConfig::open_loop(
                args.rate.unwrap_or(d.rate),
                args.time_unit.unwrap_or(d.time_unit),
                vus,
                max_vus,
                duration,
            )
        }
    }
    .with_think_time(args.think_time.unwrap_or(d.think_time));

    if let Some(grace) = args.graceful_stop {
        scenario = scenario.with_graceful_stop(grace);
    }

    let mut config = RunConfig::new(name.as_str(), args.base_url.clone(), scenario)
        .with_thresholds(thresholds(args, d)?);
    if let Some(timeout) = args.request_timeout {
        config = config.with_request_timeout(timeout);
    }
    if let Some(every) = args.live_thresholds {
        config = config.with_live_thresholds(every);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let params = WorkloadParams {
        course_id: args.course_id.unwrap_or(1),
    };
    let workload = match name {
        ScenarioName::Baseline => baseline::workload(),
        ScenarioName::Spike => spike::workload(params),
    };

    Ok(ResolvedScenario { config, workload })
}

/// One block per built-in scenario, for `spikr scenarios`.
pub(crate) fn render_list() -> String {
    let mut out = String::new();
    for name in ScenarioName::ALL {
        let d = name.defaults();
        writeln!(&mut out, "{}: {}", name.as_str(), d.description).ok();
        match d.model {
            ExecutionModel::ClosedLoop => writeln!(
                &mut out,
                "  exec={} vus={} duration={}",
                d.model,
                d.vus,
                humantime::format_duration(d.duration)
            ),
            ExecutionModel::OpenLoop => writeln!(
                &mut out,
                "  exec={} rate={}/{} vus={}..{} duration={}",
                d.model,
                d.rate,
                humantime::format_duration(d.time_unit),
                d.vus,
                d.max_vus,
                humantime::format_duration(d.duration)
            ),
        }
        .ok();
        writeln!(
            &mut out,
            "  think={} thresholds: {}",
            humantime::format_duration(d.think_time),
            d.thresholds.join(", ")
        )
        .ok();
    }
    out
}

fn thresholds(args: &RunArgs, d: &ScenarioDefaults) -> anyhow::Result<Vec<ThresholdSpec>> {
    if args.no_thresholds {
        return Ok(Vec::new());
    }

    if args.thresholds.is_empty() {
        d.thresholds
            .iter()
            .map(|raw| ThresholdSpec::parse(raw).context("invalid built-in threshold"))
            .collect()
    } else {
        args.thresholds
            .iter()
            .map(|raw| ThresholdSpec::parse(raw).map_err(anyhow::Error::from))
            .collect()
    }
}

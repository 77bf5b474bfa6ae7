use clap::{ArgAction, Args, Parser, Subcommand};
use std::time::Duration;

use spikr_core::ExecutionModel;

use crate::scenarios::ScenarioName;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 30s, 250ms, 1m)".to_string());
    }

    let d = humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 30s, 250ms, 1m)"))?;
    if d.is_zero() {
        return Err(format!("duration '{s}' must be greater than zero"));
    }
    Ok(d)
}

fn parse_executor(input: &str) -> Result<ExecutionModel, String> {
    ExecutionModel::parse(input.trim()).map_err(|err| err.to_string())
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr, human-readable summary on stdout.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "spikr",
    author,
    version,
    about = "Load generator for the course-enrollment service",
    long_about = "spikr drives synthetic load against the course-enrollment service and judges the run against pass/fail thresholds.\n\nTwo scenarios are built in: `baseline` (closed-loop GET /lb/courses) and `spike` (open-loop POST /lb/enroll at a fixed arrival rate).\n\nFlags fall back to the BASE_URL, VUS, DURATION, RATE, MAX_VUS and COURSE_ID environment variables.",
    after_help = "Examples:\n  spikr run baseline\n  spikr run baseline --vus 50 --duration 1m\n  spikr run spike --rate 400 --max-vus 800 --output json\n  spikr run spike --threshold 'http_req_duration: p(99)<800;abort' --live-thresholds 1s\n  BASE_URL=https://staging.example.com spikr run spike"
)]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a built-in scenario against the target service
    #[command(
        long_about = "Run a built-in scenario for its configured duration, print a summary and exit non-zero when a threshold fails.\n\nCLI flags override the scenario defaults."
    )]
    Run(RunArgs),

    /// List the built-in scenarios and their defaults
    Scenarios,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Scenario to run
    #[arg(value_enum)]
    pub scenario: ScenarioName,

    /// Base URL of the service under test
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Closed loop: concurrent workers. Open loop: pre-allocated workers
    #[arg(long, env = "VUS")]
    pub vus: Option<u64>,

    /// Test duration (e.g. 30s, 250ms, 1m)
    #[arg(long, env = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Open loop: iterations started per time unit
    #[arg(long, env = "RATE")]
    pub rate: Option<f64>,

    /// Open loop: period `--rate` is expressed over
    #[arg(long, value_parser = parse_duration)]
    pub time_unit: Option<Duration>,

    /// Open loop: upper bound on concurrently running workers
    #[arg(long, env = "MAX_VUS")]
    pub max_vus: Option<u64>,

    /// Course targeted by enrollment requests
    #[arg(long, env = "COURSE_ID")]
    pub course_id: Option<u64>,

    /// Override the scenario's execution model
    /// (closed-loop | constant-vus | open-loop | constant-arrival-rate)
    #[arg(long, value_parser = parse_executor)]
    pub executor: Option<ExecutionModel>,

    /// Pause at the end of every iteration
    #[arg(long, value_parser = parse_duration)]
    pub think_time: Option<Duration>,

    /// How long in-flight iterations may finish once the run stops
    #[arg(long, value_parser = parse_duration)]
    pub graceful_stop: Option<Duration>,

    /// Per-request timeout; must be shorter than the graceful stop
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Pass/fail threshold, e.g. `http_req_failed: rate<0.01` or `latency_p95<300;abort`
    /// (repeatable; replaces the scenario's thresholds)
    #[arg(long = "threshold", value_name = "EXPR")]
    pub thresholds: Vec<String>,

    /// Run without any threshold
    #[arg(long, conflicts_with = "thresholds")]
    pub no_thresholds: bool,

    /// Evaluate `;abort` thresholds during the run at this interval
    #[arg(long, value_name = "INTERVAL", value_parser = parse_duration)]
    pub live_thresholds: Option<Duration>,

    /// Seed for reproducible request payloads
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        match Cli::try_parse_from(args) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    fn run_args(cli: Cli) -> RunArgs {
        match cli.command {
            Command::Run(args) => args,
            Command::Scenarios => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration(" 1m30s "), Ok(Duration::from_secs(90)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("0s").is_err());
    }

    #[test]
    fn cli_parses_spike_overrides() {
        let cli = parse(&[
            "spikr",
            "-vv",
            "run",
            "spike",
            "--base-url",
            "http://127.0.0.1:9000",
            "--rate",
            "400",
            "--time-unit",
            "1s",
            "--vus",
            "50",
            "--max-vus",
            "800",
            "--duration",
            "2m",
            "--course-id",
            "7",
            "--executor",
            "constant-arrival-rate",
            "--threshold",
            "http_req_failed: rate<0.01",
            "--threshold",
            "latency_p99<800;abort",
            "--live-thresholds",
            "1s",
            "--seed",
            "42",
            "--output",
            "json",
        ]);
        assert_eq!(cli.verbose, 2);

        let args = run_args(cli);
        assert_eq!(args.scenario, ScenarioName::Spike);
        assert_eq!(args.base_url, "http://127.0.0.1:9000");
        assert_eq!(args.rate, Some(400.0));
        assert_eq!(args.time_unit, Some(Duration::from_secs(1)));
        assert_eq!(args.vus, Some(50));
        assert_eq!(args.max_vus, Some(800));
        assert_eq!(args.duration, Some(Duration::from_secs(120)));
        assert_eq!(args.course_id, Some(7));
        assert_eq!(args.executor, Some(ExecutionModel::OpenLoop));
        assert_eq!(args.thresholds.len(), 2);
        assert_eq!(args.live_thresholds, Some(Duration::from_secs(1)));
        assert_eq!(args.seed, Some(42));
        assert!(matches!(args.output, OutputFormat::Json));
    }

    #[test]
    fn cli_rejects_unknown_executor() {
        let res = Cli::try_parse_from(["spikr", "run", "baseline", "--executor", "ramping-vus"]);
        assert!(res.is_err());
    }

    #[test]
    fn no_thresholds_conflicts_with_threshold() {
        let res = Cli::try_parse_from([
            "spikr",
            "run",
            "baseline",
            "--no-thresholds",
            "--threshold",
            "error_rate<0.1",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn cli_parses_scenarios_listing() {
        let cli = parse(&["spikr", "scenarios"]);
        assert!(matches!(cli.command, Command::Scenarios));
    }
}

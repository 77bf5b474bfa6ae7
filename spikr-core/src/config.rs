use std::time::Duration;

use serde::Serialize;
use spikr_metrics::DEFAULT_EXACT_SAMPLE_LIMIT;

use crate::thresholds::ThresholdSpec;
use crate::{Error, Result};

pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_RECLAIM: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Execution model name as written on the command line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::EnumString, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionModel {
    /// Fixed number of workers, each starting its next iteration as soon as the last one ends.
    #[strum(to_string = "closed-loop", serialize = "constant-vus")]
    ClosedLoop,

    /// Iterations start on a fixed schedule regardless of how long earlier ones take.
    #[strum(to_string = "open-loop", serialize = "constant-arrival-rate")]
    OpenLoop,
}

impl ExecutionModel {
    pub fn parse(name: &str) -> Result<Self> {
        name.parse()
            .map_err(|_| Error::InvalidExecutor(name.to_string()))
    }
}

/// What the open-loop dispatcher does with ticks that fell due while it was stalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedTickPolicy {
    /// Fire up to `max_burst` overdue ticks at once (default: `max_workers`) and drop the rest.
    Coalesce { max_burst: Option<u64> },
    /// Fire only the current tick and drop every overdue one.
    Drop,
}

impl Default for MissedTickPolicy {
    fn default() -> Self {
        Self::Coalesce { max_burst: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScenarioExecutor {
    ClosedLoop {
        workers: u64,
    },

    OpenLoop {
        /// Iterations started per `time_unit`.
        rate: f64,
        time_unit: Duration,
        min_workers: u64,
        max_workers: u64,
        missed_ticks: MissedTickPolicy,
        /// Idle workers above `min_workers` are retired after this long.
        idle_reclaim: Duration,
    },
}

impl ScenarioExecutor {
    pub fn model(&self) -> ExecutionModel {
        match self {
            Self::ClosedLoop { .. } => ExecutionModel::ClosedLoop,
            Self::OpenLoop { .. } => ExecutionModel::OpenLoop,
        }
    }

    /// Upper bound on concurrently running iterations.
    pub fn max_workers(&self) -> u64 {
        match self {
            Self::ClosedLoop { workers } => *workers,
            Self::OpenLoop { max_workers, .. } => *max_workers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioConfig {
    pub executor: ScenarioExecutor,
    pub duration: Duration,
    /// Pause at the end of every iteration.
    pub think_time: Duration,
    /// How long in-flight iterations may keep running once the run stops.
    pub graceful_stop: Duration,
}

impl ScenarioConfig {
    pub fn closed_loop(workers: u64, duration: Duration) -> Self {
        Self {
            executor: ScenarioExecutor::ClosedLoop { workers },
            duration,
            think_time: Duration::ZERO,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }

    pub fn open_loop(
        rate: f64,
        time_unit: Duration,
        min_workers: u64,
        max_workers: u64,
        duration: Duration,
    ) -> Self {
        Self {
            executor: ScenarioExecutor::OpenLoop {
                rate,
                time_unit,
                min_workers,
                max_workers,
                missed_ticks: MissedTickPolicy::default(),
                idle_reclaim: DEFAULT_IDLE_RECLAIM,
            },
            duration,
            think_time: Duration::ZERO,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }

    #[must_use]
    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    #[must_use]
    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    /// No-op for closed-loop scenarios.
    #[must_use]
    pub fn with_missed_tick_policy(mut self, policy: MissedTickPolicy) -> Self {
        if let ScenarioExecutor::OpenLoop { missed_ticks, .. } = &mut self.executor {
            *missed_ticks = policy;
        }
        self
    }

    /// No-op for closed-loop scenarios.
    #[must_use]
    pub fn with_idle_reclaim(mut self, grace: Duration) -> Self {
        if let ScenarioExecutor::OpenLoop { idle_reclaim, .. } = &mut self.executor {
            *idle_reclaim = grace;
        }
        self
    }

    pub fn model(&self) -> ExecutionModel {
        self.executor.model()
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(Error::InvalidDuration);
        }

        match &self.executor {
            ScenarioExecutor::ClosedLoop { workers } => {
                if *workers == 0 {
                    return Err(Error::InvalidWorkers);
                }
            }
            ScenarioExecutor::OpenLoop {
                rate,
                time_unit,
                min_workers,
                max_workers,
                missed_ticks,
                ..
            } => {
                if !rate.is_finite() || *rate <= 0.0 {
                    return Err(Error::InvalidRate);
                }
                if time_unit.is_zero() {
                    return Err(Error::InvalidTimeUnit);
                }
                if *max_workers == 0 {
                    return Err(Error::InvalidMaxWorkers);
                }
                if min_workers > max_workers {
                    return Err(Error::InvalidMinWorkers {
                        min: *min_workers,
                        max: *max_workers,
                    });
                }
                if let MissedTickPolicy::Coalesce {
                    max_burst: Some(0),
                } = missed_ticks
                {
                    return Err(Error::InvalidMaxBurst);
                }
            }
        }

        Ok(())
    }
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub name: String,
    /// Target endpoint; workloads build request URLs relative to it.
    pub base_url: String,
    pub scenario: ScenarioConfig,
    /// Applied to requests that do not set their own timeout.
    pub request_timeout: Duration,
    pub thresholds: Vec<ThresholdSpec>,
    /// Enables live evaluation of `abort_on_fail` thresholds.
    pub live_threshold_interval: Option<Duration>,
    pub exact_sample_limit: usize,
    /// Seeds per-worker RNGs for reproducible payloads.
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        scenario: ScenarioConfig,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            scenario,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            thresholds: Vec::new(),
            live_threshold_interval: None,
            exact_sample_limit: DEFAULT_EXACT_SAMPLE_LIMIT,
            seed: None,
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Vec<ThresholdSpec>) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_live_thresholds(mut self, interval: Duration) -> Self {
        self.live_threshold_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        match url::Url::parse(&self.base_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(Error::InvalidBaseUrl(self.base_url.clone())),
        }

        self.scenario.validate()?;

        if self.request_timeout.is_zero() {
            return Err(Error::InvalidRequestTimeout);
        }
        if self.live_threshold_interval.is_some_and(|d| d.is_zero()) {
            return Err(Error::InvalidLiveThresholdInterval);
        }
        if self.exact_sample_limit == 0 {
            return Err(Error::InvalidExactSampleLimit);
        }

        if self.request_timeout >= self.scenario.graceful_stop {
            return Err(Error::RequestTimeoutNotBelowGrace {
                timeout: self.request_timeout,
                grace: self.scenario.graceful_stop,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn executor_names_accept_k6_aliases() {
        assert_eq!(
            ExecutionModel::parse("constant-vus").ok(),
            Some(ExecutionModel::ClosedLoop)
        );
        assert_eq!(
            ExecutionModel::parse("constant-arrival-rate").ok(),
            Some(ExecutionModel::OpenLoop)
        );
        assert_eq!(ExecutionModel::OpenLoop.to_string(), "open-loop");
        assert!(matches!(
            ExecutionModel::parse("ramping-vus"),
            Err(Error::InvalidExecutor(_))
        ));
    }

    #[test]
    fn closed_loop_requires_workers() {
        let cfg = ScenarioConfig::closed_loop(0, secs(1));
        assert!(matches!(cfg.validate(), Err(Error::InvalidWorkers)));
    }

    #[test]
    fn open_loop_invariants() {
        let ok = ScenarioConfig::open_loop(200.0, secs(1), 100, 500, secs(60));
        assert!(ok.validate().is_ok());

        let cases = [
            (ScenarioConfig::open_loop(0.0, secs(1), 1, 1, secs(1)), "rate"),
            (ScenarioConfig::open_loop(f64::NAN, secs(1), 1, 1, secs(1)), "rate"),
            (ScenarioConfig::open_loop(1.0, Duration::ZERO, 1, 1, secs(1)), "time_unit"),
            (ScenarioConfig::open_loop(1.0, secs(1), 0, 0, secs(1)), "max_workers"),
            (ScenarioConfig::open_loop(1.0, secs(1), 5, 2, secs(1)), "min_workers"),
            (ScenarioConfig::open_loop(1.0, secs(1), 1, 1, Duration::ZERO), "duration"),
        ];
        for (cfg, field) in cases {
            let err = match cfg.validate() {
                Ok(()) => panic!("expected `{field}` to be rejected"),
                Err(e) => e,
            };
            assert!(err.to_string().contains(field), "{field}: {err}");
        }
    }

    #[test]
    fn zero_max_burst_is_rejected() {
        let cfg = ScenarioConfig::open_loop(1.0, secs(1), 1, 1, secs(1))
            .with_missed_tick_policy(MissedTickPolicy::Coalesce { max_burst: Some(0) });
        assert!(matches!(cfg.validate(), Err(Error::InvalidMaxBurst)));
    }

    #[test]
    fn run_config_rejects_bad_base_url_and_timeout() {
        let scenario = ScenarioConfig::closed_loop(1, secs(1));

        let bad_url = RunConfig::new("t", "localhost:8080", scenario.clone());
        assert!(matches!(bad_url.validate(), Err(Error::InvalidBaseUrl(_))));

        let bad_timeout = RunConfig::new("t", "http://localhost:8080", scenario)
            .with_request_timeout(Duration::ZERO);
        assert!(matches!(
            bad_timeout.validate(),
            Err(Error::InvalidRequestTimeout)
        ));
    }

    #[test]
    fn request_timeout_must_be_shorter_than_grace() {
        let scenario = ScenarioConfig::closed_loop(1, secs(1)).with_graceful_stop(secs(5));

        let equal = RunConfig::new("t", "http://localhost:8080", scenario.clone())
            .with_request_timeout(secs(5));
        let err = match equal.validate() {
            Ok(()) => panic!("timeout equal to grace was accepted"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            Error::RequestTimeoutNotBelowGrace { timeout, grace } if timeout == secs(5) && grace == secs(5)
        ));
        assert!(err.to_string().contains("graceful_stop"), "{err}");

        let shorter = RunConfig::new("t", "http://localhost:8080", scenario)
            .with_request_timeout(Duration::from_millis(4_999));
        assert!(shorter.validate().is_ok());
    }
}

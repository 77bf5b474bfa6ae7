use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::{RequestSpec, StatusCheck, TransportErrorKind};

/// Terminal state of one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    /// A response was received.
    Http(u16),
    /// The request never produced a response.
    Transport(TransportErrorKind),
    /// Still in flight when the drain grace period expired.
    Abandoned,
}

impl OutcomeStatus {
    /// 2xx responses are the only successes.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Http(200..=299))
    }

    pub fn http_status(self) -> Option<u16> {
        match self {
            Self::Http(status) => Some(status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: Arc<str>,
    pub passed: bool,
}

impl CheckResult {
    fn evaluate(check: &StatusCheck, status: OutcomeStatus) -> Self {
        Self {
            name: check.name.clone(),
            passed: status.http_status() == Some(check.expected_status),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub name: Arc<str>,
    pub method: http::Method,
    pub status: OutcomeStatus,
    pub latency: Duration,
    pub started_at: SystemTime,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub check: Option<CheckResult>,
}

impl RequestOutcome {
    pub fn new(
        spec: &RequestSpec,
        status: OutcomeStatus,
        started_at: SystemTime,
        latency: Duration,
    ) -> Self {
        Self {
            name: spec.metric_name(),
            method: spec.method.clone(),
            status,
            latency,
            started_at,
            bytes_received: 0,
            bytes_sent: 0,
            check: spec
                .check
                .as_ref()
                .map(|check| CheckResult::evaluate(check, status)),
        }
    }

    pub fn abandoned(spec: &RequestSpec, started_at: SystemTime, latency: Duration) -> Self {
        Self::new(spec, OutcomeStatus::Abandoned, started_at, latency)
    }

    #[must_use]
    pub fn with_bytes(mut self, bytes_sent: u64, bytes_received: u64) -> Self {
        self.bytes_sent = bytes_sent;
        self.bytes_received = bytes_received;
        self
    }

    pub fn is_error(&self) -> bool {
        !self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_2xx_is_success() {
        assert!(OutcomeStatus::Http(200).is_success());
        assert!(OutcomeStatus::Http(204).is_success());
        assert!(!OutcomeStatus::Http(302).is_success());
        assert!(!OutcomeStatus::Http(500).is_success());
        assert!(!OutcomeStatus::Transport(TransportErrorKind::Timeout).is_success());
        assert!(!OutcomeStatus::Abandoned.is_success());
    }

    #[test]
    fn check_is_evaluated_against_status() {
        let spec = RequestSpec::get("http://h/lb/enroll").with_check("enroll queued 200", 200);

        let ok = RequestOutcome::new(
            &spec,
            OutcomeStatus::Http(200),
            SystemTime::now(),
            Duration::from_millis(1),
        );
        assert_eq!(ok.check.as_ref().map(|c| c.passed), Some(true));

        let abandoned = RequestOutcome::abandoned(&spec, SystemTime::now(), Duration::ZERO);
        assert_eq!(abandoned.check.as_ref().map(|c| c.passed), Some(false));
        assert!(abandoned.is_error());
    }
}

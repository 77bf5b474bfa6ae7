use std::future::Future;
use std::time::{Instant, SystemTime};

use crate::{HttpClient, OutcomeStatus, RequestOutcome, RequestSpec};

/// Executes one [`RequestSpec`] and reports how it ended.
///
/// Implementations never fail: every problem is folded into the returned outcome so the
/// scheduler only ever deals with outcomes. Test doubles implement this to script latency
/// and status without a network.
pub trait RequestIssuer: Send + Sync + 'static {
    fn issue(&self, spec: &RequestSpec) -> impl Future<Output = RequestOutcome> + Send;
}

impl RequestIssuer for HttpClient {
    async fn issue(&self, spec: &RequestSpec) -> RequestOutcome {
        let started_at = SystemTime::now();
        let started = Instant::now();

        match self.request(spec).await {
            Ok(res) => RequestOutcome::new(
                spec,
                OutcomeStatus::Http(res.status),
                started_at,
                started.elapsed(),
            )
            .with_bytes(res.bytes_sent, res.bytes_received),
            Err(err) => {
                let latency = started.elapsed();
                log::debug!("{} {} failed: {err}", spec.method, spec.url);
                let bytes_sent = crate::estimate_request_bytes(spec).unwrap_or(0);
                RequestOutcome::new(
                    spec,
                    OutcomeStatus::Transport(err.transport_error_kind()),
                    started_at,
                    latency,
                )
                .with_bytes(bytes_sent, 0)
            }
        }
    }
}

impl<T: RequestIssuer> RequestIssuer for std::sync::Arc<T> {
    fn issue(&self, spec: &RequestSpec) -> impl Future<Output = RequestOutcome> + Send {
        (**self).issue(spec)
    }
}

use std::sync::Arc;
use std::time::Duration;

use spikr_core::{ExecutionModel, IterationContext, Workload};
use spikr_http::RequestSpec;

use super::{PATH_COURSES, ScenarioDefaults};

pub(super) const DEFAULTS: ScenarioDefaults = ScenarioDefaults {
    description: "closed-loop GET /lb/courses load",
    model: ExecutionModel::ClosedLoop,
    vus: 100,
    duration: Duration::from_secs(30),
    // Only used when the executor is overridden to open loop.
    rate: 200.0,
    time_unit: Duration::from_secs(1),
    max_vus: 100,
    think_time: Duration::from_millis(100),
    thresholds: &["http_req_failed: rate<0.01", "http_req_duration: p(95)<300"],
};

pub(super) fn workload() -> Arc<dyn Workload> {
    Arc::new(|ctx: &mut IterationContext| vec![RequestSpec::get(ctx.url(PATH_COURSES))])
}

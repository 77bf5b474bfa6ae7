use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;
use serde::Serialize;
use spikr_core::{ExecutionModel, IterationContext, Workload};
use spikr_http::RequestSpec;

use super::{PATH_ENROLL, PATH_QUEUE_STATUS, ScenarioDefaults, WorkloadParams};

pub(super) const DEFAULTS: ScenarioDefaults = ScenarioDefaults {
    description: "open-loop POST /lb/enroll at a fixed arrival rate",
    model: ExecutionModel::OpenLoop,
    vus: 100,
    duration: Duration::from_secs(60),
    rate: 200.0,
    time_unit: Duration::from_secs(1),
    max_vus: 500,
    think_time: Duration::from_millis(100),
    thresholds: &["http_req_failed: rate<0.01", "http_req_duration: p(95)<500"],
};

const MAX_USER_ID: u64 = 100_000;
const QUEUE_STATUS_PROBABILITY: f64 = 0.05;

const CHECK_ENROLL: &str = "enroll queued 200";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Enrollment {
    user_id: u64,
    course_id: u64,
    priority: u32,
}

/// Enrolls a random user; one iteration in twenty also polls the queue.
pub(super) fn workload(params: WorkloadParams) -> Arc<dyn Workload> {
    Arc::new(move |ctx: &mut IterationContext| {
        let body = Enrollment {
            user_id: ctx.rng().gen_range(1..=MAX_USER_ID),
            course_id: params.course_id,
            priority: ctx.rng().gen_range(0..100),
        };

        let mut specs = Vec::with_capacity(2);
        match RequestSpec::post_json(ctx.url(PATH_ENROLL), &body) {
            Ok(spec) => specs.push(spec.with_check(CHECK_ENROLL, 200)),
            Err(err) => log::error!("failed to encode enrollment body: {err}"),
        }

        if ctx.rng().gen_bool(QUEUE_STATUS_PROBABILITY) {
            specs.push(RequestSpec::get(ctx.url(PATH_QUEUE_STATUS)));
        }
        specs
    })
}

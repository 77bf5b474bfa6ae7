use std::sync::Arc;

use rand::SeedableRng as _;
use rand::rngs::SmallRng;
use spikr_http::RequestSpec;

/// Per-worker state handed to every iteration.
#[derive(Debug)]
pub struct IterationContext {
    /// 1-based, unique within a run.
    pub worker_id: u64,
    /// 0-based count of iterations this worker has started.
    pub iteration: u64,
    base_url: Arc<str>,
    rng: SmallRng,
}

impl IterationContext {
    pub fn new(worker_id: u64, base_url: Arc<str>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(worker_id)),
            None => SmallRng::from_entropy(),
        };

        Self {
            worker_id,
            iteration: 0,
            base_url,
            rng,
        }
    }

    /// Joins `path` onto the base URL without doubling the slash.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

/// The body of one virtual-user iteration.
///
/// Must not block: it only decides which requests to send. The returned specs are issued in
/// order, one at a time.
pub trait Workload: Send + Sync + 'static {
    fn iteration(&self, ctx: &mut IterationContext) -> Vec<RequestSpec>;
}

impl<F> Workload for F
where
    F: Fn(&mut IterationContext) -> Vec<RequestSpec> + Send + Sync + 'static,
{
    fn iteration(&self, ctx: &mut IterationContext) -> Vec<RequestSpec> {
        self(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng as _;

    #[test]
    fn url_joins_with_single_slash() {
        let ctx = IterationContext::new(1, Arc::from("http://localhost:8080/"), Some(1));
        assert_eq!(ctx.url("/lb/courses"), "http://localhost:8080/lb/courses");
        assert_eq!(ctx.url("lb/enroll"), "http://localhost:8080/lb/enroll");
    }

    #[test]
    fn seeded_workers_get_distinct_reproducible_streams() {
        let base: Arc<str> = Arc::from("http://h");
        let mut a1 = IterationContext::new(1, base.clone(), Some(42));
        let mut a2 = IterationContext::new(1, base.clone(), Some(42));
        let mut b = IterationContext::new(2, base, Some(42));

        let x1: u64 = a1.rng().r#gen();
        let x2: u64 = a2.rng().r#gen();
        let y: u64 = b.rng().r#gen();
        assert_eq!(x1, x2);
        assert_ne!(x1, y);
    }

    #[test]
    fn closures_are_workloads() {
        let w = |ctx: &mut IterationContext| vec![RequestSpec::get(ctx.url("/lb/courses"))];
        let mut ctx = IterationContext::new(1, Arc::from("http://h"), None);
        let specs = Workload::iteration(&w, &mut ctx);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].url, "http://h/lb/courses");
    }
}

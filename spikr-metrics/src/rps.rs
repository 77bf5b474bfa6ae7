use serde::Serialize;

/// Welford running mean/variance over per-second throughput samples.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct RpsAgg {
    count: u64,
    mean: f64,
    m2: f64,
    max: f64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct RpsSummary {
    pub samples: u64,
    pub avg: f64,
    pub stdev: f64,
    pub max: f64,
    /// Stdev as a percentage of the mean.
    pub stdev_pct: f64,
}

impl RpsAgg {
    pub(crate) fn record(&mut self, sample: f64) {
        if !sample.is_finite() {
            return;
        }

        self.count = self.count.saturating_add(1);
        let delta = sample - self.mean;
        self.mean += delta / (self.count as f64);
        let delta2 = sample - self.mean;
        self.m2 += delta * delta2;
        self.max = self.max.max(sample);
    }

    pub(crate) fn summary(&self) -> RpsSummary {
        if self.count == 0 {
            return RpsSummary::default();
        }

        let stdev = if self.count >= 2 {
            (self.m2 / ((self.count - 1) as f64)).sqrt()
        } else {
            0.0
        };
        let stdev_pct = if self.mean > 0.0 {
            (stdev / self.mean) * 100.0
        } else {
            0.0
        };

        RpsSummary {
            samples: self.count,
            avg: self.mean,
            stdev,
            max: self.max,
            stdev_pct,
        }
    }
}

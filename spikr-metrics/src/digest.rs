use hdrhistogram::Histogram;

/// Default number of raw samples kept for exact percentiles.
pub const DEFAULT_EXACT_SAMPLE_LIMIT: usize = 100_000;

// Track up to one hour in microseconds with 3 significant digits.
const HIST_LOW_US: u64 = 1;
const HIST_HIGH_US: u64 = 3_600_000_000;
const HIST_SIGFIGS: u8 = 3;

/// Percentile ladder, in tenths of a percent: p1..=p99, p99.9, p100.
pub fn percentile_ladder() -> impl Iterator<Item = u16> {
    (10..=990).step_by(10).chain([999, 1000])
}

/// Whether `percentile` (e.g. `95.0`, `99.9`) is on the ladder.
pub fn is_supported_percentile(percentile: f64) -> bool {
    per_mille(percentile).is_some()
}

pub(crate) fn per_mille(percentile: f64) -> Option<u16> {
    if !percentile.is_finite() || percentile <= 0.0 || percentile > 100.0 {
        return None;
    }
    let scaled = percentile * 10.0;
    let rounded = scaled.round();
    if (scaled - rounded).abs() > 1e-6 {
        return None;
    }
    let pm = rounded as u16;
    percentile_ladder().any(|p| p == pm).then_some(pm)
}

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW_US, HIST_HIGH_US, HIST_SIGFIGS)
        .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
}

/// Latency distribution in microseconds.
///
/// Raw samples are retained while there are at most `exact_sample_limit` of them and answer
/// nearest-rank quantiles exactly. Past the limit they are discarded and the histogram takes
/// over. Count, min, max, mean and stdev are always exact.
#[derive(Debug, Clone)]
pub struct LatencyDigest {
    hist: Histogram<u64>,
    exact: Option<Vec<u64>>,
    /// Length of the sorted prefix of `exact`; later samples are an unsorted tail.
    sorted_len: usize,
    exact_sample_limit: usize,
    count: u64,
    min_us: u64,
    max_us: u64,
    mean_us: f64,
    m2: f64,
}

impl Default for LatencyDigest {
    fn default() -> Self {
        Self::new(DEFAULT_EXACT_SAMPLE_LIMIT)
    }
}

impl LatencyDigest {
    pub fn new(exact_sample_limit: usize) -> Self {
        Self {
            hist: new_histogram(),
            exact: Some(Vec::new()),
            sorted_len: 0,
            exact_sample_limit,
            count: 0,
            min_us: u64::MAX,
            max_us: 0,
            mean_us: 0.0,
            m2: 0.0,
        }
    }

    pub fn record_us(&mut self, us: u64) {
        self.hist.saturating_record(us);

        if let Some(samples) = &mut self.exact {
            if samples.len() < self.exact_sample_limit {
                if self.sorted_len == samples.len()
                    && samples.last().is_none_or(|&last| last <= us)
                {
                    self.sorted_len += 1;
                }
                samples.push(us);
            } else {
                log::debug!(
                    "latency digest passed {} samples; switching to histogram percentiles",
                    self.exact_sample_limit
                );
                self.exact = None;
            }
        }

        self.count += 1;
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
        let x = us as f64;
        let delta = x - self.mean_us;
        self.mean_us += delta / self.count as f64;
        self.m2 += delta * (x - self.mean_us);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether quantiles are currently answered from raw samples.
    pub fn is_exact(&self) -> bool {
        self.exact.is_some()
    }

    pub fn min_us(&self) -> Option<u64> {
        (self.count > 0).then_some(self.min_us)
    }

    pub fn max_us(&self) -> Option<u64> {
        (self.count > 0).then_some(self.max_us)
    }

    pub fn mean_us(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean_us)
    }

    /// Population standard deviation.
    pub fn stdev_us(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.m2 / self.count as f64).sqrt())
    }

    /// Value at `percentile` (0, 100]. `None` when empty or out of range.
    pub fn percentile_us(&mut self, percentile: f64) -> Option<u64> {
        if self.count == 0 || !percentile.is_finite() || percentile <= 0.0 || percentile > 100.0 {
            return None;
        }

        if percentile >= 100.0 {
            return Some(self.max_us);
        }

        if let Some(samples) = &mut self.exact {
            settle(samples, &mut self.sorted_len);
            let n = samples.len();
            // Nearest rank: ceil(p/100 * n), 1-based. The epsilon absorbs f64 noise in p * n.
            let rank = (percentile * n as f64 / 100.0 - 1e-9).ceil() as usize;
            let idx = rank.clamp(1, n) - 1;
            return samples.get(idx).copied();
        }

        Some(self.hist.value_at_quantile(percentile / 100.0).min(self.max_us))
    }

    /// Folds `other` into `self`. Raw samples survive only if the combined set fits the limit.
    pub fn merge(&mut self, other: &LatencyDigest) {
        if other.count == 0 {
            return;
        }

        // Bounds are identical for every digest, so this cannot fail.
        let _ = self.hist.add(&other.hist);

        match (&mut self.exact, &other.exact) {
            (Some(mine), Some(theirs)) if mine.len() + theirs.len() <= self.exact_sample_limit => {
                mine.extend_from_slice(theirs);
            }
            _ => self.exact = None,
        }

        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = other.mean_us - self.mean_us;
        self.mean_us += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count += other.count;
        self.min_us = self.min_us.min(other.min_us);
        self.max_us = self.max_us.max(other.max_us);
    }
}

/// Sorts the tail recorded since the last query and merges it into the sorted prefix.
fn settle(samples: &mut Vec<u64>, sorted_len: &mut usize) {
    if *sorted_len == samples.len() {
        return;
    }
    samples[*sorted_len..].sort_unstable();
    if *sorted_len > 0 && samples[*sorted_len - 1] > samples[*sorted_len] {
        let tail = samples.split_off(*sorted_len);
        *samples = merge_sorted(samples, &tail);
    }
    *sorted_len = samples.len();
}

fn merge_sorted(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] <= b[j] {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

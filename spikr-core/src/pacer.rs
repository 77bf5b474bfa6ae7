use std::time::{Duration, Instant};

use crate::config::MissedTickPolicy;

/// Ticks released by one [`ArrivalClock::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickBatch {
    /// Iterations to start now.
    pub dispatch: u64,
    /// Overdue ticks discarded by the missed-tick policy.
    pub dropped: u64,
}

/// Open-loop schedule: tick `k` is due at `start + k * interval`, for every `k` whose due
/// time falls inside the run.
///
/// The clock never accumulates a backlog: whatever is overdue at a poll is either released
/// within the burst limit or reported as dropped.
#[derive(Debug)]
pub struct ArrivalClock {
    start: Instant,
    interval_nanos: u128,
    total_ticks: u64,
    next_tick: u64,
    policy: MissedTickPolicy,
    max_burst: u64,
}

impl ArrivalClock {
    /// `rate` iterations per `time_unit` for `duration`. `default_burst` backs
    /// `Coalesce { max_burst: None }`.
    pub fn new(
        start: Instant,
        rate: f64,
        time_unit: Duration,
        duration: Duration,
        policy: MissedTickPolicy,
        default_burst: u64,
    ) -> Self {
        let interval_nanos = ((time_unit.as_nanos() as f64) / rate).round().max(1.0) as u128;
        // Computed from the rate rather than the rounded interval so 3/s over 1s is 3 ticks.
        let expected = rate * duration.as_secs_f64() / time_unit.as_secs_f64();
        let total_ticks = (expected - 1e-9).ceil().max(0.0) as u64;
        let max_burst = match policy {
            MissedTickPolicy::Coalesce { max_burst } => max_burst.unwrap_or(default_burst),
            MissedTickPolicy::Drop => 1,
        }
        .max(1);

        Self {
            start,
            interval_nanos,
            total_ticks,
            next_tick: 0,
            policy,
            max_burst,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(u64::try_from(self.interval_nanos).unwrap_or(u64::MAX))
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Index of the next tick that has not been released or dropped.
    pub fn next_tick(&self) -> u64 {
        self.next_tick
    }

    pub fn is_finished(&self) -> bool {
        self.next_tick >= self.total_ticks
    }

    pub fn due_at(&self, tick: u64) -> Instant {
        let offset = self.interval_nanos.saturating_mul(u128::from(tick));
        self.start + Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
    }

    pub fn next_due(&self) -> Instant {
        self.due_at(self.next_tick)
    }

    /// Releases every tick due at or before `now`.
    pub fn poll(&mut self, now: Instant) -> TickBatch {
        if self.is_finished() || now < self.next_due() {
            return TickBatch::default();
        }

        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        let last_due = u64::try_from(elapsed / self.interval_nanos)
            .unwrap_or(u64::MAX)
            .min(self.total_ticks - 1);
        let due = last_due - self.next_tick + 1;
        self.next_tick = last_due + 1;

        let dispatch = match self.policy {
            MissedTickPolicy::Coalesce { .. } => due.min(self.max_burst),
            MissedTickPolicy::Drop => 1,
        };

        TickBatch {
            dispatch,
            dropped: due - dispatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn coalesce(max_burst: Option<u64>) -> MissedTickPolicy {
        MissedTickPolicy::Coalesce { max_burst }
    }

    #[test]
    fn tick_count_matches_rate_times_duration() {
        let start = Instant::now();
        let clock = ArrivalClock::new(start, 200.0, ms(1000), ms(1000), coalesce(None), 500);
        assert_eq!(clock.interval(), ms(5));
        assert_eq!(clock.total_ticks(), 200);

        let fractional = ArrivalClock::new(start, 3.0, ms(1000), ms(1000), coalesce(None), 1);
        // 0, 333, 666 ms are inside the second.
        assert_eq!(fractional.total_ticks(), 3);
    }

    #[test]
    fn on_time_polls_release_one_tick_each() {
        let start = Instant::now();
        let mut clock = ArrivalClock::new(start, 10.0, ms(1000), ms(1000), coalesce(None), 5);

        let mut dispatched = 0;
        for k in 0..10 {
            let batch = clock.poll(clock.due_at(k));
            assert_eq!(batch, TickBatch { dispatch: 1, dropped: 0 });
            dispatched += batch.dispatch;
        }
        assert_eq!(dispatched, 10);
        assert!(clock.is_finished());
        assert_eq!(clock.poll(start + ms(5000)), TickBatch::default());
    }

    #[test]
    fn polling_early_releases_nothing() {
        let start = Instant::now();
        let mut clock = ArrivalClock::new(start, 10.0, ms(1000), ms(1000), coalesce(None), 5);
        assert_eq!(clock.poll(start).dispatch, 1);
        assert_eq!(clock.poll(start + ms(50)), TickBatch::default());
        assert_eq!(clock.next_tick(), 1);
    }

    #[test]
    fn stall_is_coalesced_up_to_burst_and_rest_dropped() {
        let start = Instant::now();
        let mut clock = ArrivalClock::new(start, 100.0, ms(1000), ms(1000), coalesce(Some(4)), 50);
        assert_eq!(clock.poll(start).dispatch, 1);

        // Ticks 1..=10 are due at 100ms.
        let batch = clock.poll(start + ms(100));
        assert_eq!(batch, TickBatch { dispatch: 4, dropped: 6 });
        assert_eq!(clock.next_tick(), 11);
    }

    #[test]
    fn default_burst_is_used_when_unset() {
        let start = Instant::now();
        let mut clock = ArrivalClock::new(start, 100.0, ms(1000), ms(1000), coalesce(None), 3);
        let batch = clock.poll(start + ms(100));
        assert_eq!(batch, TickBatch { dispatch: 3, dropped: 8 });
    }

    #[test]
    fn drop_policy_keeps_only_the_current_tick() {
        let start = Instant::now();
        let mut clock = ArrivalClock::new(start, 100.0, ms(1000), ms(1000), MissedTickPolicy::Drop, 50);
        let batch = clock.poll(start + ms(100));
        assert_eq!(batch, TickBatch { dispatch: 1, dropped: 10 });
    }

    #[test]
    fn stall_past_the_end_only_counts_ticks_inside_the_run() {
        let start = Instant::now();
        let mut clock = ArrivalClock::new(start, 10.0, ms(1000), ms(1000), coalesce(Some(100)), 1);
        let batch = clock.poll(start + ms(10_000));
        assert_eq!(batch.dispatch + batch.dropped, 10);
        assert!(clock.is_finished());
    }
}

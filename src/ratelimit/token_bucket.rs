//! Token bucket.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::clock::{default_clock, duration_millis, Clock};
use super::limiter::{Algorithm, Limiter};
use crate::error::{RatewardenError, Result};

#[derive(Debug)]
struct BucketState {
    /// Tokens currently in the bucket
    tokens: u64,
    /// Clock reading up to which refills have been credited
    last_refill: u64,
}

impl BucketState {
    /// Credit whole refill periods elapsed since `last_refill`.
    ///
    /// `last_refill` only advances by the periods actually credited, so the
    /// partial period in progress carries over to the next call.
    fn refill(&mut self, now: u64, capacity: u64, period_millis: u64) -> u64 {
        if now < self.last_refill {
            warn!(
                now = now,
                last_refill = self.last_refill,
                "Clock moved backward, treating as no elapsed time"
            );
            return 0;
        }

        let periods = (now - self.last_refill) / period_millis;
        if periods > 0 {
            self.tokens = self.tokens.saturating_add(periods).min(capacity);
            self.last_refill += periods * period_millis;
        }
        periods
    }
}

/// Rate limiter handing out tokens from a single shared bucket.
///
/// The bucket starts full with `capacity` tokens and gains one token every
/// `refill_period`, never holding more than `capacity`. Each admitted
/// request takes one token, which allows bursts of up to `capacity`
/// requests while holding the long-run rate to one per period.
///
/// The bucket is global: every client competes for the same tokens.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    capacity: u64,
    refill_period_millis: u64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucketLimiter {
    /// Create a full bucket of `capacity` tokens gaining one token every `refill_period`.
    pub fn new(capacity: u64, refill_period: Duration) -> Result<Self> {
        Self::with_clock(capacity, refill_period, default_clock())
    }

    /// Create a bucket reading time from `clock`.
    pub fn with_clock(
        capacity: u64,
        refill_period: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(RatewardenError::not_positive("capacity", capacity));
        }
        let refill_period_millis = duration_millis(refill_period);
        if refill_period_millis == 0 {
            return Err(RatewardenError::not_positive(
                "refill_period_millis",
                refill_period_millis,
            ));
        }

        debug!(
            capacity = capacity,
            refill_period_millis = refill_period_millis,
            "Creating token bucket limiter"
        );

        let now = clock.now_millis();
        Ok(Self {
            capacity,
            refill_period_millis,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
            clock,
        })
    }

    /// Maximum tokens the bucket holds.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Time to gain one token.
    pub fn refill_period(&self) -> Duration {
        Duration::from_millis(self.refill_period_millis)
    }

    /// Tokens available now, after crediting any elapsed refill periods.
    pub fn available_tokens(&self) -> u64 {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        state.refill(now, self.capacity, self.refill_period_millis);
        state.tokens
    }
}

impl Limiter for TokenBucketLimiter {
    fn allow(&self, client_id: &str) -> bool {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();

        let refilled = state.refill(now, self.capacity, self.refill_period_millis);
        let allowed = state.tokens > 0;
        if allowed {
            state.tokens -= 1;
        }
        let tokens = state.tokens;
        drop(state);

        trace!(
            client = %client_id,
            refilled = refilled,
            tokens = tokens,
            allowed = allowed,
            "Checked token bucket"
        );
        if !allowed {
            debug!(client = %client_id, "Rate limit exceeded");
        }

        allowed
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;
    use std::sync::Barrier;

    fn bucket(capacity: u64, period_millis: u64) -> (TokenBucketLimiter, ManualClock) {
        let clock = ManualClock::new(0);
        let bucket = TokenBucketLimiter::with_clock(
            capacity,
            Duration::from_millis(period_millis),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (bucket, clock)
    }

    fn drain(bucket: &TokenBucketLimiter) {
        while bucket.allow("drain") {}
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        assert!(TokenBucketLimiter::new(0, Duration::from_secs(1)).is_err());
        assert!(TokenBucketLimiter::new(5, Duration::ZERO).is_err());
    }

    #[test]
    fn test_scenario_five_per_second() {
        let (bucket, clock) = bucket(5, 1000);

        for _ in 0..5 {
            assert!(bucket.allow("c1"));
        }
        assert!(!bucket.allow("c1"));

        clock.advance_millis(1000);
        assert!(bucket.allow("c1"));
    }

    #[test]
    fn test_starts_full() {
        let (bucket, _clock) = bucket(3, 1000);
        assert_eq!(bucket.available_tokens(), 3);
    }

    #[test]
    fn test_refill_clamped_to_capacity() {
        let (bucket, clock) = bucket(3, 100);

        drain(&bucket);
        clock.advance_millis(10_000);
        assert_eq!(bucket.available_tokens(), 3);
    }

    #[test]
    fn test_half_periods_accumulate() {
        let (split, split_clock) = bucket(5, 1000);
        let (whole, whole_clock) = bucket(5, 1000);
        drain(&split);
        drain(&whole);

        split_clock.advance_millis(500);
        assert!(!split.allow("c1"));
        split_clock.advance_millis(500);

        whole_clock.advance_millis(1000);

        assert_eq!(split.available_tokens(), whole.available_tokens());
        assert_eq!(split.available_tokens(), 1);
    }

    #[test]
    fn test_partial_period_carries_over_after_refill() {
        let (bucket, clock) = bucket(5, 1000);
        drain(&bucket);

        // 1.5 periods: one token now, half a period carried forward.
        clock.set(1500);
        assert!(bucket.allow("c1"));
        assert!(!bucket.allow("c1"));

        clock.set(2000);
        assert!(bucket.allow("c1"));
    }

    #[test]
    fn test_long_run_rate_has_no_drift() {
        let (bucket, clock) = bucket(10, 300);
        drain(&bucket);

        // Poll every 700ms for 21 seconds; exactly 21000 / 300 tokens appear.
        let mut admitted = 0;
        for _ in 0..30 {
            clock.advance_millis(700);
            while bucket.allow("c1") {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 70);
    }

    #[test]
    fn test_rejection_never_goes_below_zero() {
        let (bucket, _clock) = bucket(2, 1000);

        drain(&bucket);
        for _ in 0..10 {
            assert!(!bucket.allow("c1"));
        }
        assert_eq!(bucket.available_tokens(), 0);
    }

    #[test]
    fn test_bucket_is_shared_between_clients() {
        let (bucket, _clock) = bucket(2, 1000);

        assert!(bucket.allow("a"));
        assert!(bucket.allow("b"));
        assert!(!bucket.allow("c"));
    }

    #[test]
    fn test_clock_moving_backward_is_no_progress() {
        let (bucket, clock) = bucket(2, 1000);
        drain(&bucket);

        clock.set(5000);
        assert_eq!(bucket.available_tokens(), 2);
        drain(&bucket);

        clock.set(1000);
        assert!(!bucket.allow("c1"));

        // Refill resumes from the last credited time, not the skewed reading.
        clock.set(5999);
        assert!(!bucket.allow("c1"));
        clock.set(6000);
        assert!(bucket.allow("c1"));
    }

    #[test]
    fn test_concurrent_callers_take_each_token_once() {
        let callers = 40;
        let (bucket, _clock) = bucket(16, 60_000);
        let barrier = Barrier::new(callers);

        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..callers)
                .map(|_| {
                    let bucket = &bucket;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        bucket.allow("c1")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|allowed| *allowed)
                .count()
        });

        assert_eq!(admitted, 16);
        assert_eq!(bucket.available_tokens(), 0);
    }
}

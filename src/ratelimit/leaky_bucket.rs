//! Leaky bucket.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::clock::{default_clock, Clock};
use super::limiter::{Algorithm, Limiter};
use crate::error::{RatewardenError, Result};

/// Bucket level and the time it was last brought up to date.
///
/// The two fields only change together under the bucket lock.
#[derive(Debug)]
struct BucketState {
    /// Admission units drained out of the bucket and not yet used
    level: u64,
    /// Clock reading the level was last updated at
    last_update: u64,
}

/// Rate limiter draining a single shared bucket at a constant rate.
///
/// The bucket drains `rate_per_second` units per second, up to `capacity`
/// units, and every admitted request uses one drained unit. The bucket
/// starts with nothing drained, so the first admission waits for the first
/// unit to leak out. Leaking is computed at millisecond granularity from the
/// time since the previous call. Calls closer together than one unit's worth
/// of time see no drain.
///
/// The bucket is global: every client competes for the same units.
#[derive(Debug)]
pub struct LeakyBucketLimiter {
    capacity: u64,
    rate_per_second: f64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl LeakyBucketLimiter {
    /// Create a bucket holding up to `capacity` units, draining
    /// `rate_per_second` units per second.
    pub fn new(capacity: u64, rate_per_second: f64) -> Result<Self> {
        Self::with_clock(capacity, rate_per_second, default_clock())
    }

    /// Create a bucket reading time from `clock`.
    pub fn with_clock(capacity: u64, rate_per_second: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        if capacity == 0 {
            return Err(RatewardenError::not_positive("capacity", capacity));
        }
        if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
            return Err(RatewardenError::not_positive("rate_per_second", rate_per_second));
        }

        debug!(
            capacity = capacity,
            rate_per_second = rate_per_second,
            "Creating leaky bucket limiter"
        );

        let now = clock.now_millis();
        Ok(Self {
            capacity,
            rate_per_second,
            state: Mutex::new(BucketState {
                level: 0,
                last_update: now,
            }),
            clock,
        })
    }

    /// Maximum drained units the bucket holds.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Drain rate in units per second.
    pub fn rate_per_second(&self) -> f64 {
        self.rate_per_second
    }

    /// Units available as of the last call, without leaking up to now.
    pub fn level(&self) -> u64 {
        self.state.lock().level
    }

    fn leaked_since(&self, elapsed_millis: u64) -> u64 {
        // Float to int casts saturate, so huge gaps clamp instead of wrapping.
        (elapsed_millis as f64 * self.rate_per_second / 1000.0) as u64
    }
}

impl Limiter for LeakyBucketLimiter {
    fn allow(&self, client_id: &str) -> bool {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();

        if now < state.last_update {
            warn!(
                now = now,
                last_update = state.last_update,
                "Clock moved backward, treating as no elapsed time"
            );
        }
        let elapsed = now.saturating_sub(state.last_update);
        let leaked = self.leaked_since(elapsed);
        state.last_update = state.last_update.max(now);
        state.level = state.level.saturating_add(leaked).min(self.capacity);

        let allowed = state.level > 0;
        if allowed {
            state.level -= 1;
        }
        let level = state.level;
        drop(state);

        trace!(
            client = %client_id,
            elapsed_millis = elapsed,
            leaked = leaked,
            level = level,
            allowed = allowed,
            "Checked leaky bucket"
        );
        if !allowed {
            debug!(client = %client_id, "Rate limit exceeded");
        }

        allowed
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::LeakyBucket
    }
}

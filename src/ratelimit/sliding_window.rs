//! Sliding window log.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::{default_clock, duration_millis, Clock};
use super::limiter::{Algorithm, Limiter};
use super::table::ClientTable;
use crate::error::{RatewardenError, Result};

/// Rate limiter keeping a rolling log of admission timestamps per client.
///
/// A request is admitted when fewer than `max_requests` of the client's
/// earlier admissions are at most `window` old. This gives an exact rolling
/// bound at the cost of one stored timestamp per admitted request until it
/// ages out.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window_millis: u64,
    logs: ClientTable<VecDeque<u64>>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting `max_requests` per client in any rolling `window`.
    pub fn new(max_requests: usize, window: Duration) -> Result<Self> {
        Self::with_clock(max_requests, window, default_clock())
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(
        max_requests: usize,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if max_requests == 0 {
            return Err(RatewardenError::not_positive("max_requests", max_requests));
        }
        let window_millis = duration_millis(window);
        if window_millis == 0 {
            return Err(RatewardenError::not_positive("window_size_millis", window_millis));
        }

        debug!(
            max_requests = max_requests,
            window_millis = window_millis,
            "Creating sliding window limiter"
        );

        Ok(Self {
            max_requests,
            window_millis,
            logs: ClientTable::new(),
            clock,
        })
    }

    /// Maximum admissions per client in any rolling window.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Length of the rolling window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_millis)
    }

    /// Admissions of the client that still count against its limit now.
    pub fn in_window(&self, client_id: &str) -> usize {
        let now = self.clock.now_millis();
        self.logs
            .inspect(client_id, |log| {
                log.iter()
                    .filter(|&&t| now.saturating_sub(t) <= self.window_millis)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of clients with a timestamp log.
    pub fn tracked_clients(&self) -> usize {
        self.logs.len()
    }

    /// Forget every client's history.
    pub fn clear(&self) {
        self.logs.clear();
    }
}

impl Limiter for SlidingWindowLimiter {
    fn allow(&self, client_id: &str) -> bool {
        let now = self.clock.now_millis();

        let (allowed, in_window) = self.logs.update(client_id, VecDeque::new, |log| {
            // Entries exactly `window` old still count.
            while let Some(&oldest) = log.front() {
                if now.saturating_sub(oldest) > self.window_millis {
                    log.pop_front();
                } else {
                    break;
                }
            }

            if log.len() < self.max_requests {
                log.push_back(now);
                (true, log.len())
            } else {
                (false, log.len())
            }
        });

        trace!(
            client = %client_id,
            in_window = in_window,
            limit = self.max_requests,
            allowed = allowed,
            "Checked sliding window"
        );
        if !allowed {
            debug!(client = %client_id, "Rate limit exceeded");
        }

        allowed
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;
    use rand::Rng;
    use std::sync::Barrier;

    fn limiter(max: usize, window_millis: u64) -> (SlidingWindowLimiter, ManualClock) {
        let clock = ManualClock::new(0);
        let limiter = SlidingWindowLimiter::with_clock(
            max,
            Duration::from_millis(window_millis),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        assert!(SlidingWindowLimiter::new(0, Duration::from_secs(30)).is_err());
        assert!(SlidingWindowLimiter::new(3, Duration::ZERO).is_err());
    }

    #[test]
    fn test_scenario_three_per_thirty_seconds() {
        let (limiter, clock) = limiter(3, 30_000);

        assert!(limiter.allow("client1"));
        assert!(limiter.allow("client1"));
        assert!(limiter.allow("client2"));
        assert!(limiter.allow("client1"));
        assert!(!limiter.allow("client1"));
        assert!(limiter.allow("client3"));

        clock.advance_millis(30_001);
        assert!(limiter.allow("client1"));

        assert_eq!(limiter.in_window("client2"), 0);
        assert_eq!(limiter.tracked_clients(), 3);
    }

    #[test]
    fn test_entry_exactly_window_old_still_counts() {
        let (limiter, clock) = limiter(1, 1000);

        assert!(limiter.allow("c1"));
        clock.set(1000);
        assert!(!limiter.allow("c1"));
        clock.set(1001);
        assert!(limiter.allow("c1"));
    }

    #[test]
    fn test_no_boundary_burst() {
        let (limiter, clock) = limiter(3, 1000);

        clock.set(900);
        assert!(limiter.allow("c1"));
        assert!(limiter.allow("c1"));
        assert!(limiter.allow("c1"));

        clock.set(1100);
        assert!(!limiter.allow("c1"));

        clock.set(1901);
        assert!(limiter.allow("c1"));
    }

    #[test]
    fn test_rejection_does_not_record() {
        let (limiter, clock) = limiter(2, 1000);

        assert!(limiter.allow("c1"));
        clock.set(500);
        assert!(limiter.allow("c1"));
        for _ in 0..5 {
            assert!(!limiter.allow("c1"));
        }
        assert_eq!(limiter.in_window("c1"), 2);

        // Only the admission at 0 has aged out.
        clock.set(1001);
        assert!(limiter.allow("c1"));
        assert!(!limiter.allow("c1"));
    }

    #[test]
    fn test_in_window_for_unknown_client() {
        let (limiter, _clock) = limiter(2, 1000);
        assert_eq!(limiter.in_window("nobody"), 0);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_clock_moving_backward_keeps_history() {
        let (limiter, clock) = limiter(1, 1000);

        clock.set(10_000);
        assert!(limiter.allow("c1"));
        clock.set(0);
        assert!(!limiter.allow("c1"));
    }

    #[test]
    fn test_random_timeline_respects_rolling_bound() {
        let max = 5;
        let window = 200;
        let (limiter, clock) = limiter(max, window);
        let mut rng = rand::thread_rng();

        let mut now = 0;
        let mut admitted = Vec::new();
        for _ in 0..2000 {
            now += rng.gen_range(0..20);
            clock.set(now);
            if limiter.allow("c1") {
                admitted.push(now);
            }
        }

        for &t in &admitted {
            let in_window = admitted
                .iter()
                .filter(|&&a| a <= t && t - a < window)
                .count();
            assert!(in_window <= max);
        }
    }

    #[test]
    fn test_concurrent_clients_are_independent() {
        let (limiter, _clock) = limiter(3, 60_000);
        let clients = ["a", "b", "c", "d"];
        let barrier = Barrier::new(clients.len() * 5);

        std::thread::scope(|s| {
            for client in clients {
                for _ in 0..5 {
                    let limiter = &limiter;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        limiter.allow(client);
                    });
                }
            }
        });

        for client in clients {
            assert_eq!(limiter.in_window(client), 3);
        }
    }
}

//! Fixed window counter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::{default_clock, duration_millis, Clock};
use super::limiter::{Algorithm, Limiter};
use super::table::ClientTable;
use crate::error::{RatewardenError, Result};

/// A client's counting window.
#[derive(Debug, Clone, Copy)]
struct Window {
    /// When the window opened, in clock milliseconds
    start: u64,
    /// Requests admitted in this window
    count: u64,
}

impl Window {
    fn starting_at(start: u64) -> Self {
        Self { start, count: 0 }
    }

    fn is_expired(&self, now: u64, window_millis: u64) -> bool {
        now.saturating_sub(self.start) >= window_millis
    }
}

/// Rate limiter counting each client's requests in discrete,
/// non-overlapping windows.
///
/// A client's window opens on its first request and lasts `window`. Once it
/// expires, the next request opens a fresh one. Because windows reset all at
/// once, a client can get up to `2 * max_requests` admissions in a short
/// burst that straddles a window boundary. Use [`SlidingWindowLimiter`] when
/// an exact rolling bound is needed.
///
/// [`SlidingWindowLimiter`]: super::SlidingWindowLimiter
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_requests: u64,
    window_millis: u64,
    windows: ClientTable<Window>,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    /// Create a limiter admitting `max_requests` per client per `window`.
    pub fn new(max_requests: u64, window: Duration) -> Result<Self> {
        Self::with_clock(max_requests, window, default_clock())
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(
        max_requests: u64,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if max_requests == 0 {
            return Err(RatewardenError::not_positive(
                "max_requests_per_window",
                max_requests,
            ));
        }
        let window_millis = duration_millis(window);
        if window_millis == 0 {
            return Err(RatewardenError::not_positive("window_size_millis", window_millis));
        }

        debug!(
            max_requests = max_requests,
            window_millis = window_millis,
            "Creating fixed window limiter"
        );

        Ok(Self {
            max_requests,
            window_millis,
            windows: ClientTable::new(),
            clock,
        })
    }

    /// Maximum admissions per client per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Length of a window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_millis)
    }

    /// Requests admitted in the client's current window.
    ///
    /// Returns `None` for a client that has never been seen and `Some(0)`
    /// when the client's last window has expired.
    pub fn window_count(&self, client_id: &str) -> Option<u64> {
        let now = self.clock.now_millis();
        self.windows.inspect(client_id, |window| {
            if window.is_expired(now, self.window_millis) {
                0
            } else {
                window.count
            }
        })
    }

    /// Number of clients with a window record.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Forget every client's window.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

impl Limiter for FixedWindowLimiter {
    fn allow(&self, client_id: &str) -> bool {
        let now = self.clock.now_millis();

        let (allowed, count) = self.windows.update(
            client_id,
            || Window::starting_at(now),
            |window| {
                if window.is_expired(now, self.window_millis) {
                    *window = Window::starting_at(now);
                }

                if window.count >= self.max_requests {
                    return (false, window.count);
                }

                window.count += 1;
                (true, window.count)
            },
        );

        trace!(
            client = %client_id,
            count = count,
            limit = self.max_requests,
            allowed = allowed,
            "Checked fixed window"
        );
        if !allowed {
            debug!(client = %client_id, "Rate limit exceeded");
        }

        allowed
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }
}

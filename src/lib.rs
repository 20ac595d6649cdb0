//! Ratewarden - In-process Rate Limiting
//!
//! This crate answers "is this request allowed right now?" for a client
//! identifier under one of four traffic shaping policies: fixed window,
//! sliding window log, leaky bucket and token bucket. Every limiter is safe
//! to share between threads and reads time through an injectable [`Clock`].
//!
//! ```
//! use ratewarden::{FixedWindowLimiter, Limiter};
//! use std::time::Duration;
//!
//! let limiter = FixedWindowLimiter::new(2, Duration::from_secs(1)).unwrap();
//! assert!(limiter.allow("c1"));
//! assert!(limiter.allow("c1"));
//! assert!(!limiter.allow("c1"));
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{RatewardenError, Result};
pub use ratelimit::{
    Algorithm, Clock, FixedWindowLimiter, LeakyBucketLimiter, Limiter, LimiterConfig,
    ManualClock, MonotonicClock, SlidingWindowLimiter, SystemClock, TokenBucketLimiter,
};

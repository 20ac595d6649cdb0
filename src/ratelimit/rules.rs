//! Limiter definitions loaded from configuration.
//!
//! A definition names the policy with an `algorithm` tag and carries that
//! policy's parameters:
//!
//! ```yaml
//! algorithm: token_bucket
//! capacity: 5
//! refill_period_millis: 1000
//! ```
//!
//! Limits are fixed once a limiter is built from a definition.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::clock::{default_clock, Clock};
use super::limiter::{Algorithm, Limiter};
use super::{FixedWindowLimiter, LeakyBucketLimiter, SlidingWindowLimiter, TokenBucketLimiter};
use crate::error::{RatewardenError, Result};

/// Definition of a single limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case", deny_unknown_fields)]
pub enum LimiterConfig {
    /// Per-client counter reset every window
    FixedWindow {
        max_requests_per_window: u64,
        window_size_millis: u64,
    },
    /// Per-client rolling log of admissions
    SlidingWindow {
        max_requests: usize,
        window_size_millis: u64,
    },
    /// Shared bucket draining at a constant rate
    LeakyBucket { capacity: u64, rate_per_second: f64 },
    /// Shared bucket gaining one token per refill period
    TokenBucket {
        capacity: u64,
        refill_period_millis: u64,
    },
}

impl LimiterConfig {
    /// Load a definition from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LimiterConfig = serde_yaml::from_str(yaml).map_err(|e| {
            RatewardenError::Config(format!("Failed to parse limiter config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The policy this definition builds.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            LimiterConfig::FixedWindow { .. } => Algorithm::FixedWindow,
            LimiterConfig::SlidingWindow { .. } => Algorithm::SlidingWindow,
            LimiterConfig::LeakyBucket { .. } => Algorithm::LeakyBucket,
            LimiterConfig::TokenBucket { .. } => Algorithm::TokenBucket,
        }
    }

    /// Check that every parameter is strictly positive.
    pub fn validate(&self) -> Result<()> {
        match *self {
            LimiterConfig::FixedWindow {
                max_requests_per_window,
                window_size_millis,
            } => {
                positive("max_requests_per_window", max_requests_per_window)?;
                positive("window_size_millis", window_size_millis)
            }
            LimiterConfig::SlidingWindow {
                max_requests,
                window_size_millis,
            } => {
                positive("max_requests", max_requests as u64)?;
                positive("window_size_millis", window_size_millis)
            }
            LimiterConfig::LeakyBucket {
                capacity,
                rate_per_second,
            } => {
                positive("capacity", capacity)?;
                if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
                    return Err(RatewardenError::not_positive("rate_per_second", rate_per_second));
                }
                Ok(())
            }
            LimiterConfig::TokenBucket {
                capacity,
                refill_period_millis,
            } => {
                positive("capacity", capacity)?;
                positive("refill_period_millis", refill_period_millis)
            }
        }
    }

    /// Build the limiter on the default monotonic clock.
    pub fn build(&self) -> Result<Box<dyn Limiter>> {
        self.build_with_clock(default_clock())
    }

    /// Build the limiter reading time from `clock`.
    pub fn build_with_clock(&self, clock: Arc<dyn Clock>) -> Result<Box<dyn Limiter>> {
        let limiter: Box<dyn Limiter> = match *self {
            LimiterConfig::FixedWindow {
                max_requests_per_window,
                window_size_millis,
            } => Box::new(FixedWindowLimiter::with_clock(
                max_requests_per_window,
                Duration::from_millis(window_size_millis),
                clock,
            )?),
            LimiterConfig::SlidingWindow {
                max_requests,
                window_size_millis,
            } => Box::new(SlidingWindowLimiter::with_clock(
                max_requests,
                Duration::from_millis(window_size_millis),
                clock,
            )?),
            LimiterConfig::LeakyBucket {
                capacity,
                rate_per_second,
            } => Box::new(LeakyBucketLimiter::with_clock(capacity, rate_per_second, clock)?),
            LimiterConfig::TokenBucket {
                capacity,
                refill_period_millis,
            } => Box::new(TokenBucketLimiter::with_clock(
                capacity,
                Duration::from_millis(refill_period_millis),
                clock,
            )?),
        };
        Ok(limiter)
    }
}

fn positive(parameter: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(RatewardenError::not_positive(parameter, value));
    }
    Ok(())
}

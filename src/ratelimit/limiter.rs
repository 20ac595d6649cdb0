//! The admission contract shared by every rate limiting policy.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The traffic shaping policy behind a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Counts requests per client in discrete, non-overlapping windows
    FixedWindow,
    /// Keeps a rolling log of admission timestamps per client
    SlidingWindow,
    /// Shared bucket draining at a constant rate
    LeakyBucket,
    /// Shared bucket refilled with tokens at a constant rate
    TokenBucket,
}

impl Algorithm {
    /// The snake_case name used in configuration files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::LeakyBucket => "leaky_bucket",
            Algorithm::TokenBucket => "token_bucket",
        }
    }

    /// Whether the policy keeps independent state for each client.
    pub fn is_per_client(&self) -> bool {
        matches!(self, Algorithm::FixedWindow | Algorithm::SlidingWindow)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for rate limiter implementations.
///
/// `allow` checks the budget and, when the request is admitted, records its
/// cost in the same atomic step. A rejected request leaves no trace other
/// than lazily created empty state or purged history. Rejection is a normal
/// answer, never an error.
pub trait Limiter: Send + Sync {
    /// Decide whether a request from `client_id` is admitted right now.
    fn allow(&self, client_id: &str) -> bool;

    /// The policy implemented by this limiter.
    fn algorithm(&self) -> Algorithm;
}

impl<L: Limiter + ?Sized> Limiter for Box<L> {
    fn allow(&self, client_id: &str) -> bool {
        (**self).allow(client_id)
    }

    fn algorithm(&self) -> Algorithm {
        (**self).algorithm()
    }
}

impl<L: Limiter + ?Sized> Limiter for Arc<L> {
    fn allow(&self, client_id: &str) -> bool {
        (**self).allow(client_id)
    }

    fn algorithm(&self) -> Algorithm {
        (**self).algorithm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAllow;

    impl Limiter for AlwaysAllow {
        fn allow(&self, _client_id: &str) -> bool {
            true
        }

        fn algorithm(&self) -> Algorithm {
            Algorithm::TokenBucket
        }
    }

    #[test]
    fn test_algorithm_display() {
        assert_eq!(Algorithm::FixedWindow.to_string(), "fixed_window");
        assert_eq!(Algorithm::SlidingWindow.to_string(), "sliding_window");
        assert_eq!(Algorithm::LeakyBucket.to_string(), "leaky_bucket");
        assert_eq!(Algorithm::TokenBucket.to_string(), "token_bucket");
    }

    #[test]
    fn test_per_client_algorithms() {
        assert!(Algorithm::FixedWindow.is_per_client());
        assert!(Algorithm::SlidingWindow.is_per_client());
        assert!(!Algorithm::LeakyBucket.is_per_client());
        assert!(!Algorithm::TokenBucket.is_per_client());
    }

    #[test]
    fn test_boxed_and_shared_limiters_delegate() {
        let boxed: Box<dyn Limiter> = Box::new(AlwaysAllow);
        assert!(boxed.allow("client"));
        assert_eq!(boxed.algorithm(), Algorithm::TokenBucket);

        let shared: Arc<dyn Limiter> = Arc::new(AlwaysAllow);
        assert!(shared.allow("client"));
        assert_eq!(shared.algorithm(), Algorithm::TokenBucket);
    }
}

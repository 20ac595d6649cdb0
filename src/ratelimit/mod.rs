//! Rate limiting policies and their shared state management.

mod clock;
mod fixed_window;
mod leaky_bucket;
mod limiter;
mod rules;
mod sliding_window;
mod table;
mod token_bucket;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use fixed_window::FixedWindowLimiter;
pub use leaky_bucket::LeakyBucketLimiter;
pub use limiter::{Algorithm, Limiter};
pub use rules::LimiterConfig;
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

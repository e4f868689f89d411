pub mod analytics;
pub mod config;
pub mod error;
pub mod limiter;
pub mod utils;

pub use error::{LimiterError, Result};
pub use limiter::{ConsumeStrategy, LimiterConfig, RateLimiter, TokenBucketLimiter};

//! Rate limiting built on the cache contract

mod limiter;

pub use limiter::RateLimiter;

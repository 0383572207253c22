//! Infrastructure layer - Cache backends and the utilities built on them

pub mod cache;
pub mod logging;
pub mod rate_limit;
pub mod verification;

pub use cache::{CacheConfig, CacheFactory, CacheType, DiskCache, RedisCache};
pub use logging::init_logging;
pub use rate_limit::RateLimiter;
pub use verification::{CodeGenerator, RandomCodeGenerator, VerificationCode};

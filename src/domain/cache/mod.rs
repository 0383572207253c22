//! Cache domain - Storage-agnostic caching contract

mod key;
mod record;
mod repository;
mod value;

pub use key::KeyPrefix;
pub use record::{CacheRecord, FOREVER};
pub use repository::Cache;
pub(crate) use repository::coerce;
pub use value::{CacheValue, Number};

#[cfg(test)]
pub use repository::mock::MockCache;

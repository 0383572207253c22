//! Domain layer - Cache contract, values and errors

pub mod cache;
pub mod error;

pub use cache::{Cache, CacheRecord, CacheValue, KeyPrefix, Number, FOREVER};
pub use error::CacheError;

//! Key namespacing shared by all backends

use sha2::{Digest, Sha256};

/// Namespace applied to every key a backend instance touches.
///
/// Independent caches sharing one physical store use different prefixes so
/// their entries never collide. The prefix is fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `prefix-key`, or the bare key when no prefix is configured
    pub fn apply(&self, key: &str) -> String {
        if self.0.is_empty() {
            key.to_string()
        } else {
            format!("{}-{}", self.0, key)
        }
    }

    /// Hex SHA-256 of `prefix-key`; always 64 filesystem-safe characters
    pub fn digest(&self, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}-{}", self.0, key).as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl From<&str> for KeyPrefix {
    fn from(prefix: &str) -> Self {
        Self::new(prefix)
    }
}

impl From<String> for KeyPrefix {
    fn from(prefix: String) -> Self {
        Self(prefix)
    }
}

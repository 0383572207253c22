use thiserror::Error;

/// Errors surfaced by cache backends and the utilities built on them.
///
/// A missing or expired key is never an error: lookups report absence through
/// `Option`/`bool`. These variants cover storage that could not be reached or
/// data that could not be produced.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Disk error: {message}")]
    Io { message: String },

    #[error("Remote store error: {message}")]
    Remote { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Code generation error: {message}")]
    Generation { message: String },
}

impl CacheError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::remote(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

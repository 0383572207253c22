//! Random code generation
//!
//! Draws codes from the operating system's random source.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::domain::CacheError;

#[cfg(test)]
use mockall::automock;

/// Digits used for numeric verification codes
pub const NUMERIC_CHARSET: &str = "0123456789";

/// Source of random codes
#[cfg_attr(test, automock)]
pub trait CodeGenerator: Send + Sync {
    /// Returns a code of exactly `length` characters
    fn generate(&self, length: usize) -> Result<String, CodeGenError>;
}

/// Failure to produce a code
#[derive(Debug, thiserror::Error)]
pub enum CodeGenError {
    #[error("Code length must be greater than zero")]
    EmptyLength,

    #[error("Charset must contain between 1 and 256 ASCII characters")]
    InvalidCharset,

    #[error("Random source failed: {0}")]
    Source(String),
}

impl From<CodeGenError> for CacheError {
    fn from(err: CodeGenError) -> Self {
        CacheError::generation(err.to_string())
    }
}

/// Generator for codes over a fixed ASCII charset
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    charset: Vec<u8>,
}

impl RandomCodeGenerator {
    pub fn new(charset: impl Into<String>) -> Self {
        Self {
            charset: charset.into().into_bytes(),
        }
    }

    /// Generator for digit-only codes
    pub fn numeric() -> Self {
        Self::new(NUMERIC_CHARSET)
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::numeric()
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> Result<String, CodeGenError> {
        if length == 0 {
            return Err(CodeGenError::EmptyLength);
        }
        if self.charset.is_empty() || self.charset.len() > 256 || !self.charset.is_ascii() {
            return Err(CodeGenError::InvalidCharset);
        }

        // Bytes at or above `limit` are rejected so every symbol is equally likely
        let symbols = self.charset.len();
        let limit = 256 - (256 % symbols);

        let mut code = String::with_capacity(length);
        let mut buf = vec![0u8; length.max(16)];

        while code.len() < length {
            OsRng
                .try_fill_bytes(&mut buf)
                .map_err(|e| CodeGenError::Source(e.to_string()))?;

            for &byte in &buf {
                if (byte as usize) < limit {
                    code.push(self.charset[byte as usize % symbols] as char);
                    if code.len() == length {
                        break;
                    }
                }
            }
        }

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_code() {
        let generator = RandomCodeGenerator::numeric();
        let code = generator.generate(5).unwrap();

        assert_eq!(code.len(), 5);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_long_code() {
        let generator = RandomCodeGenerator::default();
        let code = generator.generate(64).unwrap();
        assert_eq!(code.len(), 64);
    }

    #[test]
    fn test_custom_charset() {
        let generator = RandomCodeGenerator::new("AB");
        let code = generator.generate(32).unwrap();

        assert!(code.chars().all(|c| c == 'A' || c == 'B'));
    }

    #[test]
    fn test_codes_differ() {
        let generator = RandomCodeGenerator::numeric();
        assert_ne!(generator.generate(20).unwrap(), generator.generate(20).unwrap());
    }

    #[test]
    fn test_zero_length_rejected() {
        let generator = RandomCodeGenerator::numeric();
        assert!(matches!(generator.generate(0), Err(CodeGenError::EmptyLength)));
    }

    #[test]
    fn test_invalid_charset_rejected() {
        assert!(matches!(
            RandomCodeGenerator::new("").generate(4),
            Err(CodeGenError::InvalidCharset)
        ));
        assert!(matches!(
            RandomCodeGenerator::new("äö").generate(4),
            Err(CodeGenError::InvalidCharset)
        ));
    }

    #[test]
    fn test_error_converts_to_cache_error() {
        let error: CacheError = CodeGenError::Source("entropy".to_string()).into();
        assert!(matches!(error, CacheError::Generation { .. }));
    }
}

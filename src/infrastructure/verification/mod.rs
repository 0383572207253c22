//! Verification codes built on the cache contract

mod code;
mod generator;

pub use code::{VerificationCode, DEFAULT_CODE_LENGTH};
pub use generator::{CodeGenError, CodeGenerator, RandomCodeGenerator, NUMERIC_CHARSET};

#[cfg(test)]
pub use generator::MockCodeGenerator;

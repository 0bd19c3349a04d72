//! Defines the error type for token decoding.
use thiserror::Error;

/// Why a token failed to decode. Every variant is fatal to the decode call;
/// no partial token is ever returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Bad prefix, bad base64, or bytes that frame correctly but cannot form
    /// a valid token (trailing data, duplicate entries, size limits).
    #[error("Malformed token: {0}")]
    Malformed(String),
    #[error("Unsupported token version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("Truncated token: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated { offset: usize, needed: usize, available: usize },
    #[error("Unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("Dataset ref {index} out of bounds for {count} datasets")]
    InvalidReference { index: u16, count: usize },
    /// Unknown value type, a length that disagrees with the type's width, or
    /// an unrepresentable value such as a zero denominator.
    #[error("Invalid constant encoding: value type {value_type:#04x} with {length} bytes")]
    InvalidConstantEncoding { value_type: u8, length: u8 },
}

impl FormatError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

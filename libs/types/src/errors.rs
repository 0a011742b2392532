//! Error types shared by the protocol type library
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Parsing errors for hex-encoded identities.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Amount arithmetic errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("Amount must be non-negative: {0}")]
    Negative(String),

    #[error("Amount must be a whole number of base units: {0}")]
    Fractional(String),

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Arithmetic underflow: {lhs} - {rhs}")]
    Underflow { lhs: String, rhs: String },

    #[error("Division by zero")]
    DivisionByZero,
}

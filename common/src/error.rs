//! Error types for the rate model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::currency::CurrencyCode;

/// Errors raised while building rate model values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    /// A snapshot had no rows to build a table from.
    #[error("Snapshot contains no rates")]
    EmptySnapshot,

    /// A currency code was not three ASCII letters.
    #[error("Invalid currency code: {0}")]
    InvalidCurrencyCode(String),

    /// A date string did not match any accepted spelling.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// A converted amount does not fit in a decimal.
    #[error("Converting {amount} {from} to {to} overflows")]
    ConversionOverflow {
        amount: Decimal,
        from: CurrencyCode,
        to: CurrencyCode,
    },
}

impl RateError {
    /// Get error code for log fields.
    pub fn error_code(&self) -> &'static str {
        match self {
            RateError::EmptySnapshot => "EMPTY_SNAPSHOT",
            RateError::InvalidCurrencyCode(_) => "INVALID_CURRENCY_CODE",
            RateError::InvalidDate(_) => "INVALID_DATE",
            RateError::ConversionOverflow { .. } => "CONVERSION_OVERFLOW",
        }
    }
}

/// Result type alias for rate model operations.
pub type Result<T> = std::result::Result<T, RateError>;

//! Rate source error types.

use ratefeed_common::RateError;
use thiserror::Error;

/// Errors a rate source can fail with.
///
/// Every variant is recoverable: the orchestrator moves on to the next
/// source, so none of these ever reaches callers of a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source answered but had no usable data.
    #[error("No rates available: {0}")]
    NotFound(String),

    /// The source could not be reached or the transfer failed.
    #[error("Network error: {0}")]
    Network(String),

    /// The source returned a payload that could not be understood.
    #[error("Malformed payload: {0}")]
    Parse(String),
}

impl SourceError {
    /// Get error kind for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::NotFound(_) => "NOT_FOUND",
            SourceError::Network(_) => "NETWORK",
            SourceError::Parse(_) => "PARSE",
        }
    }

    /// Check if retrying the same source later could help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Network(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Parse(e.to_string())
        } else if e.is_timeout() {
            SourceError::Network(format!("request timed out: {e}"))
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

impl From<roxmltree::Error> for SourceError {
    fn from(e: roxmltree::Error) -> Self {
        SourceError::Parse(format!("invalid XML: {e}"))
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Parse(format!("invalid JSON: {e}"))
    }
}

impl From<RateError> for SourceError {
    fn from(e: RateError) -> Self {
        match e {
            RateError::EmptySnapshot => SourceError::NotFound(e.to_string()),
            RateError::InvalidCurrencyCode(_) | RateError::InvalidDate(_) => {
                SourceError::Parse(e.to_string())
            }
        }
    }
}

/// Result type for rate source operations.
pub type SourceResult<T> = Result<T, SourceError>;

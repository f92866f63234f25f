//! Error types for windowgate.

use thiserror::Error;

/// Main error type for windowgate operations.
#[derive(Error, Debug)]
pub enum WindowGateError {
    /// Invalid limiter or process configuration. Not retryable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The quota for the current window is exhausted.
    #[error("Too many requests for {resource}:{client} (count {count}, limit {limit})")]
    TooManyRequests {
        resource: String,
        client: String,
        limit: u64,
        count: u64,
    },

    /// Shared counter store errors, passed through untouched
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The store answered with something that is not a valid counter value
    #[error("Unexpected store response: {0}")]
    UnexpectedResponse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WindowGateError {
    /// Whether this error is a quota denial rather than an infrastructure failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, WindowGateError::TooManyRequests { .. })
    }
}

/// Result type alias for windowgate operations.
pub type Result<T> = std::result::Result<T, WindowGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_distinguishable() {
        let denied = WindowGateError::TooManyRequests {
            resource: "api".to_string(),
            client: "alice".to_string(),
            limit: 1,
            count: 2,
        };
        assert!(denied.is_rate_limited());
        assert_eq!(
            denied.to_string(),
            "Too many requests for api:alice (count 2, limit 1)"
        );

        let broken = WindowGateError::UnexpectedResponse("nil".to_string());
        assert!(!broken.is_rate_limited());
    }
}

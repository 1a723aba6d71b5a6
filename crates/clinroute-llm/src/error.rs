//! Error types for clinroute-llm

use clinroute_core::BreakerOutcome;
use thiserror::Error;

/// LLM routing error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Provider not configured (missing credentials or unknown name)
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// Malformed routing or provider configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Network or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Vendor returned a non-2xx status
    #[error("api error (status {status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Truncated, key-redacted response body
        body: String,
    },

    /// Response body could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Circuit breaker rejected the call without a network attempt
    #[error("circuit open for {provider} (retry after {retry_after_ms}ms)")]
    CircuitOpen {
        /// Provider whose breaker is open
        provider: String,
        /// Milliseconds until a probe is admitted
        retry_after_ms: u64,
    },

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// Overall routing budget exceeded
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Provider answered with a failure response
    #[error("{provider} failed: {message}")]
    ProviderFailed {
        /// Provider name
        provider: String,
        /// Error carried by the failure response
        message: String,
    },
}

impl BreakerOutcome for Error {
    fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cancellation_is_classified_as_cancellation() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(!Error::Timeout(100).is_cancellation());
        assert!(!Error::Api {
            status: 429,
            body: String::new()
        }
        .is_cancellation());
    }

    #[test]
    fn test_api_error_display_embeds_status_and_body() {
        let err = Error::Api {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "api error (status 503): overloaded");
    }
}

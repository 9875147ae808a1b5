//! Error types for the Alpaca integration.

use thiserror::Error;

/// Errors that can occur when talking to Alpaca.
#[derive(Debug, Error)]
pub enum AlpacaError {
    /// Missing or rejected credentials.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Non-success HTTP status.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Response body.
        message: String,
    },

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout: {0}")]
    Timeout(String),

    /// The response parsed but did not carry the requested item.
    #[error("not found: {0}")]
    NotFound(String),

    /// Symbol rejected before any request was made.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AlpacaError {
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    pub fn rate_limit(retry_after_secs: u64) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    /// True for an HTTP 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Api {
                status_code: 404,
                ..
            }
        )
    }

    /// Returns true if a later cycle may succeed without intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AlpacaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AlpacaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rust_decimal::Error> for AlpacaError {
    fn from(err: rust_decimal::Error) -> Self {
        Self::Serialization(format!("invalid decimal: {err}"))
    }
}

/// Result type alias for Alpaca operations.
pub type Result<T> = std::result::Result<T, AlpacaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = AlpacaError::api(403, "forbidden");
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("forbidden"));
    }

    #[test]
    fn test_not_found_detection() {
        assert!(AlpacaError::api(404, "position does not exist").is_not_found());
        assert!(!AlpacaError::api(500, "oops").is_not_found());
        assert!(!AlpacaError::NotFound("snapshot".to_string()).is_not_found());
    }

    #[test]
    fn test_transient_classification() {
        assert!(AlpacaError::Network("reset".to_string()).is_transient());
        assert!(AlpacaError::rate_limit(30).is_transient());
        assert!(AlpacaError::api(503, "unavailable").is_transient());
        assert!(!AlpacaError::api(401, "unauthorized").is_transient());
        assert!(!AlpacaError::Configuration("missing key".to_string()).is_transient());
    }
}

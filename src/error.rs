//! Error types for the weatherdeck session layer.

use thiserror::Error;

use crate::models::View;

/// Provider error code that denotes request throttling.
pub const RATE_LIMIT_CODE: i64 = 104;

/// Classified outcome of a failed fetch. The kind is fixed once at the point
/// of classification and never re-derived from message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failed before the provider produced a response.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The provider answered with a structured error envelope.
    #[error("API error: {info}")]
    Provider { code: i64, info: String },

    /// Non-success response carrying no structured envelope.
    #[error("Failed to fetch {view} data")]
    UnexpectedResponse { view: View },
}

impl FetchError {
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn provider<S: Into<String>>(code: i64, info: S) -> Self {
        Self::Provider {
            code,
            info: info.into(),
        }
    }

    /// True when the provider envelope carried the throttling code.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::Provider { code, .. } if *code == RATE_LIMIT_CODE)
    }
}

/// Main error type for the weatherdeck application surface.
#[derive(Error, Debug)]
pub enum WeatherdeckError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// HTTP client construction or plumbing errors
    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// A classified fetch failure
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl WeatherdeckError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_tagging() {
        let throttled = FetchError::provider(RATE_LIMIT_CODE, "usage limit reached");
        assert!(throttled.is_rate_limited());

        let other = FetchError::provider(615, "invalid query");
        assert!(!other.is_rate_limited());

        let network = FetchError::network("connection refused");
        assert!(!network.is_rate_limited());
    }

    #[test]
    fn test_error_messages() {
        let network = FetchError::network("connection reset");
        assert_eq!(network.to_string(), "Network error: connection reset");

        let provider = FetchError::provider(RATE_LIMIT_CODE, "monthly quota exceeded");
        assert_eq!(provider.to_string(), "API error: monthly quota exceeded");

        let unexpected = FetchError::UnexpectedResponse { view: View::Marine };
        assert_eq!(unexpected.to_string(), "Failed to fetch marine data");
    }

    #[test]
    fn test_config_error_creation() {
        let err = WeatherdeckError::config("missing base URL");
        assert!(matches!(err, WeatherdeckError::Config { .. }));
        assert!(err.to_string().contains("missing base URL"));
    }
}

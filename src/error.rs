//! Error types for the Flux MCP server.
//!
//! This module provides a unified error hierarchy using `thiserror`.
//!
//! # Error Categories
//!
//! - `ConfigError`: Missing configuration
//! - `Error::Api`: Flux API errors (includes endpoint and HTTP status)
//! - `Error::Validation`: Input validation failures

use thiserror::Error;

/// Unified error type for the Flux MCP server.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (missing env vars, invalid values)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// API errors with endpoint and HTTP status context
    ///
    /// Includes the API endpoint that failed, HTTP status code, and error message
    /// for debugging and user feedback. A status code of 0 indicates a transport
    /// failure before any HTTP response was received.
    #[error("API error for {endpoint} (HTTP {status_code}): {message}")]
    Api {
        /// The API endpoint that was called
        endpoint: String,
        /// HTTP status code returned by the API (0 for transport failures)
        status_code: u16,
        /// Error message from the API or describing the failure
        message: String,
    },

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Create a new API error with endpoint, status code, and message.
    pub fn api(endpoint: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Error::Api {
            endpoint: endpoint.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Create a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Whether this error came from the upstream call (transport or HTTP layer).
    ///
    /// Upstream failures are reported to the MCP caller as a tool-level error
    /// result rather than a protocol fault.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Api { .. })
    }
}

/// Configuration errors.
///
/// These errors occur when loading or validating configuration from
/// environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Required environment variable {0} is not set")]
    MissingEnvVar(String),
}

/// Result type alias using the unified Error type.
pub type Result<T> = std::result::Result<T, Error>;

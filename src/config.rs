//! Configuration module for loading environment variables and settings.

use crate::error::ConfigError;

/// Default base URL for the Flux API.
pub const DEFAULT_BASE_URL: &str = "https://api.bfl.ai";

/// Default number of past generations kept in memory.
pub const DEFAULT_HISTORY_SIZE: usize = 5;

/// Default upstream request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Flux API bearer token (required)
    pub api_key: String,
    /// Base URL of the Flux API
    pub base_url: String,
    /// Number of past generations kept in memory
    pub history_size: usize,
    /// Upstream request timeout in seconds
    pub request_timeout_secs: u64,
    /// HTTP server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables and .env file.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingEnvVar` if BFL_API_KEY is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_key = std::env::var("BFL_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("BFL_API_KEY".to_string()))?;

        let base_url = std::env::var("FLUX_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let history_size = std::env::var("FLUX_HISTORY_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_HISTORY_SIZE);

        let request_timeout_secs = std::env::var("FLUX_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            api_key,
            base_url,
            history_size,
            request_timeout_secs,
            port,
        })
    }

    /// Get the image generation endpoint URL.
    pub fn generation_endpoint(&self) -> String {
        format!("{}/v1/images/generations", self.base_url)
    }
}

//! Image generation handler for the Flux MCP server.
//!
//! This module provides the `FluxHandler` struct and parameter types for
//! text-to-image generation using the Black Forest Labs Flux API.

use crate::config::Config;
use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Model identifier sent with every generation request.
pub const FLUX_MODEL: &str = "flux-1.1-pro-ultra";

/// Valid aspect ratios for image generation.
pub const VALID_ASPECT_RATIOS: &[&str] = &[
    "21:9", "16:9", "3:2", "4:3", "5:4", "1:1", "4:5", "3:4", "2:3", "9:16", "9:21",
];

/// Valid output formats.
pub const VALID_OUTPUT_FORMATS: &[&str] = &["jpg", "png"];

/// Valid response formats.
pub const VALID_RESPONSE_FORMATS: &[&str] = &["url", "b64_json"];

/// Minimum safety tolerance (most strict).
pub const MIN_SAFETY_TOLERANCE: i64 = 1;

/// Maximum safety tolerance (least strict).
pub const MAX_SAFETY_TOLERANCE: i64 = 6;

/// Text-to-image generation parameters.
///
/// These parameters control the image generation process via the Flux API.
/// Absent optional fields are omitted from the upstream request so the API
/// applies its own defaults.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct FluxGenerateParams {
    /// Text prompt describing the image to generate.
    pub prompt: String,

    /// URL of an image to use as a visual prompt for the generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,

    /// Blend strength between the prompt and the image prompt (0.0-1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt_strength: Option<f64>,

    /// Aspect ratio for the generated image.
    /// Valid values: "21:9", "16:9", "3:2", "4:3", "5:4", "1:1", "4:5",
    /// "3:4", "2:3", "9:16", "9:21".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,

    /// Moderation tolerance, 1 (most strict) to 6 (least strict).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_tolerance: Option<i64>,

    /// Random seed for reproducible generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Output image format: "jpg" or "png".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    /// Generate less processed, more natural-looking images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<bool>,

    /// How the generated image is returned: "url" or "b64_json".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
}

/// Validation error details for generation parameters.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl FluxGenerateParams {
    /// Validate the parameters against the API constraints.
    ///
    /// # Returns
    /// - `Ok(())` if all parameters are valid
    /// - `Err(Vec<ValidationError>)` with all validation errors
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.prompt.trim().is_empty() {
            errors.push(ValidationError {
                field: "prompt".to_string(),
                message: "Prompt cannot be empty".to_string(),
            });
        }

        if let Some(strength) = self.image_prompt_strength {
            if !(0.0..=1.0).contains(&strength) {
                errors.push(ValidationError {
                    field: "image_prompt_strength".to_string(),
                    message: format!(
                        "image_prompt_strength must be between 0 and 1, got {}",
                        strength
                    ),
                });
            }
        }

        if let Some(ratio) = &self.aspect_ratio {
            if !VALID_ASPECT_RATIOS.contains(&ratio.as_str()) {
                errors.push(ValidationError {
                    field: "aspect_ratio".to_string(),
                    message: format!(
                        "Invalid aspect ratio '{}'. Valid options: {}",
                        ratio,
                        VALID_ASPECT_RATIOS.join(", ")
                    ),
                });
            }
        }

        if let Some(tolerance) = self.safety_tolerance {
            if !(MIN_SAFETY_TOLERANCE..=MAX_SAFETY_TOLERANCE).contains(&tolerance) {
                errors.push(ValidationError {
                    field: "safety_tolerance".to_string(),
                    message: format!(
                        "safety_tolerance must be between {} and {}, got {}",
                        MIN_SAFETY_TOLERANCE, MAX_SAFETY_TOLERANCE, tolerance
                    ),
                });
            }
        }

        if let Some(format) = &self.output_format {
            if !VALID_OUTPUT_FORMATS.contains(&format.as_str()) {
                errors.push(ValidationError {
                    field: "output_format".to_string(),
                    message: format!(
                        "Invalid output format '{}'. Valid options: {}",
                        format,
                        VALID_OUTPUT_FORMATS.join(", ")
                    ),
                });
            }
        }

        if let Some(format) = &self.response_format {
            if !VALID_RESPONSE_FORMATS.contains(&format.as_str()) {
                errors.push(ValidationError {
                    field: "response_format".to_string(),
                    message: format!(
                        "Invalid response format '{}'. Valid options: {}",
                        format,
                        VALID_RESPONSE_FORMATS.join(", ")
                    ),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Serialize the validated parameters into form-urlencoded key/value pairs.
    ///
    /// The model identifier and prompt are always present; optional fields are
    /// emitted in declaration order only when set. Same input always yields the
    /// same ordering and content.
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("model", FLUX_MODEL.to_string()),
            ("prompt", self.prompt.clone()),
        ];

        if let Some(image_prompt) = &self.image_prompt {
            form.push(("image_prompt", image_prompt.clone()));
        }
        if let Some(strength) = self.image_prompt_strength {
            form.push(("image_prompt_strength", strength.to_string()));
        }
        if let Some(ratio) = &self.aspect_ratio {
            form.push(("aspect_ratio", ratio.clone()));
        }
        if let Some(tolerance) = self.safety_tolerance {
            form.push(("safety_tolerance", tolerance.to_string()));
        }
        if let Some(seed) = self.seed {
            form.push(("seed", seed.to_string()));
        }
        if let Some(format) = &self.output_format {
            form.push(("output_format", format.clone()));
        }
        if let Some(raw) = self.raw {
            form.push(("raw", raw.to_string()));
        }
        if let Some(format) = &self.response_format {
            form.push(("response_format", format.clone()));
        }

        form
    }
}

/// Extract a human-readable message from an upstream error body.
///
/// The Flux API returns structured JSON errors in a few shapes; fall back to
/// the raw body when none match.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    if let Some(message) = value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        return Some(message.to_string());
    }
    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
        return Some(message.to_string());
    }
    if let Some(message) = value.get("detail").and_then(|d| d.as_str()) {
        return Some(message.to_string());
    }
    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }

    None
}

/// Image generation handler.
///
/// Handles image generation requests against the Flux API.
pub struct FluxHandler {
    /// Application configuration.
    pub config: Config,
    /// HTTP client for API requests.
    pub http: reqwest::Client,
}

impl FluxHandler {
    /// Create a new FluxHandler with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, Error> {
        debug!("Initializing FluxHandler");

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::api(config.base_url.clone(), 0, e.to_string()))?;

        Ok(Self { config, http })
    }

    /// Generate an image from a text prompt.
    ///
    /// # Arguments
    /// * `params` - Generation parameters
    ///
    /// # Returns
    /// * `Ok(serde_json::Value)` - The upstream response payload, passed through opaquely
    /// * `Err(Error)` - `Validation` if the parameters are invalid, `Api` if the
    ///   upstream call fails at the transport or HTTP layer
    #[instrument(level = "info", name = "generate_image", skip(self, params), fields(prompt = %params.prompt))]
    pub async fn generate(&self, params: &FluxGenerateParams) -> Result<serde_json::Value, Error> {
        params.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            Error::validation(messages.join("; "))
        })?;

        let endpoint = self.config.generation_endpoint();
        let form = params.to_form();
        debug!(endpoint = %endpoint, "Calling Flux API");

        let response = self
            .http
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::api(&endpoint, 0, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body).unwrap_or_else(|| {
                if body.is_empty() {
                    status.to_string()
                } else {
                    body
                }
            });
            return Err(Error::api(&endpoint, status.as_u16(), message));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            Error::api(&endpoint, status.as_u16(), format!("Failed to parse response: {}", e))
        })?;

        info!("Received generation result from Flux API");
        Ok(payload)
    }
}

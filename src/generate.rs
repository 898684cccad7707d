//! Image generation provider abstraction and implementations.
//!
//! Defines the [`ImageProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — never generates; top-N items resolve as `pending`.
//! - **[`StubProvider`]** — returns a small valid PNG without any network call;
//!   used for offline development and the integration tests.
//! - **[`OpenAiProvider`]** — calls the OpenAI image generation API.
//!
//! A provider performs exactly one generation attempt per call. Retry and
//! backoff live in the asset store, driven by the error classification
//! returned here:
//!
//! - [`GenerateError::Transient`] — rate limits (HTTP 429), server errors
//!   (5xx), network failures. Worth retrying.
//! - [`GenerateError::Permanent`] — content policy rejections and other
//!   client errors (4xx). Retrying within the run cannot help.

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Duration;
use thiserror::Error;

use crate::config::ImageConfig;

/// Provider error, classified so callers can decide whether to retry.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Plausibly transient condition (rate limit, server error, network).
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Permanent rejection (content policy, malformed prompt).
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

/// One image generation backend.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Provider identifier for logs and summaries.
    fn name(&self) -> &str;

    /// Whether this provider can generate at all. The asset store resolves
    /// items as `pending` without an attempt when this is false.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Perform a single generation attempt for `prompt`, returning the
    /// raw image bytes on success.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, GenerateError>;
}

/// Create the appropriate [`ImageProvider`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or when the OpenAI provider
/// is selected without an `OPENAI_API_KEY` in the environment.
pub fn create_provider(config: &ImageConfig) -> Result<Box<dyn ImageProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "stub" => Ok(Box::new(StubProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        other => bail!(
            "Unknown image provider: '{}'. Must be disabled, stub, or openai.",
            other
        ),
    }
}

// ============ Disabled Provider ============

/// A no-op provider used when image generation is not configured.
pub struct DisabledProvider;

#[async_trait]
impl ImageProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, GenerateError> {
        Err(GenerateError::Transient(
            "image provider is disabled".to_string(),
        ))
    }
}

// ============ Stub Provider ============

/// 1x1 transparent PNG, base64-encoded. Small but structurally valid, so it
/// passes the asset store's magic-byte check.
const STUB_PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Deterministic local provider: every prompt yields the same tiny PNG.
///
/// Lets the full asset path (generation, validation, atomic commit,
/// immutability across runs) run offline.
pub struct StubProvider;

#[async_trait]
impl ImageProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, GenerateError> {
        STANDARD
            .decode(STUB_PNG_B64)
            .map_err(|e| GenerateError::Permanent(format!("stub PNG decode: {}", e)))
    }
}

// ============ OpenAI Provider ============

/// Image provider using the OpenAI images API.
///
/// Calls `POST /v1/images/generations` with the configured model and decodes
/// the base64 payload from the response. Requires the `OPENAI_API_KEY`
/// environment variable to be set.
pub struct OpenAiProvider {
    model: String,
    size: String,
    timeout: Duration,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(config: &ImageConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-image-1".to_string()),
            size: config.size.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            api_key,
        })
    }
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| GenerateError::Transient(format!("http client: {}", e)))?;

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
            "size": self.size,
        });

        let resp = client
            .post("https://api.openai.com/v1/images/generations")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Transient(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &body_text));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GenerateError::Transient(format!("response body: {}", e)))?;

        parse_image_response(&json)
    }
}

/// Map an HTTP error status to the retry classification.
///
/// 429 and 5xx are transient; every other client error (including content
/// policy rejections, which arrive as 400) is permanent.
fn classify_http_error(status: u16, body: &str) -> GenerateError {
    if status == 429 || status >= 500 {
        GenerateError::Transient(format!("OpenAI API error {}: {}", status, body))
    } else {
        GenerateError::Permanent(format!("OpenAI API error {}: {}", status, body))
    }
}

/// Extract and decode `data[0].b64_json` from the images API response.
fn parse_image_response(json: &serde_json::Value) -> Result<Vec<u8>, GenerateError> {
    let b64 = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|arr| arr.first())
        .and_then(|item| item.get("b64_json"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            GenerateError::Permanent("Invalid OpenAI response: missing data[0].b64_json".to_string())
        })?;

    STANDARD
        .decode(b64)
        .map_err(|e| GenerateError::Permanent(format!("Invalid base64 image payload: {}", e)))
}

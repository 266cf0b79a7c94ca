//! Gemini provider implementing [`GenerationClient`].
//!
//! One POST to `{base}/v1beta/models/{model}:generateContent` per call. The
//! API key travels in the `x-goog-api-key` header so it never appears in a
//! URL or an error message. The output-token ceiling is capped at
//! [`HARD_MAX_OUTPUT_TOKENS`] whatever the configuration says.

use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use theurgy_core::text::preview;
use theurgy_settings::{GenerationSettings, HARD_MAX_OUTPUT_TOKENS};
use tracing::{debug, error, instrument, warn};

use crate::client::{GenerationClient, GenerationRequest};
use crate::errors::{GenerationError, Result};
use crate::finish_reason::FinishReason;

use super::types::{
    ApiErrorEnvelope, Content, GenerateContentRequest, GenerateContentResponse,
    WireGenerationConfig, WireSafetySetting,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings for the Gemini API.
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key.
    pub api_key: String,
    /// API origin, without a trailing path.
    pub base_url: String,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiConfig {
    /// Read the key from the environment variable named in settings.
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey {
                env: settings.api_key_env.clone(),
            })?;
        Ok(Self {
            api_key,
            base_url: settings.base_url.clone(),
        })
    }
}

/// Gemini text-generation client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client with its own HTTP connection pool.
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create a client sharing an HTTP connection pool.
    #[must_use]
    pub fn with_client(config: GeminiConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Build the request body.
    pub fn build_request(request: &GenerationRequest) -> GenerateContentRequest {
        let config = &request.config;
        GenerateContentRequest {
            contents: vec![Content::text(Some("user"), request.prompt.clone())],
            system_instruction: request
                .system_tone
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .map(|t| Content::text(None, t)),
            generation_config: WireGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens.min(HARD_MAX_OUTPUT_TOKENS),
                top_p: config.top_p,
                top_k: config.top_k,
            },
            safety_settings: request
                .safety
                .iter()
                .map(|s| WireSafetySetting {
                    category: s.category.clone(),
                    threshold: s.threshold.clone(),
                })
                .collect(),
        }
    }

    /// Pull the reply text out of a parsed response.
    pub fn extract_text(response: &GenerateContentResponse) -> Result<String> {
        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(GenerationError::SafetyBlocked {
                reason: reason.to_string(),
            });
        }
        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| GenerationError::Malformed("no candidates".into()))?;
        if let Some(failure) = FinishReason::from_gemini(candidate.finish_reason.as_deref()).failure() {
            return Err(failure);
        }
        let content = candidate
            .content
            .as_ref()
            .ok_or_else(|| GenerationError::Malformed("candidate has no content".into()))?;
        Ok(content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<String>())
    }

    async fn send(&self, request: &GenerationRequest) -> Result<String> {
        let body = Self::build_request(request);
        let url = self.endpoint(&request.config.model);

        debug!(
            model = %request.config.model,
            max_output_tokens = body.generation_config.max_output_tokens,
            has_tone = body.system_instruction.is_some(),
            prompt = %preview(&request.prompt),
            "sending Gemini request"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body_text)
                .map(|e| e.error.message)
                .unwrap_or_default();
            error!(status = status.as_u16(), message = %preview(&message), "Gemini API error");
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: GenerateContentResponse = serde_json::from_slice(&bytes)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let text = Self::extract_text(&parsed)?;
        debug!(reply = %preview(&text), "Gemini reply received");
        Ok(text)
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    #[instrument(skip_all, fields(provider = "gemini", model = %request.config.model))]
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let started = Instant::now();
        let result = self.send(request).await;
        histogram!("generation_duration_seconds", "provider" => "gemini")
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => counter!("generation_requests_total", "provider" => "gemini", "outcome" => "ok")
                .increment(1),
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "generation failed");
                counter!("generation_requests_total", "provider" => "gemini", "outcome" => e.kind())
                    .increment(1);
            }
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

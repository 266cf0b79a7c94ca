//! The [`GenerationClient`] trait and its request types.

use std::time::Duration;

use async_trait::async_trait;
use theurgy_settings::{GenerationSettings, SafetySetting};

use crate::errors::{GenerationError, Result};
use crate::parser::{ParsedResponse, parse_response};

/// Sampling and limit parameters for one call.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationConfig {
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Configured output-token ceiling. Providers cap it further on the wire.
    pub max_output_tokens: u32,
    /// Nucleus sampling.
    pub top_p: f64,
    /// Top-k sampling.
    pub top_k: u32,
    /// Wall-clock bound for the whole call.
    pub timeout: Duration,
}

impl GenerationConfig {
    /// Build from settings.
    pub fn from_settings(settings: &GenerationSettings) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            top_p: settings.top_p,
            top_k: settings.top_k,
            timeout: settings.timeout(),
        }
    }

    /// Replace the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::from_settings(&GenerationSettings::default())
    }
}

/// Everything a provider needs for one call.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    /// Composed prompt text.
    pub prompt: String,
    /// Trust-derived tone, sent as a system instruction when present.
    pub system_tone: Option<String>,
    /// Sampling and limits.
    pub config: GenerationConfig,
    /// Safety thresholds.
    pub safety: Vec<SafetySetting>,
}

/// Stateless request/response adapter to a text-generation API.
///
/// Implementors provide [`complete`](Self::complete), a single attempt with
/// no retry. [`generate`](Self::generate) bounds it by the configured timeout
/// and parses the text.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Return the raw generated text or a failure.
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;

    /// Timeout-bounded call followed by response parsing.
    async fn generate(&self, request: &GenerationRequest) -> Result<ParsedResponse> {
        let bound = request.config.timeout;
        let raw = tokio::time::timeout(bound, self.complete(request))
            .await
            .map_err(|_| GenerationError::Timeout {
                seconds: bound.as_secs_f64(),
            })??;
        Ok(parse_response(&raw))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

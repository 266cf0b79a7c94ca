//! Generation provider settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Output-token ceiling sent on the wire regardless of configuration.
pub const HARD_MAX_OUTPUT_TOKENS: u32 = 300;

/// One safety filter threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetySetting {
    /// Provider harm category, e.g. `HARM_CATEGORY_HARASSMENT`.
    pub category: String,
    /// Provider block threshold, e.g. `BLOCK_MEDIUM_AND_ABOVE`.
    pub threshold: String,
}

impl SafetySetting {
    fn medium(category: &str) -> Self {
        Self {
            category: category.to_string(),
            threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
        }
    }
}

/// Settings for the text-generation HTTP API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    /// Default model name.
    pub model: String,
    /// API origin.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Wall-clock timeout for one call.
    pub timeout_seconds: u64,
    /// Sampling temperature.
    pub temperature: f64,
    /// Configured output-token ceiling, capped by [`HARD_MAX_OUTPUT_TOKENS`].
    pub max_output_tokens: u32,
    /// Nucleus sampling.
    pub top_p: f64,
    /// Top-k sampling.
    pub top_k: u32,
    /// Safety filter thresholds.
    pub safety: Vec<SafetySetting>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_seconds: 30,
            temperature: 0.7,
            max_output_tokens: 1000,
            top_p: 0.8,
            top_k: 10,
            safety: vec![
                SafetySetting::medium("HARM_CATEGORY_HARASSMENT"),
                SafetySetting::medium("HARM_CATEGORY_HATE_SPEECH"),
                SafetySetting::medium("HARM_CATEGORY_SEXUALLY_EXPLICIT"),
                SafetySetting::medium("HARM_CATEGORY_DANGEROUS_CONTENT"),
            ],
        }
    }
}

impl GenerationSettings {
    /// Output-token ceiling actually sent to the provider.
    pub fn wire_max_output_tokens(&self) -> u32 {
        self.max_output_tokens.min(HARD_MAX_OUTPUT_TOKENS)
    }

    /// Call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tokens_are_capped() {
        let s = GenerationSettings::default();
        assert_eq!(s.max_output_tokens, 1000);
        assert_eq!(s.wire_max_output_tokens(), HARD_MAX_OUTPUT_TOKENS);
        let small = GenerationSettings {
            max_output_tokens: 120,
            ..GenerationSettings::default()
        };
        assert_eq!(small.wire_max_output_tokens(), 120);
    }

    #[test]
    fn default_safety_covers_four_categories() {
        let s = GenerationSettings::default();
        assert_eq!(s.safety.len(), 4);
        assert!(s.safety.iter().all(|x| x.threshold == "BLOCK_MEDIUM_AND_ABOVE"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s: GenerationSettings =
            serde_json::from_value(serde_json::json!({"timeoutSeconds": 5})).unwrap();
        assert_eq!(s.timeout(), Duration::from_secs(5));
        assert_eq!(s.model, "gemini-1.5-pro");
    }
}

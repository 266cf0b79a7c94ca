//! Gemini wire types. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// `generateContent` request body.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation turns; this client sends exactly one user turn.
    pub contents: Vec<Content>,
    /// Persona tone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Sampling parameters.
    pub generation_config: WireGenerationConfig,
    /// Safety thresholds.
    pub safety_settings: Vec<WireSafetySetting>,
}

/// A role-tagged list of parts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Content {
    /// `user` or `model`; absent for system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// One text part with an optional role.
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(String::from),
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// A text part. Non-text parts deserialize with empty text.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Part {
    /// Text content.
    #[serde(default)]
    pub text: String,
}

/// `generationConfig` object.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGenerationConfig {
    /// Sampling temperature.
    pub temperature: f64,
    /// Output-token ceiling, already capped.
    pub max_output_tokens: u32,
    /// Nucleus sampling.
    pub top_p: f64,
    /// Top-k sampling.
    pub top_k: u32,
}

/// `safetySettings` entry.
#[derive(Clone, Debug, Serialize)]
pub struct WireSafetySetting {
    /// Harm category.
    pub category: String,
    /// Block threshold.
    pub threshold: String,
}

/// `generateContent` response body.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidate replies.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Prompt-level feedback (blocking).
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

/// One candidate reply.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Reply content.
    #[serde(default)]
    pub content: Option<Content>,
    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Prompt feedback.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Set when the prompt itself was blocked.
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Error envelope returned with non-2xx statuses.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiErrorEnvelope {
    /// Error detail.
    #[serde(default)]
    pub error: ApiErrorBody,
}

/// Error detail.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Canonical status, e.g. `INVALID_ARGUMENT`.
    #[serde(default)]
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_camel_case() {
        let req = GenerateContentRequest {
            contents: vec![Content::text(Some("user"), "hi")],
            system_instruction: None,
            generation_config: WireGenerationConfig {
                temperature: 0.7,
                max_output_tokens: 300,
                top_p: 0.8,
                top_k: 10,
            },
            safety_settings: vec![],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 300);
        assert_eq!(v["generationConfig"]["topK"], 10);
        assert!(v.get("systemInstruction").is_none());
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let r: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "a"}, {"inlineData": {}}]}}]
        }))
        .unwrap();
        let parts = &r.candidates[0].content.as_ref().unwrap().parts;
        assert_eq!(parts[0].text, "a");
        assert_eq!(parts[1].text, "");
        assert!(r.candidates[0].finish_reason.is_none());
        assert!(r.prompt_feedback.is_none());
    }

    #[test]
    fn error_envelope_parses() {
        let e: ApiErrorEnvelope = serde_json::from_value(json!({
            "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
        }))
        .unwrap();
        assert_eq!(e.error.status, "INVALID_ARGUMENT");
    }
}

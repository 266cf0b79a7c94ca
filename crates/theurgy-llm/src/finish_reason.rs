//! # Finish Reason Mapping
//!
//! Maps Gemini `finishReason` strings to [`FinishReason`] and decides which
//! of them invalidate the reply.
//!
//! Gemini uses:
//! - `"STOP"` -> normal completion
//! - `"MAX_TOKENS"` -> output-token ceiling reached
//! - `"SAFETY"`, `"RECITATION"`, `"BLOCKLIST"`, `"PROHIBITED_CONTENT"`, `"SPII"` -> blocked
//! - anything else -> treated as completion

use crate::errors::GenerationError;

/// Unified finish reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    /// Normal completion.
    Stop,
    /// Stopped at the output-token ceiling.
    MaxTokens,
    /// Blocked by a content filter; carries the provider string.
    Blocked(&'static str),
    /// Unrecognized or absent reason.
    Other,
}

impl FinishReason {
    /// Map a Gemini finish reason.
    pub fn from_gemini(reason: Option<&str>) -> Self {
        match reason {
            Some("STOP") => Self::Stop,
            Some("MAX_TOKENS") => Self::MaxTokens,
            Some("SAFETY") => Self::Blocked("SAFETY"),
            Some("RECITATION") => Self::Blocked("RECITATION"),
            Some("BLOCKLIST") => Self::Blocked("BLOCKLIST"),
            Some("PROHIBITED_CONTENT") => Self::Blocked("PROHIBITED_CONTENT"),
            Some("SPII") => Self::Blocked("SPII"),
            _ => Self::Other,
        }
    }

    /// The failure this reason implies, if any.
    pub fn failure(self) -> Option<GenerationError> {
        match self {
            Self::Stop | Self::Other => None,
            Self::MaxTokens => Some(GenerationError::Truncated),
            Self::Blocked(reason) => Some(GenerationError::SafetyBlocked {
                reason: reason.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn stop_is_success() {
        assert_eq!(FinishReason::from_gemini(Some("STOP")), FinishReason::Stop);
        assert!(FinishReason::Stop.failure().is_none());
    }

    #[test]
    fn missing_reason_is_success() {
        assert_eq!(FinishReason::from_gemini(None), FinishReason::Other);
        assert!(FinishReason::from_gemini(Some("OTHER")).failure().is_none());
    }

    #[test]
    fn max_tokens_is_truncation() {
        assert_matches!(
            FinishReason::from_gemini(Some("MAX_TOKENS")).failure(),
            Some(GenerationError::Truncated)
        );
    }

    #[test]
    fn safety_family_is_blocked() {
        for reason in ["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"] {
            assert_matches!(
                FinishReason::from_gemini(Some(reason)).failure(),
                Some(GenerationError::SafetyBlocked { reason: r }) if r == reason
            );
        }
    }
}

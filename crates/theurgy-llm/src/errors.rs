//! Generation error types.

use thiserror::Error;

/// Why a generation call produced no usable reply.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The call exceeded its wall-clock bound.
    #[error("generation timed out after {seconds:.1}s")]
    Timeout {
        /// Configured bound in seconds.
        seconds: f64,
    },

    /// Non-success HTTP status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// The provider stopped at the output-token ceiling.
    #[error("response truncated at output-token limit")]
    Truncated,

    /// The provider blocked the prompt or the reply.
    #[error("blocked by safety filter: {reason}")]
    SafetyBlocked {
        /// Provider-reported reason.
        reason: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The API key environment variable is unset.
    #[error("API key not set in ${env}")]
    MissingApiKey {
        /// Variable name.
        env: String,
    },
}

impl GenerationError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Timeout { .. } => "timeout",
            Self::Api { .. } => "api",
            Self::Truncated => "truncated",
            Self::SafetyBlocked { .. } => "safety",
            Self::Malformed(_) => "malformed",
            Self::MissingApiKey { .. } => "missing_api_key",
        }
    }
}

/// Result alias for generation calls.
pub type Result<T> = std::result::Result<T, GenerationError>;

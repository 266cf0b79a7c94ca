//! Google Generative Language API (`generateContent`) provider.

pub mod provider;
pub mod types;

pub use provider::{GeminiClient, GeminiConfig};

//! # theurgy-llm
//!
//! The generation boundary:
//!
//! - [`client::GenerationClient`]: single-attempt, timeout-bounded trait
//! - [`parser`]: splits generated text into dialogue and command candidates
//! - [`finish_reason`]: maps provider finish reasons to failures
//! - [`gemini`]: Google Generative Language API implementation
//!
//! Every failure surfaces as a [`GenerationError`]; callers fold all of them
//! into one user-visible line.
//!
//! ## Crate Position
//!
//! Depends on `theurgy-core` and `theurgy-settings`. Depended on by
//! `theurgy-runtime` and the agent.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod finish_reason;
pub mod gemini;
pub mod parser;

pub use client::{GenerationClient, GenerationConfig, GenerationRequest};
pub use errors::{GenerationError, Result};
pub use parser::{FALLBACK_DIALOGUE, ParsedResponse, parse_response};

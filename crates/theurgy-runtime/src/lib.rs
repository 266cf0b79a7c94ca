//! # theurgy-runtime
//!
//! The conversation turn protocol.
//!
//! - [`session::SessionManager`]: top-level coordinator driving each turn
//! - [`rate_limiter::RateLimiter`]: per-(user, action) cooldowns
//! - [`policy`]: three-tier override resolvers and the [`policy::TrustLedger`]
//! - [`prompt::PromptCompositor`]: deterministic prompt assembly
//! - [`arbiter::CommandArbiter`]: allow-listing, auto-judgment and execution
//! - [`boundary`]: traits for the host's executor, trust store and context
//!
//! Per user, at most one generation call is in flight; results arriving for
//! an ended session are dropped.
//!
//! ## Crate Position
//!
//! Depends on `theurgy-core`, `theurgy-settings`, `theurgy-store` and
//! `theurgy-llm`. Depended on by `theurgy-agent`.

#![deny(unsafe_code)]

pub mod arbiter;
pub mod boundary;
pub mod errors;
pub mod policy;
pub mod prompt;
pub mod rate_limiter;
pub mod session;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testutil;

pub use errors::SessionError;
pub use session::{SessionManager, SessionManagerDeps, SessionStartResult, TurnResult};

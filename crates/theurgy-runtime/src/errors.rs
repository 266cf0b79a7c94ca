//! Session error types.
//!
//! Gating failures, busy or ended sessions and durable-write failures are
//! errors. Generation failures become [`TurnResult::Fallback`](crate::TurnResult::Fallback),
//! disallowed commands are dropped, and resolving an empty pending set
//! reports [`PendingResolution::NothingPending`](crate::arbiter::PendingResolution::NothingPending).

use theurgy_core::ids::PersonaId;
use theurgy_store::StoreError;
use thiserror::Error;

/// Errors returned by [`SessionManager`](crate::SessionManager).
#[derive(Debug, Error)]
pub enum SessionError {
    /// No definition for the persona.
    #[error("unknown persona: {0}")]
    UnknownPersona(PersonaId),

    /// Trust is below the persona's requirement.
    #[error("insufficient trust: requires {required}, have {actual}")]
    InsufficientTrust {
        /// Effective requirement.
        required: i32,
        /// Caller's trust.
        actual: i32,
    },

    /// The conversation cooldown has not elapsed.
    #[error("on cooldown for {remaining_minutes} more minute(s)")]
    OnCooldown {
        /// Whole minutes left, rounded up.
        remaining_minutes: u32,
    },

    /// The user has no conversation.
    #[error("no active session")]
    NoActiveSession,

    /// A reply for this user is still being generated.
    #[error("the persona is still considering your last words")]
    TurnInFlight,

    /// The session was ended or replaced before its greeting was delivered.
    #[error("the session ended before the persona spoke")]
    SessionEnded,

    /// Durable history write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Gating failures are raised before any generation request.
    pub fn is_gating(&self) -> bool {
        matches!(
            self,
            Self::UnknownPersona(_)
                | Self::InsufficientTrust { .. }
                | Self::OnCooldown { .. }
                | Self::NoActiveSession
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_values() {
        let err = SessionError::InsufficientTrust {
            required: 10,
            actual: 3,
        };
        assert_eq!(err.to_string(), "insufficient trust: requires 10, have 3");
        let err = SessionError::OnCooldown {
            remaining_minutes: 4,
        };
        assert_eq!(err.to_string(), "on cooldown for 4 more minute(s)");
    }

    #[test]
    fn ended_session_is_not_gating() {
        assert!(!SessionError::SessionEnded.is_gating());
        assert!(SessionError::NoActiveSession.is_gating());
    }

    #[test]
    fn gating_classification() {
        assert!(SessionError::NoActiveSession.is_gating());
        assert!(SessionError::UnknownPersona(PersonaId::from("x")).is_gating());
        assert!(!SessionError::TurnInFlight.is_gating());
    }
}

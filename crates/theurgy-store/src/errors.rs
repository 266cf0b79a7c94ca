//! Store error types.

use theurgy_core::persona::OverrideError;
use thiserror::Error;

/// Errors raised by history and override persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// An override value failed to parse for its setting.
    #[error(transparent)]
    InvalidOverride(#[from] OverrideError),
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use theurgy_core::persona::OverrideKey;

    #[test]
    fn invalid_override_is_transparent() {
        let err: StoreError = OverrideError {
            key: OverrideKey::CooldownMinutes,
            value: "soon".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invalid value \"soon\" for override cooldown_minutes"
        );
    }

    #[test]
    fn sqlite_error_display() {
        let err = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().starts_with("sqlite error"));
    }
}

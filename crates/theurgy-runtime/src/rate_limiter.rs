//! Per-(user, action) cooldowns.
//!
//! Records are in memory only. An action is allowed again exactly when the
//! full window has elapsed since it was last recorded.

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use theurgy_core::ids::{PersonaId, UserId};
use tracing::debug;

const MS_PER_MINUTE: i64 = 60_000;

/// Action key used for the conversation cooldown of `persona`.
pub fn conversation_key(persona: &PersonaId) -> String {
    format!("{persona}:conversation")
}

/// Answer to "may this user act now".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownStatus {
    /// Whether the action is allowed.
    pub allowed: bool,
    /// Milliseconds until it is allowed; zero when allowed.
    pub remaining_ms: i64,
}

impl CooldownStatus {
    const READY: Self = Self {
        allowed: true,
        remaining_ms: 0,
    };

    /// Whole minutes remaining, rounded up.
    pub fn remaining_minutes(&self) -> u32 {
        let minutes = (self.remaining_ms + MS_PER_MINUTE - 1) / MS_PER_MINUTE;
        u32::try_from(minutes.max(0)).unwrap_or(u32::MAX)
    }
}

#[derive(Clone, Copy, Debug)]
struct CooldownRecord {
    last_used_ms: i64,
    window_ms: i64,
}

/// Cooldown tracker keyed by (user, action).
#[derive(Debug, Default)]
pub struct RateLimiter {
    records: DashMap<(UserId, String), CooldownRecord>,
}

impl RateLimiter {
    /// Empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check against the wall clock.
    pub fn can_act(&self, user: &UserId, action: &str, cooldown_minutes: u32) -> CooldownStatus {
        self.can_act_at(user, action, cooldown_minutes, now_ms())
    }

    /// Check at an explicit instant.
    pub fn can_act_at(
        &self,
        user: &UserId,
        action: &str,
        cooldown_minutes: u32,
        now_ms: i64,
    ) -> CooldownStatus {
        if cooldown_minutes == 0 {
            return CooldownStatus::READY;
        }
        let Some(record) = self.records.get(&(user.clone(), action.to_string())) else {
            return CooldownStatus::READY;
        };
        let window = i64::from(cooldown_minutes) * MS_PER_MINUTE;
        let elapsed = now_ms - record.last_used_ms;
        if elapsed >= window {
            CooldownStatus::READY
        } else {
            CooldownStatus {
                allowed: false,
                remaining_ms: window - elapsed,
            }
        }
    }

    /// Record the action at the wall clock.
    pub fn record_action(&self, user: &UserId, action: &str, cooldown_minutes: u32) {
        self.record_action_at(user, action, cooldown_minutes, now_ms());
    }

    /// Record the action at an explicit instant.
    ///
    /// The window is kept with the record so garbage collection can judge
    /// staleness without knowing the policy.
    pub fn record_action_at(&self, user: &UserId, action: &str, cooldown_minutes: u32, now_ms: i64) {
        let _ = self.records.insert(
            (user.clone(), action.to_string()),
            CooldownRecord {
                last_used_ms: now_ms,
                window_ms: i64::from(cooldown_minutes) * MS_PER_MINUTE,
            },
        );
    }

    /// Drop records older than twice their window. Returns how many.
    pub fn collect_garbage(&self) -> usize {
        self.collect_garbage_at(now_ms())
    }

    /// Garbage collection at an explicit instant.
    pub fn collect_garbage_at(&self, now_ms: i64) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| now_ms - record.last_used_ms < record.window_ms.saturating_mul(2));
        let dropped = before.saturating_sub(self.records.len());
        if dropped > 0 {
            debug!(dropped, "cooldown records collected");
        }
        dropped
    }

    /// Number of tracked records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

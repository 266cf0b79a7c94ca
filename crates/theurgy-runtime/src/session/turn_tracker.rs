//! Tracks the in-flight generation turn per user.

use std::collections::HashMap;

use metrics::gauge;
use parking_lot::Mutex;
use theurgy_core::ids::{SessionId, UserId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::SessionError;
use crate::telemetry::TURNS_IN_FLIGHT;

struct ActiveTurn {
    turn_id: u64,
    session_id: SessionId,
    cancel: CancellationToken,
}

/// A turn admitted by [`TurnTracker::begin`].
#[derive(Clone, Debug)]
pub struct TurnTicket {
    /// Per-tracker turn number.
    pub turn_id: u64,
    /// Fires when the owning session ends.
    pub cancel: CancellationToken,
}

/// At most one generation turn per user.
#[derive(Default)]
pub struct TurnTracker {
    active: Mutex<HashMap<UserId, ActiveTurn>>,
    next_id: Mutex<u64>,
}

impl TurnTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a turn, or fail with [`SessionError::TurnInFlight`].
    pub fn begin(&self, user: &UserId, session_id: &SessionId) -> Result<TurnTicket, SessionError> {
        let mut active = self.active.lock();
        if active.contains_key(user) {
            return Err(SessionError::TurnInFlight);
        }
        let turn_id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        let cancel = CancellationToken::new();
        let _ = active.insert(
            user.clone(),
            ActiveTurn {
                turn_id,
                session_id: session_id.clone(),
                cancel: cancel.clone(),
            },
        );
        gauge!(TURNS_IN_FLIGHT).set(active.len() as f64);
        debug!(user = %user, turn_id, "turn started");
        Ok(TurnTicket { turn_id, cancel })
    }

    /// Release a turn. A stale `turn_id` leaves a newer turn untouched.
    pub fn complete(&self, user: &UserId, turn_id: u64) {
        let mut active = self.active.lock();
        if active.get(user).is_some_and(|t| t.turn_id == turn_id) {
            let _ = active.remove(user);
            debug!(user = %user, turn_id, "turn completed");
        }
        gauge!(TURNS_IN_FLIGHT).set(active.len() as f64);
    }

    /// Cancel the user's in-flight turn. Returns whether one was running.
    pub fn cancel(&self, user: &UserId) -> bool {
        let mut active = self.active.lock();
        let Some(turn) = active.remove(user) else {
            return false;
        };
        warn!(user = %user, session_id = %turn.session_id, turn_id = turn.turn_id, "in-flight turn cancelled");
        turn.cancel.cancel();
        gauge!(TURNS_IN_FLIGHT).set(active.len() as f64);
        true
    }

    /// Cancel every in-flight turn.
    pub fn cancel_all(&self) -> usize {
        let mut active = self.active.lock();
        let count = active.len();
        for (_, turn) in active.drain() {
            turn.cancel.cancel();
        }
        gauge!(TURNS_IN_FLIGHT).set(0.0);
        count
    }

    /// Whether the user has a turn in flight.
    pub fn is_in_flight(&self, user: &UserId) -> bool {
        self.active.lock().contains_key(user)
    }

    /// Number of in-flight turns.
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn alex() -> UserId {
        UserId::from("alex")
    }

    #[test]
    fn second_turn_rejected_while_first_in_flight() {
        let tracker = TurnTracker::new();
        let sid = SessionId::new();
        let ticket = tracker.begin(&alex(), &sid).unwrap();
        assert_matches!(tracker.begin(&alex(), &sid), Err(SessionError::TurnInFlight));
        assert!(tracker.begin(&UserId::from("sam"), &sid).is_ok());
        tracker.complete(&alex(), ticket.turn_id);
        assert!(tracker.begin(&alex(), &sid).is_ok());
    }

    #[test]
    fn stale_completion_keeps_newer_turn() {
        let tracker = TurnTracker::new();
        let sid = SessionId::new();
        let old = tracker.begin(&alex(), &sid).unwrap();
        assert!(tracker.cancel(&alex()));
        let new = tracker.begin(&alex(), &sid).unwrap();
        tracker.complete(&alex(), old.turn_id);
        assert!(tracker.is_in_flight(&alex()));
        tracker.complete(&alex(), new.turn_id);
        assert!(tracker.is_empty());
    }

    #[test]
    fn cancel_fires_token() {
        let tracker = TurnTracker::new();
        let ticket = tracker.begin(&alex(), &SessionId::new()).unwrap();
        assert!(!ticket.cancel.is_cancelled());
        assert!(tracker.cancel(&alex()));
        assert!(ticket.cancel.is_cancelled());
        assert!(!tracker.cancel(&alex()));
    }

    #[test]
    fn cancel_all_drains() {
        let tracker = TurnTracker::new();
        let a = tracker.begin(&alex(), &SessionId::new()).unwrap();
        let b = tracker.begin(&UserId::from("sam"), &SessionId::new()).unwrap();
        assert_eq!(tracker.cancel_all(), 2);
        assert!(a.cancel.is_cancelled() && b.cancel.is_cancelled());
        assert_eq!(tracker.len(), 0);
    }
}

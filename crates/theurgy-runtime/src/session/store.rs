//! In-memory session and pending-command maps.
//!
//! Injected into the manager and arbiter instead of living in process-wide
//! statics, so tests build isolated instances. Both maps are sharded
//! (`DashMap`) and keyed by user.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use theurgy_core::ids::{PersonaId, SessionId, UserId};
use tokio::time::Instant;

/// One user's active conversation.
#[derive(Clone, Debug)]
pub struct ConversationSession {
    /// Session identity.
    pub id: SessionId,
    /// Owner.
    pub user: UserId,
    /// Persona being addressed.
    pub persona: PersonaId,
    /// Wall-clock start.
    pub created_at: DateTime<Utc>,
    /// Last utterance or greeting.
    pub last_activity: Instant,
}

impl ConversationSession {
    /// Fresh session starting now.
    pub fn new(user: UserId, persona: PersonaId) -> Self {
        Self {
            id: SessionId::new(),
            user,
            persona,
            created_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }
}

/// Commands awaiting accept or decline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCommandSet {
    /// Session the suggestion belongs to.
    pub session_id: SessionId,
    /// Persona that suggested them.
    pub persona: PersonaId,
    /// Normalized command lines, in order.
    pub commands: Vec<String>,
}

/// Active sessions and pending command sets.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<UserId, ConversationSession>,
    pending: DashMap<UserId, PendingCommandSet>,
}

impl SessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, returning the one it replaced.
    pub fn insert(&self, session: ConversationSession) -> Option<ConversationSession> {
        self.sessions.insert(session.user.clone(), session)
    }

    /// Snapshot of a user's session.
    pub fn get(&self, user: &UserId) -> Option<ConversationSession> {
        self.sessions.get(user).map(|s| s.clone())
    }

    /// Remove a user's session and pending set.
    pub fn remove(&self, user: &UserId) -> Option<ConversationSession> {
        let _ = self.pending.remove(user);
        self.sessions.remove(user).map(|(_, s)| s)
    }

    /// Mark activity now.
    pub fn touch(&self, user: &UserId) {
        if let Some(mut session) = self.sessions.get_mut(user) {
            session.last_activity = Instant::now();
        }
    }

    /// Whether `session_id` is still the user's live session.
    pub fn is_current(&self, user: &UserId, session_id: &SessionId) -> bool {
        self.sessions
            .get(user)
            .is_some_and(|s| &s.id == session_id)
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is active.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Every user with a session.
    pub fn users(&self) -> Vec<UserId> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    /// Users idle for at least `idle` as of `now`.
    pub fn idle_sessions(&self, now: Instant, idle: Duration) -> Vec<UserId> {
        self.sessions
            .iter()
            .filter(|s| now.saturating_duration_since(s.last_activity) >= idle)
            .map(|s| s.key().clone())
            .collect()
    }

    /// Users talking to any of `personas`.
    pub fn sessions_for_personas(&self, personas: &[PersonaId]) -> Vec<UserId> {
        self.sessions
            .iter()
            .filter(|s| personas.contains(&s.persona))
            .map(|s| s.key().clone())
            .collect()
    }

    // ── pending commands ──

    /// Replace the user's pending set.
    pub fn set_pending(&self, user: &UserId, set: PendingCommandSet) {
        let _ = self.pending.insert(user.clone(), set);
    }

    /// Remove and return the user's pending set.
    pub fn take_pending(&self, user: &UserId) -> Option<PendingCommandSet> {
        self.pending.remove(user).map(|(_, set)| set)
    }

    /// Drop the user's pending set. Returns whether one existed.
    pub fn clear_pending(&self, user: &UserId) -> bool {
        self.pending.remove(user).is_some()
    }

    /// Pending commands for display.
    pub fn pending_commands(&self, user: &UserId) -> Option<Vec<String>> {
        self.pending.get(user).map(|set| set.commands.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alex() -> UserId {
        UserId::from("alex")
    }

    #[test]
    fn insert_replaces_prior_session() {
        let store = SessionStore::new();
        let first = ConversationSession::new(alex(), PersonaId::from("storm"));
        let first_id = first.id.clone();
        assert!(store.insert(first).is_none());
        let second = ConversationSession::new(alex(), PersonaId::from("sea"));
        let second_id = second.id.clone();
        let replaced = store.insert(second).unwrap();
        assert_eq!(replaced.id, first_id);
        assert!(store.is_current(&alex(), &second_id));
        assert!(!store.is_current(&alex(), &first_id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_drops_pending() {
        let store = SessionStore::new();
        let session = ConversationSession::new(alex(), PersonaId::from("storm"));
        let set = PendingCommandSet {
            session_id: session.id.clone(),
            persona: session.persona.clone(),
            commands: vec!["give {player} bread".into()],
        };
        let _ = store.insert(session);
        store.set_pending(&alex(), set);
        assert!(store.pending_commands(&alex()).is_some());
        assert!(store.remove(&alex()).is_some());
        assert!(store.pending_commands(&alex()).is_none());
        assert!(store.remove(&alex()).is_none());
    }

    #[test]
    fn take_pending_empties_slot() {
        let store = SessionStore::new();
        store.set_pending(
            &alex(),
            PendingCommandSet {
                session_id: SessionId::new(),
                persona: PersonaId::from("storm"),
                commands: vec!["a".into()],
            },
        );
        assert_eq!(store.take_pending(&alex()).unwrap().commands, ["a"]);
        assert!(store.take_pending(&alex()).is_none());
        assert!(!store.clear_pending(&alex()));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_by_last_activity() {
        let store = SessionStore::new();
        let _ = store.insert(ConversationSession::new(alex(), PersonaId::from("storm")));
        tokio::time::advance(Duration::from_secs(30)).await;
        let _ = store.insert(ConversationSession::new(UserId::from("sam"), PersonaId::from("sea")));
        tokio::time::advance(Duration::from_secs(30)).await;
        let idle = store.idle_sessions(Instant::now(), Duration::from_secs(60));
        assert_eq!(idle, [alex()]);
        store.touch(&alex());
        assert!(store.idle_sessions(Instant::now(), Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn sessions_for_removed_personas() {
        let store = SessionStore::new();
        let _ = store.insert(ConversationSession::new(alex(), PersonaId::from("storm")));
        let _ = store.insert(ConversationSession::new(UserId::from("sam"), PersonaId::from("sea")));
        assert_eq!(
            store.sessions_for_personas(&[PersonaId::from("storm")]),
            [alex()]
        );
    }
}

//! Conversation sessions and the turn protocol.

pub mod manager;
pub mod store;
pub mod turn_tracker;

pub use manager::{SessionManager, SessionManagerDeps, SessionStartResult, TurnResult};
pub use store::{ConversationSession, PendingCommandSet, SessionStore};
pub use turn_tracker::TurnTracker;

//! Collaborators owned by the host.
//!
//! The host executes commands against its world, owns trust scores and can
//! describe a user's surroundings. This crate only consumes these traits.
//! [`PersonaCatalog`] holds the loaded definitions and swaps them whole on
//! reload.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use theurgy_core::ids::{PersonaId, UserId};
use theurgy_core::persona::PersonaDefinition;

/// Result of one executed command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Whether the host reported success.
    pub success: bool,
    /// Host-provided result text.
    pub output: String,
}

impl CommandOutcome {
    /// Successful outcome.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    /// Failed outcome.
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Runs an approved command string with elevated rights.
///
/// Only ever called with a command whose leading token is allow-listed.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute `command` on behalf of `acting_user`.
    fn execute(&self, command: &str, acting_user: &UserId) -> CommandOutcome;
}

/// Read-only view of the host's trust scores.
pub trait TrustSource: Send + Sync {
    /// Current score for the pair.
    fn trust(&self, user: &UserId, persona: &PersonaId) -> i32;
}

/// Environmental description folded into prompts.
pub trait ContextProvider: Send + Sync {
    /// One line describing where the user is and what surrounds them.
    fn describe(&self, user: &UserId) -> String;
}

/// Context provider for hosts with nothing to say.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoContext;

impl ContextProvider for NoContext {
    fn describe(&self, _user: &UserId) -> String {
        String::new()
    }
}

type DefinitionMap = HashMap<PersonaId, Arc<PersonaDefinition>>;

/// Loaded persona definitions.
///
/// Readers clone an `Arc` snapshot, so a reload never exposes a half-built
/// map.
#[derive(Default)]
pub struct PersonaCatalog {
    definitions: RwLock<Arc<DefinitionMap>>,
}

impl PersonaCatalog {
    /// Catalog over an initial definition set.
    pub fn new(definitions: HashMap<PersonaId, PersonaDefinition>) -> Self {
        Self {
            definitions: RwLock::new(Arc::new(wrap(definitions))),
        }
    }

    /// Definition for `persona`.
    pub fn get(&self, persona: &PersonaId) -> Option<Arc<PersonaDefinition>> {
        self.definitions.read().get(persona).cloned()
    }

    /// Replace every definition at once. Returns ids that no longer exist.
    pub fn replace(&self, definitions: HashMap<PersonaId, PersonaDefinition>) -> Vec<PersonaId> {
        let next = Arc::new(wrap(definitions));
        let previous = std::mem::replace(&mut *self.definitions.write(), Arc::clone(&next));
        let mut removed: Vec<_> = previous
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();
        removed.sort();
        removed
    }

    /// Known persona ids, sorted.
    pub fn ids(&self) -> Vec<PersonaId> {
        let mut ids: Vec<_> = self.definitions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    /// Whether no persona is defined.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn wrap(definitions: HashMap<PersonaId, PersonaDefinition>) -> DefinitionMap {
    definitions
        .into_iter()
        .map(|(id, def)| (id, Arc::new(def)))
        .collect()
}

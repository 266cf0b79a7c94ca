//! Host-side collaborators for the console.
//!
//! The console has no world to act on, so commands are logged and reported
//! as successful. Trust scores come from a JSON table on disk.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use theurgy_core::ids::{PersonaId, UserId};
use theurgy_runtime::boundary::{CommandExecutor, CommandOutcome, TrustSource};
use tracing::info;

/// Logs commands instead of running them.
#[derive(Clone, Copy, Debug, Default)]
pub struct DryRunExecutor;

impl CommandExecutor for DryRunExecutor {
    fn execute(&self, command: &str, acting_user: &UserId) -> CommandOutcome {
        info!(user = %acting_user, command, "dry-run command");
        CommandOutcome::ok(format!("(dry run) /{command}"))
    }
}

/// Trust scores keyed by user, then persona. Unknown pairs score 0.
///
/// File shape: `{"alex": {"storm": 25}}`.
#[derive(Debug, Default)]
pub struct TrustTable {
    scores: RwLock<HashMap<String, HashMap<String, i32>>>,
}

impl TrustTable {
    /// Load a table from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trust table: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid trust table: {}", path.display()))
    }

    /// Parse a table from JSON text.
    pub fn parse(content: &str) -> Result<Self> {
        let scores = serde_json::from_str(content)?;
        Ok(Self {
            scores: RwLock::new(scores),
        })
    }

    /// Set a score in memory.
    pub fn set(&self, user: &UserId, persona: &PersonaId, score: i32) {
        let _ = self
            .scores
            .write()
            .entry(user.to_string())
            .or_default()
            .insert(persona.to_string(), score);
    }
}

impl TrustSource for TrustTable {
    fn trust(&self, user: &UserId, persona: &PersonaId) -> i32 {
        self.scores
            .read()
            .get(user.as_str())
            .and_then(|by_persona| by_persona.get(persona.as_str()))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pairs_score_zero() {
        let table = TrustTable::parse(r#"{"alex": {"storm": 25}}"#).unwrap();
        assert_eq!(table.trust(&UserId::from("alex"), &PersonaId::from("storm")), 25);
        assert_eq!(table.trust(&UserId::from("alex"), &PersonaId::from("sea")), 0);
        assert_eq!(table.trust(&UserId::from("sam"), &PersonaId::from("storm")), 0);
    }

    #[test]
    fn set_updates_score() {
        let table = TrustTable::default();
        table.set(&UserId::from("alex"), &PersonaId::from("storm"), -7);
        assert_eq!(table.trust(&UserId::from("alex"), &PersonaId::from("storm")), -7);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.json");
        std::fs::write(&path, r#"{"alex": {"storm": 3}}"#).unwrap();
        let table = TrustTable::load(&path).unwrap();
        assert_eq!(table.trust(&UserId::from("alex"), &PersonaId::from("storm")), 3);
    }

    #[test]
    fn malformed_table_is_an_error() {
        assert!(TrustTable::parse(r#"{"alex": 3}"#).is_err());
    }

    #[test]
    fn dry_run_reports_success() {
        let outcome = DryRunExecutor.execute("give alex bread", &UserId::from("alex"));
        assert!(outcome.success);
        assert_eq!(outcome.output, "(dry run) /give alex bread");
    }
}

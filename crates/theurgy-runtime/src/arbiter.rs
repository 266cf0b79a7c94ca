//! Command arbitration.
//!
//! Turns a reply's candidate commands, or a trust-based judgment, into
//! executed commands. Two modes are chosen by the effective auto-judge flag:
//!
//! - **Suggest**: allow-listed candidates, truncated to the per-turn limit,
//!   wait in the user's [`PendingCommandSet`] for accept or decline.
//! - **Auto-judge**: candidates are ignored; the static blessing, neutral or
//!   curse list for the user's trust tier runs immediately.
//!
//! Every command reaches the executor through [`CommandArbiter::dispatch`],
//! which expands placeholders and re-checks the allow-list on the final
//! string. Each execution and each judgment is appended to history as an
//! audit entry.

use std::sync::Arc;

use metrics::counter;
use theurgy_core::history::AuditRecord;
use theurgy_core::ids::{SessionId, UserId};
use theurgy_core::persona::{JudgmentTier, PersonaDefinition};
use theurgy_store::Store;
use tracing::{debug, error, info, warn};

use crate::boundary::CommandExecutor;
use crate::policy::EffectivePolicy;
use crate::session::store::{PendingCommandSet, SessionStore};
use crate::telemetry::{COMMANDS_EXECUTED_TOTAL, COMMANDS_REJECTED_TOTAL};

/// What happened to one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Command as executed.
    pub command: String,
    /// Executor verdict.
    pub success: bool,
    /// Executor output.
    pub output: String,
}

/// Command outcome of a generated turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Auto-judgment ran these commands.
    Executed(Vec<ExecutionReport>),
    /// Waiting for accept or decline.
    Suggested(Vec<String>),
    /// Nothing to do.
    None,
}

/// Outcome of an accept or decline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingResolution {
    /// The pending set ran in order.
    Executed(Vec<ExecutionReport>),
    /// The pending set, of this size, was discarded.
    Declined(usize),
    /// There was nothing to resolve.
    NothingPending,
}

/// The per-turn facts arbitration needs.
#[derive(Clone, Copy, Debug)]
pub struct Arbitration<'a> {
    /// Acting user.
    pub user: &'a UserId,
    /// Session the turn belongs to.
    pub session_id: &'a SessionId,
    /// Persona definition.
    pub definition: &'a PersonaDefinition,
    /// Resolved policy.
    pub policy: &'a EffectivePolicy,
    /// User's current trust.
    pub trust: i32,
}

/// Command name of a command line: first token, leading `/` removed.
pub fn leading_token(command: &str) -> Option<&str> {
    command
        .trim()
        .trim_start_matches('/')
        .split_whitespace()
        .next()
}

/// Trim and drop a leading `/`. Blank commands yield `None`.
pub fn normalize(command: &str) -> Option<String> {
    let command = command.trim().trim_start_matches('/').trim();
    (!command.is_empty()).then(|| command.to_string())
}

/// Replace `{player}` and `{persona}`.
pub fn expand_placeholders(command: &str, user: &UserId, definition: &PersonaDefinition) -> String {
    command
        .replace("{player}", user.as_str())
        .replace("{persona}", definition.id.as_str())
}

/// Validates and executes commands on behalf of personas.
pub struct CommandArbiter {
    executor: Arc<dyn CommandExecutor>,
    store: Arc<Store>,
    sessions: Arc<SessionStore>,
}

impl CommandArbiter {
    /// Arbiter over the host executor, audit store and session store.
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        store: Arc<Store>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            executor,
            store,
            sessions,
        }
    }

    /// Keep allow-listed commands, normalized, in order.
    pub fn filter_allowed(&self, definition: &PersonaDefinition, candidates: &[String]) -> Vec<String> {
        candidates
            .iter()
            .filter_map(|c| normalize(c))
            .filter(|c| {
                let allowed = leading_token(c).is_some_and(|name| definition.allows(name));
                if !allowed {
                    warn!(persona = %definition.id, command = %c, "command not allow-listed, dropped");
                    counter!(COMMANDS_REJECTED_TOTAL).increment(1);
                }
                allowed
            })
            .collect()
    }

    /// Decide what a generated turn does with its candidates.
    pub fn arbitrate(&self, turn: &Arbitration<'_>, candidates: &[String]) -> Disposition {
        let limit = turn.policy.max_commands_per_turn.value as usize;
        if turn.policy.auto_judge.value {
            return self.judge(turn, limit);
        }
        if limit == 0 {
            if !candidates.is_empty() {
                debug!(persona = %turn.definition.id, "commands disabled, ignoring candidates");
            }
            return Disposition::None;
        }
        let mut commands = self.filter_allowed(turn.definition, candidates);
        commands.truncate(limit);
        if commands.is_empty() {
            return Disposition::None;
        }
        info!(user = %turn.user, persona = %turn.definition.id, count = commands.len(), "commands suggested");
        self.sessions.set_pending(
            turn.user,
            PendingCommandSet {
                session_id: turn.session_id.clone(),
                persona: turn.definition.id.clone(),
                commands: commands.clone(),
            },
        );
        Disposition::Suggested(commands)
    }

    fn judge(&self, turn: &Arbitration<'_>, limit: usize) -> Disposition {
        let blessing = turn.policy.blessing_threshold.value;
        let curse = turn.policy.curse_threshold.value;
        let tier = JudgmentTier::classify(turn.trust, blessing, curse);
        let listed: Vec<String> = turn
            .definition
            .policy
            .judgment
            .commands_for(tier)
            .iter()
            .take(limit)
            .cloned()
            .collect();
        let commands = self.filter_allowed(turn.definition, &listed);
        info!(
            user = %turn.user,
            persona = %turn.definition.id,
            trust = turn.trust,
            %tier,
            count = commands.len(),
            "auto-judgment"
        );
        self.audit(
            turn.user,
            turn.definition,
            AuditRecord::Decision {
                tier,
                reasoning: format!(
                    "trust {} against blessing >= {blessing}, curse <= {curse}",
                    turn.trust
                ),
                commands: commands.clone(),
            },
        );
        if commands.is_empty() {
            return Disposition::None;
        }
        Disposition::Executed(self.dispatch_all(turn.user, turn.definition, &commands))
    }

    /// Run the user's pending set in order and clear it.
    pub fn accept(&self, user: &UserId, definition: &PersonaDefinition) -> PendingResolution {
        let Some(set) = self.sessions.take_pending(user) else {
            return PendingResolution::NothingPending;
        };
        if set.persona != definition.id {
            warn!(user = %user, pending = %set.persona, persona = %definition.id, "pending set belongs to another persona, discarded");
            return PendingResolution::NothingPending;
        }
        info!(user = %user, persona = %definition.id, count = set.commands.len(), "pending commands accepted");
        PendingResolution::Executed(self.dispatch_all(user, definition, &set.commands))
    }

    /// Discard the user's pending set.
    pub fn decline(&self, user: &UserId) -> PendingResolution {
        match self.sessions.take_pending(user) {
            Some(set) => {
                info!(user = %user, count = set.commands.len(), "pending commands declined");
                PendingResolution::Declined(set.commands.len())
            }
            None => PendingResolution::NothingPending,
        }
    }

    /// Execute commands in order. One failure does not stop the rest.
    fn dispatch_all(
        &self,
        user: &UserId,
        definition: &PersonaDefinition,
        commands: &[String],
    ) -> Vec<ExecutionReport> {
        commands
            .iter()
            .filter_map(|c| self.dispatch(user, definition, c))
            .collect()
    }

    /// The only path to the executor.
    fn dispatch(
        &self,
        user: &UserId,
        definition: &PersonaDefinition,
        command: &str,
    ) -> Option<ExecutionReport> {
        let expanded = expand_placeholders(command, user, definition);
        if !leading_token(&expanded).is_some_and(|name| definition.allows(name)) {
            warn!(persona = %definition.id, command = %expanded, "expanded command not allow-listed, dropped");
            counter!(COMMANDS_REJECTED_TOTAL).increment(1);
            return None;
        }
        let outcome = self.executor.execute(&expanded, user);
        let label = if outcome.success { "success" } else { "failure" };
        counter!(COMMANDS_EXECUTED_TOTAL, "outcome" => label).increment(1);
        if outcome.success {
            info!(user = %user, command = %expanded, "command executed");
        } else {
            warn!(user = %user, command = %expanded, output = %outcome.output, "command failed");
        }
        self.audit(
            user,
            definition,
            AuditRecord::CommandExecution {
                command: expanded.clone(),
                success: outcome.success,
                result: outcome.output.clone(),
            },
        );
        Some(ExecutionReport {
            command: expanded,
            success: outcome.success,
            output: outcome.output,
        })
    }

    fn audit(&self, user: &UserId, definition: &PersonaDefinition, record: AuditRecord) {
        if let Err(e) = self.store.append(user, &definition.id, &record.into_entry()) {
            error!(user = %user, persona = %definition.id, error = %e, "audit write failed");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

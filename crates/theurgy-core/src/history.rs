//! Conversation history model.
//!
//! History is an append-only log of [`HistoryEntry`] values keyed by
//! (user, persona). Dialogue lines come from the user and the persona;
//! audit lines are produced by command arbitration and are rendered from
//! the closed [`AuditRecord`] variant set.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persona::JudgmentTier;

/// Who produced a history line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Speaker {
    /// The human actor.
    User,
    /// The persona's generated reply.
    Persona,
    /// Command execution audit line.
    SystemDebug,
    /// Auto-judgment decision audit line.
    AiDecision,
}

impl Speaker {
    /// Column value stored in `SQLite`.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Persona => "persona",
            Self::SystemDebug => "system_debug",
            Self::AiDecision => "ai_decision",
        }
    }

    /// Parse a stored column value.
    pub fn from_sql(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "persona" => Some(Self::Persona),
            "system_debug" => Some(Self::SystemDebug),
            "ai_decision" => Some(Self::AiDecision),
            _ => None,
        }
    }

    /// Audit lines never appear in prompts.
    pub fn is_audit(self) -> bool {
        matches!(self, Self::SystemDebug | Self::AiDecision)
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::User => "USER",
            Self::Persona => "PERSONA",
            Self::SystemDebug => "SYSTEM_DEBUG",
            Self::AiDecision => "AI_DECISION",
        };
        f.write_str(label)
    }
}

/// One immutable history line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Author of the line.
    pub speaker: Speaker,
    /// Line content.
    pub text: String,
    /// When the line was written.
    pub timestamp: DateTime<Utc>,
    /// Executor verdict; set on command execution lines only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl HistoryEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self::at(speaker, text, Utc::now())
    }

    /// Create an entry with an explicit timestamp.
    #[must_use]
    pub fn at(speaker: Speaker, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp,
            success: None,
        }
    }

    /// Attach an executor verdict.
    #[must_use]
    pub fn with_success(mut self, success: Option<bool>) -> Self {
        self.success = success;
        self
    }
}

/// Prefix of every rendered command execution audit line.
pub const COMMAND_EXECUTION_PREFIX: &str = "COMMAND_EXECUTION: ";

/// Audit facts recorded next to the dialogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuditRecord {
    /// A command was handed to the executor.
    CommandExecution {
        /// The command as executed (placeholders expanded).
        command: String,
        /// Executor verdict.
        success: bool,
        /// Executor output.
        result: String,
    },
    /// An auto-judgment picked a tier.
    Decision {
        /// Selected tier.
        tier: JudgmentTier,
        /// Human-readable threshold comparison.
        reasoning: String,
        /// Commands chosen for execution.
        commands: Vec<String>,
    },
}

impl AuditRecord {
    /// Speaker under which this record is stored.
    pub fn speaker(&self) -> Speaker {
        match self {
            Self::CommandExecution { .. } => Speaker::SystemDebug,
            Self::Decision { .. } => Speaker::AiDecision,
        }
    }

    /// Render the single-line text form.
    pub fn render(&self) -> String {
        match self {
            Self::CommandExecution {
                command,
                success,
                result,
            } => format!("{COMMAND_EXECUTION_PREFIX}{command} | SUCCESS: {success} | RESULT: {result}"),
            Self::Decision {
                tier,
                reasoning,
                commands,
            } => {
                let joined = if commands.is_empty() {
                    "none".to_string()
                } else {
                    commands.join(", ")
                };
                format!("TYPE: {tier} | REASONING: {reasoning} | COMMANDS: {joined}")
            }
        }
    }

    /// Executor verdict of a command execution, `None` for decisions.
    pub fn success(&self) -> Option<bool> {
        match self {
            Self::CommandExecution { success, .. } => Some(*success),
            Self::Decision { .. } => None,
        }
    }

    /// Convert into a history entry stamped now.
    #[must_use]
    pub fn into_entry(self) -> HistoryEntry {
        HistoryEntry::new(self.speaker(), self.render()).with_success(self.success())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Prompt composition.
//!
//! [`PromptCompositor::compose`] is a pure function of its input: identical
//! inputs always produce identical text. The trust-derived tone is returned
//! separately so providers can send it as a system instruction.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use theurgy_core::history::{HistoryEntry, Speaker};

/// Dialogue lines included when nothing else is configured.
pub const DEFAULT_HISTORY_WINDOW: usize = 6;

/// Everything one prompt is built from.
#[derive(Clone, Debug)]
pub struct PromptInput<'a> {
    /// Persona name.
    pub persona_name: &'a str,
    /// Static persona description.
    pub description: &'a str,
    /// Trust-derived tone.
    pub tone: Option<&'a str>,
    /// Name the user is addressed by.
    pub user_name: &'a str,
    /// Rank title for the user's trust.
    pub rank: &'a str,
    /// Current trust score.
    pub trust: i32,
    /// Environmental description; blank when unknown.
    pub context: &'a str,
    /// Prior entries, oldest first. Audit entries are ignored.
    pub history: &'a [HistoryEntry],
    /// The user's current line.
    pub utterance: &'a str,
    /// Allow-listed command names, when the persona has any.
    pub vocabulary: Option<&'a BTreeSet<String>>,
    /// Commands the turn may yield.
    pub max_commands: u32,
}

/// Output of [`PromptCompositor::compose`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedPrompt {
    /// System instruction: the tone text, if any.
    pub system_tone: Option<String>,
    /// User-turn text.
    pub text: String,
}

/// Builds prompts with a bounded history window.
#[derive(Clone, Copy, Debug)]
pub struct PromptCompositor {
    history_window: usize,
}

impl Default for PromptCompositor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl PromptCompositor {
    /// Compositor keeping the last `history_window` dialogue lines.
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    /// Configured window.
    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Assemble the prompt.
    pub fn compose(&self, input: &PromptInput<'_>) -> ComposedPrompt {
        let mut text = String::new();
        let name = input.persona_name;

        let _ = write!(text, "You are {name}.");
        let description = input.description.trim();
        if !description.is_empty() {
            let _ = write!(text, " {description}");
        }
        let _ = write!(
            text,
            "\nYou are speaking with {}, who holds the rank of {} (trust {}).",
            input.user_name, input.rank, input.trust
        );

        let context = input.context.trim();
        if !context.is_empty() {
            let _ = write!(text, "\n\nTheir surroundings: {context}");
        }

        let window = self.window(input.history);
        if window.is_empty() {
            text.push_str("\n\nThis is your first exchange with them.");
        } else {
            text.push_str("\n\nRecent conversation:");
            for entry in window {
                let label = match entry.speaker {
                    Speaker::User => input.user_name,
                    _ => name,
                };
                let _ = write!(text, "\n{label}: {}", entry.text);
            }
        }

        let _ = write!(
            text,
            "\n\n{} says: \"{}\"\n\nRespond as {name}, in character.",
            input.user_name,
            input.utterance.trim()
        );

        if let Some(vocabulary) = input.vocabulary.filter(|v| !v.is_empty())
            && input.max_commands > 0
        {
            let names: Vec<&str> = vocabulary.iter().map(String::as_str).collect();
            let _ = write!(
                text,
                "\n\nIf it fits the conversation you may invoke up to {} command(s). \
                 Available commands: {}.\nFormat each on its own line as: Command: /name args",
                input.max_commands,
                names.join(", ")
            );
        }

        ComposedPrompt {
            system_tone: input
                .tone
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            text,
        }
    }

    fn window<'h>(&self, history: &'h [HistoryEntry]) -> Vec<&'h HistoryEntry> {
        let dialogue: Vec<_> = history.iter().filter(|e| !e.speaker.is_audit()).collect();
        let skip = dialogue.len().saturating_sub(self.history_window);
        dialogue.into_iter().skip(skip).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Conversation and history settings.

use serde::{Deserialize, Serialize};

/// History retention and prompt window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistorySettings {
    /// Entries kept per (user, persona) before head trimming.
    pub max_entries: usize,
    /// Dialogue lines included in each prompt.
    pub prompt_window: usize,
    /// `SQLite` database file.
    pub database_path: String,
}

impl Default for HistorySettings {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            max_entries: 1000,
            prompt_window: 6,
            database_path: format!("{home}/.theurgy/history.db"),
        }
    }
}

/// Conversation control surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Sessions idle longer than this are ended.
    pub idle_timeout_seconds: u64,
    /// Case-insensitive substrings that end a conversation.
    pub end_phrases: Vec<String>,
    /// Case-insensitive prefixes that accept pending commands.
    pub accept_prefixes: Vec<String>,
    /// Case-insensitive prefixes that decline pending commands.
    pub decline_prefixes: Vec<String>,
    /// Utterance used to request the opening greeting.
    pub greeting_prompt: String,
    /// Greeting used when generation fails. `{persona}` is replaced by the persona name.
    pub greeting_fallback: String,
    /// In-character line shown on any generation failure.
    pub failure_line: String,
    /// Line shown when a session ends.
    pub farewell_line: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 600,
            end_phrases: ["goodbye", "end", "farewell", "stop"]
                .map(String::from)
                .to_vec(),
            accept_prefixes: ["yes", "accept"].map(String::from).to_vec(),
            decline_prefixes: ["no", "decline"].map(String::from).to_vec(),
            greeting_prompt: "A mortal approaches and kneels in prayer. Greet them.".to_string(),
            greeting_fallback: "{persona} turns their gaze upon you.".to_string(),
            failure_line: "The divine connection falters... your words drift unanswered."
                .to_string(),
            farewell_line: "{persona} withdraws their presence.".to_string(),
        }
    }
}

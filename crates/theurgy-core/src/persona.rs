//! Persona definitions and their static policy.
//!
//! A [`PersonaDefinition`] is what the definition loader hands over for each
//! persona: descriptive text, trust-keyed tone tiers and rank stages, and a
//! [`PersonaPolicy`] whose values are all optional. Missing values fall
//! through to runtime overrides or system defaults at read time.
//!
//! Runtime admin overrides are carried in [`RuntimeOverrides`] and addressed
//! by [`OverrideKey`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::PersonaId;

/// Which static command list an auto-judgment draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgmentTier {
    /// Trust at or above the blessing threshold.
    Blessing,
    /// Trust strictly between the thresholds.
    Neutral,
    /// Trust at or below the curse threshold.
    Curse,
}

impl JudgmentTier {
    /// Place a trust score relative to the two thresholds.
    ///
    /// The blessing comparison wins when misconfigured thresholds overlap.
    pub fn classify(trust: i32, blessing_threshold: i32, curse_threshold: i32) -> Self {
        if trust >= blessing_threshold {
            Self::Blessing
        } else if trust <= curse_threshold {
            Self::Curse
        } else {
            Self::Neutral
        }
    }
}

impl fmt::Display for JudgmentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Blessing => "BLESSING",
            Self::Neutral => "NEUTRAL",
            Self::Curse => "CURSE",
        };
        f.write_str(label)
    }
}

/// Static auto-judgment configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JudgmentPolicy {
    /// Minimum trust for the blessing list.
    pub blessing_threshold: Option<i32>,
    /// Maximum trust for the curse list.
    pub curse_threshold: Option<i32>,
    /// Commands run for a blessing.
    pub blessing: Vec<String>,
    /// Commands run between the thresholds.
    pub neutral: Vec<String>,
    /// Commands run for a curse.
    pub curse: Vec<String>,
}

impl JudgmentPolicy {
    /// The static command list for a tier.
    pub fn commands_for(&self, tier: JudgmentTier) -> &[String] {
        match tier {
            JudgmentTier::Blessing => &self.blessing,
            JudgmentTier::Neutral => &self.neutral,
            JudgmentTier::Curse => &self.curse,
        }
    }
}

/// Static per-persona policy as written in the definition file.
///
/// Numeric values are signed so that a definition can carry `0` or a negative
/// number to mean "unset"; the resolvers decide which tiers accept them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonaPolicy {
    /// Minutes between conversations.
    pub cooldown_minutes: Option<i64>,
    /// Minimum trust to start a conversation.
    pub reputation_required: Option<i32>,
    /// Maximum commands executed or suggested per turn.
    pub max_commands_per_turn: Option<i64>,
    /// Command names (leading token, no `/`) the persona may trigger.
    pub allowed_commands: BTreeSet<String>,
    /// Select commands by trust thresholds instead of generated suggestions.
    pub auto_judge: Option<bool>,
    /// Thresholds and command lists for auto-judgment.
    pub judgment: JudgmentPolicy,
    /// Generation model used for this persona.
    pub model: Option<String>,
}

/// Everything known about one persona.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaDefinition {
    /// Definition key.
    pub id: PersonaId,
    /// Name shown to users.
    #[serde(default)]
    pub display_name: String,
    /// Static description fed to the prompt.
    #[serde(default)]
    pub description: String,
    /// Tone text keyed by minimum trust.
    #[serde(default)]
    pub tone_tiers: BTreeMap<i32, String>,
    /// Rank names keyed by minimum trust.
    #[serde(default)]
    pub ranks: BTreeMap<i32, String>,
    /// Static greeting used when a generated greeting is unavailable.
    #[serde(default)]
    pub greeting: Option<String>,
    /// Gating and command policy.
    #[serde(default)]
    pub policy: PersonaPolicy,
}

impl PersonaDefinition {
    /// Minimal definition with an empty policy.
    #[must_use]
    pub fn new(id: impl Into<PersonaId>, description: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.to_string(),
            id,
            description: description.into(),
            tone_tiers: BTreeMap::new(),
            ranks: BTreeMap::new(),
            greeting: None,
            policy: PersonaPolicy::default(),
        }
    }

    /// Name to address the persona by.
    pub fn name(&self) -> &str {
        if self.display_name.is_empty() {
            self.id.as_str()
        } else {
            &self.display_name
        }
    }

    /// Tone text of the highest tier whose threshold is at or below `trust`.
    pub fn tone_for(&self, trust: i32) -> Option<&str> {
        self.tone_tiers
            .range(..=trust)
            .next_back()
            .map(|(_, tone)| tone.as_str())
    }

    /// Rank title for `trust`, using the built-in ladder when no stages are defined.
    pub fn rank_for(&self, trust: i32) -> &str {
        if let Some((_, rank)) = self.ranks.range(..=trust).next_back() {
            return rank;
        }
        default_rank(trust)
    }

    /// Whether `name` is an allow-listed command name.
    pub fn allows(&self, name: &str) -> bool {
        self.policy.allowed_commands.contains(name)
    }
}

/// Rank ladder used when a persona defines no stages.
pub fn default_rank(trust: i32) -> &'static str {
    match trust {
        t if t >= 75 => "master",
        t if t >= 50 => "advanced",
        t if t >= 25 => "intermediate",
        t if t >= 10 => "novice",
        _ => "beginner",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime overrides
// ─────────────────────────────────────────────────────────────────────────────

/// A setting an admin can override at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKey {
    /// Conversation cooldown in minutes.
    CooldownMinutes,
    /// Minimum trust to converse.
    ReputationRequired,
    /// Commands per turn.
    MaxCommandsPerTurn,
    /// Auto-judge mode toggle.
    AutoJudge,
    /// Blessing threshold.
    BlessingThreshold,
    /// Curse threshold.
    CurseThreshold,
    /// Generation model.
    Model,
}

impl OverrideKey {
    /// Every key, in display order.
    pub const ALL: [Self; 7] = [
        Self::CooldownMinutes,
        Self::ReputationRequired,
        Self::MaxCommandsPerTurn,
        Self::AutoJudge,
        Self::BlessingThreshold,
        Self::CurseThreshold,
        Self::Model,
    ];

    /// Column value stored in `SQLite`.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::CooldownMinutes => "cooldown_minutes",
            Self::ReputationRequired => "reputation_required",
            Self::MaxCommandsPerTurn => "max_commands_per_turn",
            Self::AutoJudge => "auto_judge",
            Self::BlessingThreshold => "blessing_threshold",
            Self::CurseThreshold => "curse_threshold",
            Self::Model => "model",
        }
    }

    /// Parse a stored column value.
    pub fn from_sql(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_sql() == value)
    }
}

impl fmt::Display for OverrideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Rejected override value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for override {key}")]
pub struct OverrideError {
    /// Setting being overridden.
    pub key: OverrideKey,
    /// Raw value supplied.
    pub value: String,
}

/// Admin overrides for one persona, highest-precedence tier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOverrides {
    /// Cooldown minutes. Zero disables the cooldown.
    pub cooldown_minutes: Option<u32>,
    /// Minimum trust.
    pub reputation_required: Option<i32>,
    /// Commands per turn. Zero disables commands.
    pub max_commands_per_turn: Option<u32>,
    /// Auto-judge toggle.
    pub auto_judge: Option<bool>,
    /// Blessing threshold.
    pub blessing_threshold: Option<i32>,
    /// Curse threshold.
    pub curse_threshold: Option<i32>,
    /// Generation model.
    pub model: Option<String>,
}

impl RuntimeOverrides {
    /// Parse `raw` and store it under `key`.
    pub fn apply(&mut self, key: OverrideKey, raw: &str) -> Result<(), OverrideError> {
        let raw = raw.trim();
        let invalid = || OverrideError {
            key,
            value: raw.to_string(),
        };
        match key {
            OverrideKey::CooldownMinutes => {
                self.cooldown_minutes = Some(raw.parse().map_err(|_| invalid())?);
            }
            OverrideKey::ReputationRequired => {
                self.reputation_required = Some(raw.parse().map_err(|_| invalid())?);
            }
            OverrideKey::MaxCommandsPerTurn => {
                self.max_commands_per_turn = Some(raw.parse().map_err(|_| invalid())?);
            }
            OverrideKey::AutoJudge => {
                self.auto_judge = Some(parse_flag(raw).ok_or_else(invalid)?);
            }
            OverrideKey::BlessingThreshold => {
                self.blessing_threshold = Some(raw.parse().map_err(|_| invalid())?);
            }
            OverrideKey::CurseThreshold => {
                self.curse_threshold = Some(raw.parse().map_err(|_| invalid())?);
            }
            OverrideKey::Model => {
                if raw.is_empty() {
                    return Err(invalid());
                }
                self.model = Some(raw.to_string());
            }
        }
        Ok(())
    }

    /// Whether no override is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

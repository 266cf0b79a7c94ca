//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may contain any subset of fields; missing ones take their defaults.

mod generation;
mod session;

pub use generation::*;
pub use session::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TheurgySettings {
    /// Settings schema version.
    pub version: String,
    /// Generation provider settings.
    pub generation: GenerationSettings,
    /// History retention.
    pub history: HistorySettings,
    /// Conversation control surface.
    pub session: SessionSettings,
    /// Process-wide limits.
    pub limits: LimitSettings,
    /// Logging output.
    pub logging: LoggingSettings,
}

impl Default for TheurgySettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            generation: GenerationSettings::default(),
            history: HistorySettings::default(),
            session: SessionSettings::default(),
            limits: LimitSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl TheurgySettings {
    /// Clamp out-of-range values, warning for each correction.
    pub fn validate(&mut self) {
        fn clamp_f64(val: &mut f64, min: f64, max: f64, name: &str) {
            if *val < min || *val > max || val.is_nan() {
                let clamped = if val.is_nan() { min } else { val.clamp(min, max) };
                tracing::warn!("{name} out of range ({val}), clamped to {clamped}");
                *val = clamped;
            }
        }

        let g = &mut self.generation;
        clamp_f64(&mut g.temperature, 0.0, 2.0, "temperature");
        clamp_f64(&mut g.top_p, 0.0, 1.0, "top_p");
        if g.timeout_seconds == 0 {
            tracing::warn!("timeout_seconds is 0, using 1");
            g.timeout_seconds = 1;
        }
        if g.max_output_tokens == 0 {
            tracing::warn!("max_output_tokens is 0, using {HARD_MAX_OUTPUT_TOKENS}");
            g.max_output_tokens = HARD_MAX_OUTPUT_TOKENS;
        }

        let h = &mut self.history;
        if h.max_entries == 0 {
            tracing::warn!("history max_entries is 0, using 1");
            h.max_entries = 1;
        }
        if h.prompt_window > h.max_entries {
            tracing::warn!(
                "prompt_window ({}) exceeds max_entries ({}), correcting",
                h.prompt_window,
                h.max_entries
            );
            h.prompt_window = h.max_entries;
        }

        let s = &mut self.session;
        for list in [
            &mut s.end_phrases,
            &mut s.accept_prefixes,
            &mut s.decline_prefixes,
        ] {
            list.retain(|p| !p.trim().is_empty());
            for phrase in list.iter_mut() {
                *phrase = phrase.trim().to_lowercase();
            }
        }
        if self.limits.cooldown_gc_interval_seconds == 0 {
            self.limits.cooldown_gc_interval_seconds = 1;
        }
    }
}

/// Process-wide limits applied on top of per-persona policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitSettings {
    /// Ceiling on commands per turn after override resolution.
    pub global_max_commands: Option<u32>,
    /// How often stale cooldown records are swept.
    pub cooldown_gc_interval_seconds: u64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            global_max_commands: None,
            cooldown_gc_interval_seconds: 300,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Three-tier policy resolution.
//!
//! Every setting resolves as runtime override > static definition > system
//! default. Each setting has one pure resolver; [`EffectivePolicy`] applies
//! all of them and [`TrustLedger`] feeds them from the durable override
//! store. Resolution always yields a value.
//!
//! Static cooldown and command limits only count when positive. Other static
//! values count whenever present.

use std::fmt;
use std::sync::Arc;

use theurgy_core::ids::{PersonaId, UserId};
use theurgy_core::persona::{OverrideKey, PersonaDefinition, PersonaPolicy, RuntimeOverrides};
use theurgy_store::{Store, StoreError};
use tracing::{info, warn};

use crate::boundary::TrustSource;

/// Conversation cooldown when nothing else is configured.
pub const DEFAULT_COOLDOWN_MINUTES: u32 = 30;
/// Commands per turn when nothing else is configured.
pub const DEFAULT_MAX_COMMANDS_PER_TURN: u32 = 3;
/// Trust needed to converse when nothing else is configured.
pub const DEFAULT_REPUTATION_REQUIRED: i32 = 0;
/// Auto-judge mode when nothing else is configured.
pub const DEFAULT_AUTO_JUDGE: bool = false;
/// Blessing threshold when nothing else is configured.
pub const DEFAULT_BLESSING_THRESHOLD: i32 = 10;
/// Curse threshold when nothing else is configured.
pub const DEFAULT_CURSE_THRESHOLD: i32 = -5;

/// Tier a resolved value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// Admin override.
    Runtime,
    /// Persona definition.
    Static,
    /// Built-in default.
    Default,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Runtime => "runtime",
            Self::Static => "static",
            Self::Default => "default",
        })
    }
}

/// A resolved setting and where it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved<T> {
    /// Effective value.
    pub value: T,
    /// Winning tier.
    pub source: Source,
}

impl<T> Resolved<T> {
    fn runtime(value: T) -> Self {
        Self {
            value,
            source: Source::Runtime,
        }
    }

    fn fixed(value: T) -> Self {
        Self {
            value,
            source: Source::Static,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            source: Source::Default,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolvers
// ─────────────────────────────────────────────────────────────────────────────

/// Generic precedence for settings whose static value counts when present.
pub fn resolve<T>(runtime: Option<T>, fixed: Option<T>, default: T) -> Resolved<T> {
    match (runtime, fixed) {
        (Some(v), _) => Resolved::runtime(v),
        (None, Some(v)) => Resolved::fixed(v),
        (None, None) => Resolved::fallback(default),
    }
}

fn positive(value: Option<i64>) -> Option<u32> {
    value
        .filter(|v| *v > 0)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
}

/// Conversation cooldown in minutes.
pub fn resolve_cooldown(runtime: Option<u32>, fixed: Option<i64>, default: u32) -> Resolved<u32> {
    resolve(runtime, positive(fixed), default)
}

/// Commands per turn, capped by the process-wide ceiling.
pub fn resolve_max_commands(
    runtime: Option<u32>,
    fixed: Option<i64>,
    default: u32,
    ceiling: Option<u32>,
) -> Resolved<u32> {
    let mut resolved = resolve(runtime, positive(fixed), default);
    if let Some(ceiling) = ceiling {
        resolved.value = resolved.value.min(ceiling);
    }
    resolved
}

/// Minimum trust to converse.
pub fn resolve_reputation(runtime: Option<i32>, fixed: Option<i32>, default: i32) -> Resolved<i32> {
    resolve(runtime, fixed, default)
}

/// Auto-judge toggle.
pub fn resolve_auto_judge(runtime: Option<bool>, fixed: Option<bool>, default: bool) -> Resolved<bool> {
    resolve(runtime, fixed, default)
}

/// A judgment threshold.
pub fn resolve_threshold(runtime: Option<i32>, fixed: Option<i32>, default: i32) -> Resolved<i32> {
    resolve(runtime, fixed, default)
}

/// Generation model. Blank static values are ignored.
pub fn resolve_model(runtime: Option<&str>, fixed: Option<&str>, default: &str) -> Resolved<String> {
    let fixed = fixed.map(str::trim).filter(|m| !m.is_empty());
    let resolved = resolve(runtime, fixed, default);
    Resolved {
        value: resolved.value.to_string(),
        source: resolved.source,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EffectivePolicy
// ─────────────────────────────────────────────────────────────────────────────

/// One line of a configuration summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingSummary {
    /// Setting.
    pub key: OverrideKey,
    /// Rendered effective value.
    pub value: String,
    /// Winning tier.
    pub source: Source,
}

impl fmt::Display for SettingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} ({})", self.key, self.value, self.source)
    }
}

/// Every setting of one persona after resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectivePolicy {
    /// Conversation cooldown.
    pub cooldown_minutes: Resolved<u32>,
    /// Minimum trust to converse.
    pub reputation_required: Resolved<i32>,
    /// Commands per turn.
    pub max_commands_per_turn: Resolved<u32>,
    /// Auto-judge toggle.
    pub auto_judge: Resolved<bool>,
    /// Blessing threshold.
    pub blessing_threshold: Resolved<i32>,
    /// Curse threshold.
    pub curse_threshold: Resolved<i32>,
    /// Generation model.
    pub model: Resolved<String>,
}

impl EffectivePolicy {
    /// Resolve a static policy against runtime overrides.
    pub fn resolve(
        policy: &PersonaPolicy,
        overrides: &RuntimeOverrides,
        ceiling: Option<u32>,
        default_model: &str,
    ) -> Self {
        Self {
            cooldown_minutes: resolve_cooldown(
                overrides.cooldown_minutes,
                policy.cooldown_minutes,
                DEFAULT_COOLDOWN_MINUTES,
            ),
            reputation_required: resolve_reputation(
                overrides.reputation_required,
                policy.reputation_required,
                DEFAULT_REPUTATION_REQUIRED,
            ),
            max_commands_per_turn: resolve_max_commands(
                overrides.max_commands_per_turn,
                policy.max_commands_per_turn,
                DEFAULT_MAX_COMMANDS_PER_TURN,
                ceiling,
            ),
            auto_judge: resolve_auto_judge(
                overrides.auto_judge,
                policy.auto_judge,
                DEFAULT_AUTO_JUDGE,
            ),
            blessing_threshold: resolve_threshold(
                overrides.blessing_threshold,
                policy.judgment.blessing_threshold,
                DEFAULT_BLESSING_THRESHOLD,
            ),
            curse_threshold: resolve_threshold(
                overrides.curse_threshold,
                policy.judgment.curse_threshold,
                DEFAULT_CURSE_THRESHOLD,
            ),
            model: resolve_model(
                overrides.model.as_deref(),
                policy.model.as_deref(),
                default_model,
            ),
        }
    }

    /// Every setting with its value and tier, in [`OverrideKey::ALL`] order.
    pub fn summary(&self) -> Vec<SettingSummary> {
        OverrideKey::ALL
            .into_iter()
            .map(|key| {
                let (value, source) = match key {
                    OverrideKey::CooldownMinutes => render(&self.cooldown_minutes),
                    OverrideKey::ReputationRequired => render(&self.reputation_required),
                    OverrideKey::MaxCommandsPerTurn => render(&self.max_commands_per_turn),
                    OverrideKey::AutoJudge => render(&self.auto_judge),
                    OverrideKey::BlessingThreshold => render(&self.blessing_threshold),
                    OverrideKey::CurseThreshold => render(&self.curse_threshold),
                    OverrideKey::Model => render(&self.model),
                };
                SettingSummary { key, value, source }
            })
            .collect()
    }
}

fn render<T: fmt::Display>(resolved: &Resolved<T>) -> (String, Source) {
    (resolved.value.to_string(), resolved.source)
}

// ─────────────────────────────────────────────────────────────────────────────
// TrustLedger
// ─────────────────────────────────────────────────────────────────────────────

/// Trust reads plus effective policy backed by the durable override tier.
pub struct TrustLedger {
    trust: Arc<dyn TrustSource>,
    store: Arc<Store>,
    global_max_commands: Option<u32>,
    default_model: String,
}

impl TrustLedger {
    /// Ledger over a trust source and the override store.
    pub fn new(
        trust: Arc<dyn TrustSource>,
        store: Arc<Store>,
        global_max_commands: Option<u32>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            trust,
            store,
            global_max_commands,
            default_model: default_model.into(),
        }
    }

    /// Current trust score. Never written by this crate.
    pub fn trust(&self, user: &UserId, persona: &PersonaId) -> i32 {
        self.trust.trust(user, persona)
    }

    /// Resolve every setting for a persona.
    ///
    /// An unreadable override store degrades to static and default tiers.
    pub fn effective_policy(&self, def: &PersonaDefinition) -> EffectivePolicy {
        let overrides = self.store.runtime_overrides(&def.id).unwrap_or_else(|e| {
            warn!(persona = %def.id, error = %e, "override store unreadable, ignoring runtime tier");
            RuntimeOverrides::default()
        });
        EffectivePolicy::resolve(
            &def.policy,
            &overrides,
            self.global_max_commands,
            &self.default_model,
        )
    }

    /// Minimum trust to converse.
    pub fn effective_trust_requirement(&self, def: &PersonaDefinition) -> i32 {
        self.effective_policy(def).reputation_required.value
    }

    /// Conversation cooldown in minutes.
    pub fn effective_cooldown(&self, def: &PersonaDefinition) -> u32 {
        self.effective_policy(def).cooldown_minutes.value
    }

    /// Commands per turn after the global ceiling.
    pub fn effective_max_commands(&self, def: &PersonaDefinition) -> u32 {
        self.effective_policy(def).max_commands_per_turn.value
    }

    /// Blessing and curse thresholds.
    pub fn effective_judgment_threshold(&self, def: &PersonaDefinition) -> (i32, i32) {
        let policy = self.effective_policy(def);
        (policy.blessing_threshold.value, policy.curse_threshold.value)
    }

    /// Every effective setting with its tier.
    pub fn configuration_summary(&self, def: &PersonaDefinition) -> Vec<SettingSummary> {
        self.effective_policy(def).summary()
    }

    /// Persist an admin override.
    pub fn set_override(
        &self,
        persona: &PersonaId,
        key: OverrideKey,
        value: &str,
    ) -> Result<(), StoreError> {
        self.store.set_override(persona, key, value)?;
        info!(persona = %persona, key = %key, value, "runtime override set");
        Ok(())
    }

    /// Remove an admin override. Returns whether one existed.
    pub fn clear_override(&self, persona: &PersonaId, key: OverrideKey) -> Result<bool, StoreError> {
        let existed = self.store.clear_override(persona, key)?;
        if existed {
            info!(persona = %persona, key = %key, "runtime override cleared");
        }
        Ok(existed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use theurgy_store::StoreConfig;

    use crate::testutil::FixedTrust;

    // ── resolvers ──

    #[test]
    fn runtime_override_beats_static_and_default() {
        let r = resolve_cooldown(Some(5), Some(30), 30);
        assert_eq!(r.value, 5);
        assert_eq!(r.source, Source::Runtime);
    }

    #[test]
    fn runtime_zero_disables_cooldown() {
        assert_eq!(resolve_cooldown(Some(0), Some(30), 30).value, 0);
    }

    #[test]
    fn non_positive_static_falls_through() {
        for fixed in [Some(0), Some(-4), None] {
            let r = resolve_cooldown(None, fixed, 30);
            assert_eq!(r, Resolved { value: 30, source: Source::Default });
        }
        assert_eq!(resolve_cooldown(None, Some(12), 30).source, Source::Static);
    }

    #[test]
    fn ceiling_applies_after_resolution() {
        assert_eq!(resolve_max_commands(Some(9), None, 3, Some(2)).value, 2);
        assert_eq!(resolve_max_commands(None, Some(1), 3, Some(2)).value, 1);
        let r = resolve_max_commands(None, None, 3, None);
        assert_eq!(r.value, 3);
        assert_eq!(r.source, Source::Default);
    }

    #[test]
    fn negative_static_threshold_counts() {
        let r = resolve_threshold(None, Some(-20), DEFAULT_CURSE_THRESHOLD);
        assert_eq!(r, Resolved { value: -20, source: Source::Static });
    }

    #[test]
    fn blank_static_model_ignored() {
        let r = resolve_model(None, Some("  "), "gemini-1.5-pro");
        assert_eq!(r.value, "gemini-1.5-pro");
        assert_eq!(r.source, Source::Default);
        assert_eq!(resolve_model(Some("flash"), Some("pro"), "x").value, "flash");
    }

    proptest! {
        #[test]
        fn resolve_is_total_and_ordered(
            runtime in proptest::option::of(any::<i32>()),
            fixed in proptest::option::of(any::<i32>()),
            default in any::<i32>(),
        ) {
            let r = resolve(runtime, fixed, default);
            let expected = runtime.or(fixed).unwrap_or(default);
            prop_assert_eq!(r.value, expected);
        }
    }

    // ── effective policy ──

    fn definition() -> PersonaDefinition {
        let mut def = PersonaDefinition::new("storm", "god of thunder");
        def.policy.cooldown_minutes = Some(30);
        def.policy.reputation_required = Some(15);
        def.policy.judgment.curse_threshold = Some(-10);
        def
    }

    fn ledger(ceiling: Option<u32>) -> TrustLedger {
        let store = Arc::new(Store::open_in_memory(StoreConfig::default()).unwrap());
        TrustLedger::new(Arc::new(FixedTrust(7)), store, ceiling, "gemini-1.5-pro")
    }

    #[test]
    fn ledger_reads_durable_overrides() {
        let ledger = ledger(None);
        let def = definition();
        assert_eq!(ledger.effective_cooldown(&def), 30);
        ledger.set_override(&def.id, OverrideKey::CooldownMinutes, "5").unwrap();
        assert_eq!(ledger.effective_cooldown(&def), 5);
        assert!(ledger.clear_override(&def.id, OverrideKey::CooldownMinutes).unwrap());
        assert!(!ledger.clear_override(&def.id, OverrideKey::CooldownMinutes).unwrap());
        assert_eq!(ledger.effective_cooldown(&def), 30);
    }

    #[test]
    fn ledger_accessors() {
        let ledger = ledger(Some(1));
        let def = definition();
        assert_eq!(ledger.trust(&UserId::from("alex"), &def.id), 7);
        assert_eq!(ledger.effective_trust_requirement(&def), 15);
        assert_eq!(ledger.effective_max_commands(&def), 1);
        assert_eq!(ledger.effective_judgment_threshold(&def), (DEFAULT_BLESSING_THRESHOLD, -10));
    }

    #[test]
    fn summary_lists_every_key_with_source() {
        let ledger = ledger(None);
        let def = definition();
        ledger.set_override(&def.id, OverrideKey::AutoJudge, "yes").unwrap();
        let summary = ledger.configuration_summary(&def);
        assert_eq!(summary.len(), OverrideKey::ALL.len());
        let lines: Vec<_> = summary.iter().map(ToString::to_string).collect();
        assert_eq!(lines[0], "cooldown_minutes = 30 (static)");
        assert_eq!(lines[2], "max_commands_per_turn = 3 (default)");
        assert_eq!(lines[3], "auto_judge = true (runtime)");
        assert_eq!(lines[6], "model = gemini-1.5-pro (default)");
    }
}

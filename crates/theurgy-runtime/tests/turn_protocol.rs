//! End-to-end turn protocol tests against stub collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use theurgy_core::history::Speaker;
use theurgy_core::ids::{PersonaId, UserId};
use theurgy_core::persona::{OverrideKey, PersonaDefinition};
use theurgy_llm::{GenerationClient, GenerationError, GenerationRequest};
use theurgy_runtime::arbiter::{Disposition, PendingResolution};
use theurgy_runtime::boundary::{
    CommandExecutor, CommandOutcome, NoContext, PersonaCatalog, TrustSource,
};
use theurgy_runtime::{SessionError, SessionManager, SessionManagerDeps, TurnResult};
use theurgy_settings::TheurgySettings;
use theurgy_store::{Store, StoreConfig};
use tokio::sync::Notify;

// ─────────────────────────────────────────────────────────────────────────────
// Stubs
// ─────────────────────────────────────────────────────────────────────────────

struct Generator {
    reply: Mutex<Result<String, ()>>,
    calls: AtomicUsize,
    hold: Option<Arc<Notify>>,
}

impl Generator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(reply.to_string())),
            calls: AtomicUsize::new(0),
            hold: None,
        })
    }

    fn held(reply: &str, hold: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(reply.to_string())),
            calls: AtomicUsize::new(0),
            hold: Some(hold),
        })
    }

    fn fail_from_now(&self) {
        *self.reply.lock() = Err(());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for Generator {
    async fn complete(&self, _request: &GenerationRequest) -> theurgy_llm::Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        // The greeting (first call) is never held.
        if let Some(hold) = self.hold.as_ref().filter(|_| call > 0) {
            hold.notified().await;
        }
        self.reply
            .lock()
            .clone()
            .map_err(|()| GenerationError::Truncated)
    }
}

#[derive(Default)]
struct Executor {
    executed: Mutex<Vec<String>>,
}

impl CommandExecutor for Executor {
    fn execute(&self, command: &str, _acting_user: &UserId) -> CommandOutcome {
        self.executed.lock().push(command.to_string());
        if command.contains("fail") {
            CommandOutcome::failed("no such item")
        } else {
            CommandOutcome::ok("ok")
        }
    }
}

struct Trust(Mutex<i32>);

impl TrustSource for Trust {
    fn trust(&self, _user: &UserId, _persona: &PersonaId) -> i32 {
        *self.0.lock()
    }
}

struct Harness {
    manager: SessionManager,
    generator: Arc<Generator>,
    executor: Arc<Executor>,
    trust: Arc<Trust>,
}

fn storm() -> PersonaDefinition {
    let mut def = PersonaDefinition::new("storm", "God of thunder and judgment.");
    def.display_name = "Storm".into();
    def.policy.reputation_required = Some(10);
    def.policy.cooldown_minutes = Some(30);
    def.policy.allowed_commands = ["give", "effect"].map(String::from).into();
    def.policy.judgment.blessing_threshold = Some(40);
    def.policy.judgment.curse_threshold = Some(-20);
    def.policy.judgment.blessing = vec!["give {player} golden_apple".into()];
    def.policy.judgment.neutral = vec!["give {player} bread".into()];
    def.policy.judgment.curse = vec!["effect {player} slowness".into()];
    def
}

fn harness(generator: Arc<Generator>, trust: i32) -> Harness {
    let def = storm();
    let executor = Arc::new(Executor::default());
    let trust = Arc::new(Trust(Mutex::new(trust)));
    let manager = SessionManager::new(SessionManagerDeps {
        settings: TheurgySettings::default(),
        catalog: Arc::new(PersonaCatalog::new(HashMap::from([(def.id.clone(), def)]))),
        store: Arc::new(Store::open_in_memory(StoreConfig::default()).unwrap()),
        generator: generator.clone(),
        executor: executor.clone(),
        trust: trust.clone(),
        context: Arc::new(NoContext),
    });
    Harness {
        manager,
        generator,
        executor,
        trust,
    }
}

fn alex() -> UserId {
    UserId::from("alex")
}

fn persona() -> PersonaId {
    PersonaId::from("storm")
}

// ─────────────────────────────────────────────────────────────────────────────
// Gating
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn trust_gate_boundary_is_inclusive() {
    for (trust, admitted) in [(8, false), (9, false), (10, true), (11, true)] {
        let h = harness(Generator::new("Welcome."), trust);
        let result = h.manager.start_session(&alex(), &persona()).await;
        if admitted {
            assert!(result.is_ok(), "trust {trust} should be admitted");
        } else {
            assert_matches!(
                result,
                Err(SessionError::InsufficientTrust { required: 10, actual }) if actual == trust
            );
            assert_eq!(h.generator.calls(), 0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn trust_gate_admits_iff_trust_meets_requirement(trust in -50i32..50, required in -20i32..40) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let h = harness(Generator::new("Welcome."), trust);
        h.manager
            .ledger()
            .set_override(&persona(), OverrideKey::ReputationRequired, &required.to_string())
            .unwrap();
        let result = runtime.block_on(h.manager.start_session(&alex(), &persona()));
        prop_assert_eq!(result.is_ok(), trust >= required);
        if trust < required {
            prop_assert_eq!(h.generator.calls(), 0);
        }
    }
}

#[tokio::test]
async fn ending_applies_conversation_cooldown() {
    let h = harness(Generator::new("Welcome."), 20);
    let _ = h.manager.start_session(&alex(), &persona()).await.unwrap();
    assert!(h.manager.end_session(&alex()));
    let calls = h.generator.calls();

    let err = h.manager.start_session(&alex(), &persona()).await.unwrap_err();
    assert_matches!(err, SessionError::OnCooldown { remaining_minutes: 30 });
    assert_eq!(h.generator.calls(), calls);

    h.manager
        .ledger()
        .set_override(&persona(), OverrideKey::CooldownMinutes, "0")
        .unwrap();
    assert!(h.manager.start_session(&alex(), &persona()).await.is_ok());
}

#[tokio::test]
async fn end_session_twice_is_noop() {
    let h = harness(Generator::new("Welcome."), 20);
    let _ = h.manager.start_session(&alex(), &persona()).await.unwrap();
    assert!(h.manager.end_session(&alex()));
    assert!(!h.manager.end_session(&alex()));
    assert_matches!(
        h.manager.submit_utterance(&alex(), "hello?").await,
        Err(SessionError::NoActiveSession)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Suggest mode
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn suggest_accept_decline_cycle() {
    let reply = "Your devotion pleases me.\nCommand: /give {player} bread\nCommand: /op {player}\n/give {player} fail_item";
    let h = harness(Generator::new(reply), 20);
    let _ = h.manager.start_session(&alex(), &persona()).await.unwrap();

    let turn = h.manager.submit_utterance(&alex(), "I am hungry").await.unwrap();
    assert_eq!(
        turn,
        TurnResult::Reply {
            dialogue: "Your devotion pleases me.".into(),
            disposition: Disposition::Suggested(vec![
                "give {player} bread".into(),
                "give {player} fail_item".into(),
            ]),
        }
    );

    let accepted = h.manager.submit_utterance(&alex(), "yes please").await.unwrap();
    let TurnResult::Resolved(PendingResolution::Executed(reports)) = accepted else {
        panic!("expected execution, got {accepted:?}");
    };
    assert_eq!(reports.len(), 2);
    assert!(reports[0].success);
    assert!(!reports[1].success);
    assert_eq!(
        *h.executor.executed.lock(),
        ["give alex bread", "give alex fail_item"]
    );

    assert_eq!(
        h.manager.submit_utterance(&alex(), "yes").await.unwrap(),
        TurnResult::Resolved(PendingResolution::NothingPending)
    );

    let _ = h.manager.submit_utterance(&alex(), "Again?").await.unwrap();
    assert_eq!(
        h.manager.submit_utterance(&alex(), "No, thank you").await.unwrap(),
        TurnResult::Resolved(PendingResolution::Declined(2))
    );
    assert_eq!(h.executor.executed.lock().len(), 2);

    let report = h.manager.store().audit_report(&alex(), &persona()).unwrap();
    assert_eq!(report.commands_total, 2);
    assert_eq!(report.commands_failed(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Auto-judge
// ─────────────────────────────────────────────────────────────────────────────

async fn judged_turn(trust: i32) -> (Harness, TurnResult) {
    let h = harness(Generator::new("So it is decided.\nCommand: /give {player} diamond"), 20);
    h.manager
        .ledger()
        .set_override(&persona(), OverrideKey::AutoJudge, "true")
        .unwrap();
    let _ = h.manager.start_session(&alex(), &persona()).await.unwrap();
    *h.trust.0.lock() = trust;
    let result = h.manager.submit_utterance(&alex(), "Judge me").await.unwrap();
    (h, result)
}

#[tokio::test]
async fn auto_judge_at_blessing_threshold_uses_blessing_list() {
    let (h, result) = judged_turn(40).await;
    assert_matches!(
        result,
        TurnResult::Reply { disposition: Disposition::Executed(ref r), .. } if r.len() == 1
    );
    assert_eq!(*h.executor.executed.lock(), ["give alex golden_apple"]);
    let audit = h.manager.store().audit_entries(&alex(), &persona()).unwrap();
    assert_eq!(audit[0].speaker, Speaker::AiDecision);
    assert!(audit[0].text.starts_with("TYPE: BLESSING"));
}

#[tokio::test]
async fn auto_judge_below_curse_threshold_uses_curse_list() {
    let (h, _) = judged_turn(-21).await;
    assert_eq!(*h.executor.executed.lock(), ["effect alex slowness"]);
}

#[tokio::test]
async fn auto_judge_between_thresholds_uses_neutral_list() {
    let (h, _) = judged_turn(0).await;
    assert_eq!(*h.executor.executed.lock(), ["give alex bread"]);
    assert!(h.manager.pending_commands(&alex()).is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures and cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn generation_failure_falls_back_and_keeps_user_line() {
    let h = harness(Generator::new("Welcome."), 20);
    let _ = h.manager.start_session(&alex(), &persona()).await.unwrap();
    h.generator.fail_from_now();

    let result = h.manager.submit_utterance(&alex(), "Are you there?").await.unwrap();
    assert_eq!(
        result,
        TurnResult::Fallback {
            dialogue: "The divine connection falters... your words drift unanswered.".into()
        }
    );
    let history = h.manager.store().history(&alex(), &persona()).unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.speaker, Speaker::User);
    assert_eq!(last.text, "Are you there?");
    assert!(h.manager.active_session(&alex()).is_some());
}

#[tokio::test]
async fn result_for_ended_session_is_discarded() {
    let hold = Arc::new(Notify::new());
    let h = harness(Generator::held("Too late.", Arc::clone(&hold)), 20);
    let _ = h.manager.start_session(&alex(), &persona()).await.unwrap();

    let user = alex();
    let turn = h.manager.submit_utterance(&user, "Speak to me");
    let ender = async {
        while !h.manager.is_thinking(&user) {
            tokio::task::yield_now().await;
        }
        assert!(h.manager.end_session(&user));
        hold.notify_waiters();
    };
    let (result, ()) = tokio::join!(turn, ender);
    assert_eq!(result.unwrap(), TurnResult::Discarded);

    let history = h.manager.store().history(&alex(), &persona()).unwrap();
    assert_eq!(history.last().unwrap().text, "Speak to me");
    assert!(!h.manager.is_thinking(&alex()));
}

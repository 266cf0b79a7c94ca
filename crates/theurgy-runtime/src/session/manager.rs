//! `SessionManager`: drives the conversation turn protocol.
//!
//! Gating (unknown persona, trust, cooldown, missing session) is decided
//! synchronously before any generation request. The generation call runs on
//! a spawned task; the caller awaits it together with the turn's
//! cancellation token, so ending a session mid-turn drops the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use theurgy_core::history::{HistoryEntry, Speaker};
use theurgy_core::ids::{PersonaId, SessionId, UserId};
use theurgy_core::persona::PersonaDefinition;
use theurgy_core::text::preview;
use theurgy_llm::{GenerationClient, GenerationConfig, GenerationRequest, ParsedResponse};
use theurgy_settings::{GenerationSettings, SessionSettings, TheurgySettings};
use theurgy_store::Store;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::arbiter::{Arbitration, CommandArbiter, Disposition, PendingResolution};
use crate::boundary::{CommandExecutor, ContextProvider, PersonaCatalog, TrustSource};
use crate::errors::SessionError;
use crate::policy::{EffectivePolicy, TrustLedger};
use crate::prompt::{PromptCompositor, PromptInput};
use crate::rate_limiter::{RateLimiter, conversation_key};
use crate::session::store::{ConversationSession, SessionStore};
use crate::session::turn_tracker::{TurnTicket, TurnTracker};
use crate::telemetry::{
    GENERATION_FAILURES_TOTAL, SESSIONS_ACTIVE, SESSIONS_REAPED_TOTAL, TURNS_DISCARDED_TOTAL,
    TURNS_TOTAL,
};

/// Returned by [`SessionManager::start_session`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStartResult {
    /// New session identity.
    pub session_id: SessionId,
    /// Persona addressed.
    pub persona: PersonaId,
    /// Persona name for display.
    pub persona_name: String,
    /// Opening line.
    pub greeting: String,
    /// Whether the greeting came from the generator rather than a fallback.
    pub greeting_generated: bool,
}

/// Outcome of [`SessionManager::submit_utterance`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnResult {
    /// Generated reply and what happened to its commands.
    Reply {
        /// Persona dialogue.
        dialogue: String,
        /// Command outcome.
        disposition: Disposition,
    },
    /// Generation failed; the in-character failure line.
    Fallback {
        /// Line shown to the user.
        dialogue: String,
    },
    /// An accept or decline resolved the pending set.
    Resolved(PendingResolution),
    /// An end phrase closed the session.
    Ended {
        /// Closing line.
        farewell: String,
    },
    /// The session ended while the reply was generated; nothing to deliver.
    Discarded,
}

/// Collaborators and configuration for a [`SessionManager`].
pub struct SessionManagerDeps {
    /// Effective settings.
    pub settings: TheurgySettings,
    /// Loaded persona definitions.
    pub catalog: Arc<PersonaCatalog>,
    /// Durable history and overrides.
    pub store: Arc<Store>,
    /// Generation provider.
    pub generator: Arc<dyn GenerationClient>,
    /// Host command executor.
    pub executor: Arc<dyn CommandExecutor>,
    /// Host trust scores.
    pub trust: Arc<dyn TrustSource>,
    /// Host environment descriptions.
    pub context: Arc<dyn ContextProvider>,
}

enum GenerationOutcome {
    Reply(ParsedResponse),
    Failed(&'static str),
    Cancelled,
}

/// Releases a turn slot however the turn future ends.
struct TurnSlot<'a> {
    tracker: &'a TurnTracker,
    user: &'a UserId,
    turn_id: u64,
}

impl Drop for TurnSlot<'_> {
    fn drop(&mut self) {
        self.tracker.complete(self.user, self.turn_id);
    }
}

/// Top-level coordinator of conversations.
pub struct SessionManager {
    catalog: Arc<PersonaCatalog>,
    store: Arc<Store>,
    generator: Arc<dyn GenerationClient>,
    context: Arc<dyn ContextProvider>,
    ledger: TrustLedger,
    arbiter: CommandArbiter,
    sessions: Arc<SessionStore>,
    turns: TurnTracker,
    limiter: RateLimiter,
    compositor: PromptCompositor,
    generation: GenerationSettings,
    control: SessionSettings,
    gc_interval: Duration,
}

impl SessionManager {
    /// Wire a manager from its collaborators.
    pub fn new(deps: SessionManagerDeps) -> Self {
        let SessionManagerDeps {
            settings,
            catalog,
            store,
            generator,
            executor,
            trust,
            context,
        } = deps;
        let sessions = Arc::new(SessionStore::new());
        Self {
            ledger: TrustLedger::new(
                trust,
                Arc::clone(&store),
                settings.limits.global_max_commands,
                settings.generation.model.clone(),
            ),
            arbiter: CommandArbiter::new(executor, Arc::clone(&store), Arc::clone(&sessions)),
            catalog,
            store,
            generator,
            context,
            sessions,
            turns: TurnTracker::new(),
            limiter: RateLimiter::new(),
            compositor: PromptCompositor::new(settings.history.prompt_window),
            gc_interval: Duration::from_secs(settings.limits.cooldown_gc_interval_seconds.max(1)),
            generation: settings.generation,
            control: settings.session,
        }
    }

    /// Trust reads and override administration.
    pub fn ledger(&self) -> &TrustLedger {
        &self.ledger
    }

    /// Durable store, for history administration.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Cooldown tracker.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Loaded definitions.
    pub fn catalog(&self) -> &Arc<PersonaCatalog> {
        &self.catalog
    }

    /// The user's active session.
    pub fn active_session(&self, user: &UserId) -> Option<ConversationSession> {
        self.sessions.get(user)
    }

    /// Number of active sessions.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Commands awaiting the user's accept or decline.
    pub fn pending_commands(&self, user: &UserId) -> Option<Vec<String>> {
        self.sessions.pending_commands(user)
    }

    /// Whether a reply is being generated for the user.
    pub fn is_thinking(&self, user: &UserId) -> bool {
        self.turns.is_in_flight(user)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Start
    // ─────────────────────────────────────────────────────────────────────

    /// Open a conversation, replacing any prior one, and greet the user.
    ///
    /// A failed greeting falls back to the persona's static greeting or the
    /// configured fallback line.
    #[instrument(skip_all, fields(user = %user, persona = %persona))]
    pub async fn start_session(
        &self,
        user: &UserId,
        persona: &PersonaId,
    ) -> Result<SessionStartResult, SessionError> {
        let definition = self
            .catalog
            .get(persona)
            .ok_or_else(|| SessionError::UnknownPersona(persona.clone()))?;
        let policy = self.ledger.effective_policy(&definition);
        let trust = self.ledger.trust(user, persona);

        let required = policy.reputation_required.value;
        if trust < required {
            info!(trust, required, "conversation refused: insufficient trust");
            return Err(SessionError::InsufficientTrust {
                required,
                actual: trust,
            });
        }
        let status = self.limiter.can_act(
            user,
            &conversation_key(persona),
            policy.cooldown_minutes.value,
        );
        if !status.allowed {
            let remaining_minutes = status.remaining_minutes();
            info!(remaining_minutes, "conversation refused: on cooldown");
            return Err(SessionError::OnCooldown { remaining_minutes });
        }

        let session = ConversationSession::new(user.clone(), persona.clone());
        let session_id = session.id.clone();
        if let Some(prior) = self.sessions.insert(session) {
            debug!(prior = %prior.id, "replacing prior session");
            self.retire(user, &prior, "replaced");
        }
        gauge!(SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        info!(session_id = %session_id, trust, "session started");

        let generated = self.greet(user, &session_id, &definition, &policy, trust).await;
        if !self.sessions.is_current(user, &session_id) {
            debug!(session_id = %session_id, "session ended before greeting, discarded");
            counter!(TURNS_DISCARDED_TOTAL).increment(1);
            return Err(SessionError::SessionEnded);
        }
        let greeting_generated = generated.is_some();
        let greeting = generated.unwrap_or_else(|| {
            definition.greeting.clone().unwrap_or_else(|| {
                self.control
                    .greeting_fallback
                    .replace("{persona}", definition.name())
            })
        });
        if let Err(e) = self.store.append(
            user,
            persona,
            &HistoryEntry::new(Speaker::Persona, greeting.as_str()),
        ) {
            warn!(error = %e, "failed to record greeting");
        }

        Ok(SessionStartResult {
            session_id,
            persona: persona.clone(),
            persona_name: definition.name().to_string(),
            greeting,
            greeting_generated,
        })
    }

    async fn greet(
        &self,
        user: &UserId,
        session_id: &SessionId,
        definition: &PersonaDefinition,
        policy: &EffectivePolicy,
        trust: i32,
    ) -> Option<String> {
        let ticket = self.turns.begin(user, session_id).ok()?;
        let _slot = TurnSlot {
            tracker: &self.turns,
            user,
            turn_id: ticket.turn_id,
        };
        let history = self.dialogue_window(user, &definition.id);
        let request = self.request(
            user,
            definition,
            policy,
            trust,
            &history,
            &self.control.greeting_prompt,
            0,
        );
        match self.run_generation(ticket, request).await {
            GenerationOutcome::Reply(parsed) => {
                if !parsed.commands.is_empty() {
                    debug!(count = parsed.commands.len(), "greeting commands ignored");
                }
                Some(parsed.dialogue)
            }
            GenerationOutcome::Failed(kind) => {
                counter!(GENERATION_FAILURES_TOTAL, "kind" => kind).increment(1);
                None
            }
            GenerationOutcome::Cancelled => None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Turns
    // ─────────────────────────────────────────────────────────────────────

    /// Handle one line of user input.
    ///
    /// End phrases close the session. A first word matching an accept or
    /// decline prefix resolves the pending commands. Anything else is a
    /// generated turn; only one may be in flight per user.
    #[instrument(skip_all, fields(user = %user))]
    pub async fn submit_utterance(
        &self,
        user: &UserId,
        text: &str,
    ) -> Result<TurnResult, SessionError> {
        let session = self.sessions.get(user).ok_or(SessionError::NoActiveSession)?;
        self.sessions.touch(user);

        let lowered = text.to_lowercase();
        if self
            .control
            .end_phrases
            .iter()
            .any(|phrase| lowered.contains(phrase.as_str()))
        {
            let farewell = self.farewell(&session.persona);
            let _ = self.finish(user, "end phrase");
            return Ok(TurnResult::Ended { farewell });
        }

        let definition = match self.catalog.get(&session.persona) {
            Some(def) => def,
            None => {
                warn!(persona = %session.persona, "persona no longer defined, ending session");
                let _ = self.finish(user, "persona removed");
                return Err(SessionError::UnknownPersona(session.persona));
            }
        };

        let first = first_word(&lowered);
        if self.control.accept_prefixes.iter().any(|p| p == first) {
            return Ok(TurnResult::Resolved(self.arbiter.accept(user, &definition)));
        }
        if self.control.decline_prefixes.iter().any(|p| p == first) {
            return Ok(TurnResult::Resolved(self.arbiter.decline(user)));
        }

        let ticket = self.turns.begin(user, &session.id)?;
        let _slot = TurnSlot {
            tracker: &self.turns,
            user,
            turn_id: ticket.turn_id,
        };
        let _ = self.sessions.clear_pending(user);

        let policy = self.ledger.effective_policy(&definition);
        let trust = self.ledger.trust(user, &session.persona);
        let history = self.dialogue_window(user, &session.persona);
        self.store.append(
            user,
            &session.persona,
            &HistoryEntry::new(Speaker::User, text.trim()),
        )?;

        let max_commands = if policy.auto_judge.value {
            0
        } else {
            policy.max_commands_per_turn.value
        };
        let request = self.request(
            user,
            &definition,
            &policy,
            trust,
            &history,
            text,
            max_commands,
        );
        let outcome = self.run_generation(ticket, request).await;

        if matches!(outcome, GenerationOutcome::Cancelled)
            || !self.sessions.is_current(user, &session.id)
        {
            debug!(session_id = %session.id, "session ended mid-turn, result discarded");
            counter!(TURNS_DISCARDED_TOTAL).increment(1);
            return Ok(TurnResult::Discarded);
        }

        match outcome {
            GenerationOutcome::Reply(parsed) => {
                counter!(TURNS_TOTAL, "outcome" => "reply").increment(1);
                info!(
                    reply = %preview(&parsed.dialogue),
                    candidates = parsed.commands.len(),
                    "persona replied"
                );
                if let Err(e) = self.store.append(
                    user,
                    &session.persona,
                    &HistoryEntry::new(Speaker::Persona, parsed.dialogue.as_str()),
                ) {
                    error!(error = %e, "failed to record persona reply");
                }
                let disposition = self.arbiter.arbitrate(
                    &Arbitration {
                        user,
                        session_id: &session.id,
                        definition: &definition,
                        policy: &policy,
                        trust,
                    },
                    &parsed.commands,
                );
                Ok(TurnResult::Reply {
                    dialogue: parsed.dialogue,
                    disposition,
                })
            }
            GenerationOutcome::Failed(kind) => {
                counter!(TURNS_TOTAL, "outcome" => "fallback").increment(1);
                counter!(GENERATION_FAILURES_TOTAL, "kind" => kind).increment(1);
                Ok(TurnResult::Fallback {
                    dialogue: self.control.failure_line.clone(),
                })
            }
            GenerationOutcome::Cancelled => Ok(TurnResult::Discarded),
        }
    }

    fn dialogue_window(&self, user: &UserId, persona: &PersonaId) -> Vec<HistoryEntry> {
        self.store
            .recent_dialogue(user, persona, self.compositor.history_window())
            .unwrap_or_else(|e| {
                warn!(error = %e, "history unreadable, composing without it");
                Vec::new()
            })
    }

    fn request(
        &self,
        user: &UserId,
        definition: &PersonaDefinition,
        policy: &EffectivePolicy,
        trust: i32,
        history: &[HistoryEntry],
        utterance: &str,
        max_commands: u32,
    ) -> GenerationRequest {
        let context = self.context.describe(user);
        let vocabulary = &definition.policy.allowed_commands;
        let composed = self.compositor.compose(&PromptInput {
            persona_name: definition.name(),
            description: &definition.description,
            tone: definition.tone_for(trust),
            user_name: user.as_str(),
            rank: definition.rank_for(trust),
            trust,
            context: &context,
            history,
            utterance,
            vocabulary: Some(vocabulary),
            max_commands,
        });
        GenerationRequest {
            prompt: composed.text,
            system_tone: composed.system_tone,
            config: GenerationConfig::from_settings(&self.generation)
                .with_model(policy.model.value.as_str()),
            safety: self.generation.safety.clone(),
        }
    }

    async fn run_generation(&self, ticket: TurnTicket, request: GenerationRequest) -> GenerationOutcome {
        let generator = Arc::clone(&self.generator);
        let started = Instant::now();
        let mut handle = tokio::spawn(async move { generator.generate(&request).await });
        tokio::select! {
            () = ticket.cancel.cancelled() => {
                handle.abort();
                GenerationOutcome::Cancelled
            }
            joined = &mut handle => match joined {
                Ok(Ok(parsed)) => {
                    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "generation complete");
                    GenerationOutcome::Reply(parsed)
                }
                Ok(Err(e)) => {
                    warn!(error = %e, kind = e.kind(), "generation failed");
                    GenerationOutcome::Failed(e.kind())
                }
                Err(e) => {
                    error!(error = %e, "generation task aborted");
                    GenerationOutcome::Failed("task")
                }
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // End
    // ─────────────────────────────────────────────────────────────────────

    /// End the user's session. Returns whether one was active.
    ///
    /// Drops pending commands, cancels an in-flight turn and starts the
    /// conversation cooldown. A second call is a no-op.
    #[instrument(skip_all, fields(user = %user))]
    pub fn end_session(&self, user: &UserId) -> bool {
        self.finish(user, "ended")
    }

    fn finish(&self, user: &UserId, reason: &str) -> bool {
        let Some(session) = self.sessions.remove(user) else {
            return false;
        };
        self.retire(user, &session, reason);
        gauge!(SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        true
    }

    /// Cleanup for a session already out of the store: cancel its turn and
    /// start the conversation cooldown.
    fn retire(&self, user: &UserId, session: &ConversationSession, reason: &str) {
        let _ = self.turns.cancel(user);
        if let Some(definition) = self.catalog.get(&session.persona) {
            let minutes = self.ledger.effective_cooldown(&definition);
            if minutes > 0 {
                self.limiter
                    .record_action(user, &conversation_key(&session.persona), minutes);
            }
        }
        info!(user = %user, persona = %session.persona, session_id = %session.id, reason, "session ended");
    }

    fn farewell(&self, persona: &PersonaId) -> String {
        let name = self
            .catalog
            .get(persona)
            .map_or_else(|| persona.to_string(), |d| d.name().to_string());
        self.control.farewell_line.replace("{persona}", &name)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// End sessions idle past the configured timeout. Returns how many.
    pub fn reap_idle(&self) -> usize {
        let idle = Duration::from_secs(self.control.idle_timeout_seconds);
        let mut reaped = 0;
        for user in self.sessions.idle_sessions(Instant::now(), idle) {
            if self.finish(&user, "idle") {
                reaped += 1;
            }
        }
        if reaped > 0 {
            counter!(SESSIONS_REAPED_TOTAL).increment(reaped as u64);
            info!(reaped, "idle sessions reaped");
        }
        reaped
    }

    /// Swap in a new definition set and end sessions of removed personas.
    pub fn reload_definitions(
        &self,
        definitions: HashMap<PersonaId, PersonaDefinition>,
    ) -> Vec<PersonaId> {
        let removed = self.catalog.replace(definitions);
        for user in self.sessions.sessions_for_personas(&removed) {
            let _ = self.finish(&user, "persona removed");
        }
        info!(personas = self.catalog.len(), removed = removed.len(), "definitions reloaded");
        removed
    }

    /// Periodic idle reaping and cooldown garbage collection until `shutdown`.
    pub fn spawn_maintenance(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let reap_every =
            Duration::from_secs((manager.control.idle_timeout_seconds / 4).clamp(1, 60));
        tokio::spawn(async move {
            let mut reap = tokio::time::interval(reap_every);
            let mut gc = tokio::time::interval(manager.gc_interval);
            reap.set_missed_tick_behavior(MissedTickBehavior::Delay);
            gc.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = reap.tick() => {
                        let _ = manager.reap_idle();
                    }
                    _ = gc.tick() => {
                        let _ = manager.limiter.collect_garbage();
                    }
                }
            }
            debug!("maintenance task stopped");
        })
    }

    /// End every session.
    pub fn shutdown(&self) -> usize {
        let _ = self.turns.cancel_all();
        self.sessions
            .users()
            .iter()
            .filter(|user| self.finish(user, "shutdown"))
            .count()
    }
}

/// First word, lowercase input assumed, surrounding punctuation removed.
fn first_word(lowered: &str) -> &str {
    lowered
        .split_whitespace()
        .next()
        .map_or("", |w| w.trim_matches(|c: char| !c.is_alphanumeric()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Test doubles shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use theurgy_core::ids::{PersonaId, UserId};
use theurgy_llm::{GenerationClient, GenerationError, GenerationRequest};
use tokio::sync::Semaphore;

use crate::boundary::{CommandExecutor, CommandOutcome, TrustSource};

/// Generator returning a fixed reply, or failing.
pub struct StubGenerator {
    reply: Option<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Semaphore>,
    prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    fn build(reply: Option<&str>, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.map(str::to_string),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate: gated.then(|| Semaphore::new(0)),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(reply: &str) -> Arc<Self> {
        Self::build(Some(reply), false)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(None, false)
    }

    /// Each call waits for [`release`](Self::release).
    pub fn gated(reply: &str) -> Arc<Self> {
        Self::build(Some(reply), true)
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerationClient for StubGenerator {
    async fn complete(&self, request: &GenerationRequest) -> theurgy_llm::Result<String> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.prompt.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let _ = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.reply.clone().ok_or(GenerationError::Api {
            status: 503,
            message: "unavailable".into(),
        })
    }
}

/// Executor that records calls and always succeeds.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(String, UserId)>>,
}

impl RecordingExecutor {
    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(c, _)| c.clone()).collect()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, command: &str, acting_user: &UserId) -> CommandOutcome {
        self.calls.lock().push((command.to_string(), acting_user.clone()));
        CommandOutcome::ok("done")
    }
}

/// Same trust for everyone.
pub struct FixedTrust(pub i32);

impl TrustSource for FixedTrust {
    fn trust(&self, _user: &UserId, _persona: &PersonaId) -> i32 {
        self.0
    }
}

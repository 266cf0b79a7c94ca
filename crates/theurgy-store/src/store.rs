//! Transactional `Store` facade.
//!
//! Wraps the connection pool and both repositories. Every write runs inside a
//! single transaction under one process-wide write lock, so an appended batch
//! and its head trim land together or not at all.

use parking_lot::Mutex;
use theurgy_core::history::HistoryEntry;
use theurgy_core::ids::{PersonaId, UserId};
use theurgy_core::persona::{OverrideKey, RuntimeOverrides};
use tracing::{debug, instrument, warn};

use crate::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::errors::Result;
use crate::migrations::run_migrations;
use crate::repositories::history::{AuditReport, HistoryRepo};
use crate::repositories::overrides::{OverrideRepo, OverrideRow};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Entries kept per (user, persona).
    pub history_cap: usize,
    /// Pool settings.
    pub connection: ConnectionConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_cap: 1000,
            connection: ConnectionConfig::default(),
        }
    }
}

/// Durable history and override store.
pub struct Store {
    pool: ConnectionPool,
    history_cap: usize,
    write_lock: Mutex<()>,
}

impl Store {
    /// Open (or create) a file-backed store and run migrations.
    pub fn open(path: &str, config: StoreConfig) -> Result<Self> {
        let pool = connection::new_file(path, &config.connection)?;
        Self::with_pool(pool, config.history_cap)
    }

    /// Open an isolated in-memory store.
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        let pool = connection::new_in_memory(&config.connection)?;
        Self::with_pool(pool, config.history_cap)
    }

    fn with_pool(pool: ConnectionPool, history_cap: usize) -> Result<Self> {
        run_migrations(&*pool.get()?)?;
        Ok(Self {
            pool,
            history_cap: history_cap.max(1),
            write_lock: Mutex::new(()),
        })
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Configured per-pair cap.
    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    // ─────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────

    /// Append one entry and trim the pair to the cap.
    pub fn append(&self, user: &UserId, persona: &PersonaId, entry: &HistoryEntry) -> Result<()> {
        self.append_all(user, persona, std::slice::from_ref(entry))
    }

    /// Append entries in order and trim, all in one transaction.
    #[instrument(skip_all, fields(user = %user, persona = %persona, count = entries.len()))]
    pub fn append_all(
        &self,
        user: &UserId,
        persona: &PersonaId,
        entries: &[HistoryEntry],
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        for entry in entries {
            let _ = HistoryRepo::append(&tx, user, persona, entry)?;
        }
        let trimmed = HistoryRepo::trim(&tx, user, persona, self.history_cap)?;
        tx.commit()?;
        if trimmed > 0 {
            debug!(trimmed, cap = self.history_cap, "history trimmed");
        }
        Ok(())
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, user: &UserId, persona: &PersonaId, n: usize) -> Result<Vec<HistoryEntry>> {
        HistoryRepo::recent(&*self.conn()?, user, persona, n)
    }

    /// The last `n` user and persona lines, oldest first.
    pub fn recent_dialogue(
        &self,
        user: &UserId,
        persona: &PersonaId,
        n: usize,
    ) -> Result<Vec<HistoryEntry>> {
        HistoryRepo::recent_dialogue(&*self.conn()?, user, persona, n)
    }

    /// Full history, oldest first.
    pub fn history(&self, user: &UserId, persona: &PersonaId) -> Result<Vec<HistoryEntry>> {
        HistoryRepo::all(&*self.conn()?, user, persona)
    }

    /// Number of stored entries for the pair.
    pub fn history_len(&self, user: &UserId, persona: &PersonaId) -> Result<usize> {
        HistoryRepo::count(&*self.conn()?, user, persona)
    }

    /// Audit lines only.
    pub fn audit_entries(&self, user: &UserId, persona: &PersonaId) -> Result<Vec<HistoryEntry>> {
        HistoryRepo::audit_entries(&*self.conn()?, user, persona)
    }

    /// Execution and decision counts.
    pub fn audit_report(&self, user: &UserId, persona: &PersonaId) -> Result<AuditReport> {
        HistoryRepo::audit_report(&*self.conn()?, user, persona)
    }

    /// Delete one pair's history.
    #[instrument(skip_all, fields(user = %user, persona = %persona))]
    pub fn clear_history(&self, user: &UserId, persona: &PersonaId) -> Result<usize> {
        let _guard = self.write_lock.lock();
        HistoryRepo::clear(&*self.conn()?, user, persona)
    }

    /// Delete all of a user's histories.
    #[instrument(skip_all, fields(user = %user))]
    pub fn clear_all_history(&self, user: &UserId) -> Result<usize> {
        let _guard = self.write_lock.lock();
        HistoryRepo::clear_user(&*self.conn()?, user)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Runtime overrides
    // ─────────────────────────────────────────────────────────────────────

    /// Validate and persist an override.
    #[instrument(skip_all, fields(persona = %persona, key = %key))]
    pub fn set_override(&self, persona: &PersonaId, key: OverrideKey, value: &str) -> Result<()> {
        RuntimeOverrides::default().apply(key, value)?;
        let _guard = self.write_lock.lock();
        OverrideRepo::upsert(&*self.conn()?, persona, key, value.trim())
    }

    /// Remove one override. Returns whether it existed.
    pub fn clear_override(&self, persona: &PersonaId, key: OverrideKey) -> Result<bool> {
        let _guard = self.write_lock.lock();
        OverrideRepo::delete(&*self.conn()?, persona, key)
    }

    /// Remove every override of a persona.
    pub fn clear_overrides(&self, persona: &PersonaId) -> Result<usize> {
        let _guard = self.write_lock.lock();
        OverrideRepo::delete_all(&*self.conn()?, persona)
    }

    /// Raw override rows.
    pub fn override_rows(&self, persona: &PersonaId) -> Result<Vec<OverrideRow>> {
        OverrideRepo::list(&*self.conn()?, persona)
    }

    /// Typed overrides for a persona. Unknown or unparseable rows are skipped.
    pub fn runtime_overrides(&self, persona: &PersonaId) -> Result<RuntimeOverrides> {
        let mut overrides = RuntimeOverrides::default();
        for row in self.override_rows(persona)? {
            let Some(key) = OverrideKey::from_sql(&row.setting) else {
                warn!(persona = %persona, setting = %row.setting, "unknown override setting");
                continue;
            };
            if let Err(e) = overrides.apply(key, &row.value) {
                warn!(persona = %persona, error = %e, "skipping stored override");
            }
        }
        Ok(overrides)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! History repository: append, trim and query the `history` table.
//!
//! Rows are ordered by their autoincrement `id`, which is the append order.
//! Trimming removes the oldest rows of a (user, persona) pair.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use theurgy_core::history::{HistoryEntry, Speaker};
use theurgy_core::ids::{PersonaId, UserId};

use crate::errors::Result;

/// Counts of audit lines for one (user, persona) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Command execution attempts.
    pub commands_total: u64,
    /// Attempts the executor reported as successful.
    pub commands_succeeded: u64,
    /// Auto-judgment decisions.
    pub decisions: u64,
}

impl AuditReport {
    /// Attempts that failed.
    pub fn commands_failed(&self) -> u64 {
        self.commands_total.saturating_sub(self.commands_succeeded)
    }

    /// Fraction of successful attempts, `0.0` when none were made.
    pub fn success_rate(&self) -> f64 {
        if self.commands_total == 0 {
            return 0.0;
        }
        self.commands_succeeded as f64 / self.commands_total as f64
    }
}

/// History repository: stateless, every method takes `&Connection`.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Append one entry. Returns the row id.
    pub fn append(
        conn: &Connection,
        user: &UserId,
        persona: &PersonaId,
        entry: &HistoryEntry,
    ) -> Result<i64> {
        let _ = conn.execute(
            "INSERT INTO history (user_id, persona_id, speaker, text, created_at, success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.as_str(),
                persona.as_str(),
                entry.speaker.as_sql(),
                entry.text,
                entry.timestamp.to_rfc3339(),
                entry.success,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Delete the oldest rows so at most `cap` remain. Returns rows removed.
    pub fn trim(conn: &Connection, user: &UserId, persona: &PersonaId, cap: usize) -> Result<usize> {
        let removed = conn.execute(
            "DELETE FROM history
             WHERE user_id = ?1 AND persona_id = ?2 AND id <= (
                 SELECT id FROM history
                 WHERE user_id = ?1 AND persona_id = ?2
                 ORDER BY id DESC LIMIT 1 OFFSET ?3
             )",
            params![user.as_str(), persona.as_str(), cap as i64],
        )?;
        Ok(removed)
    }

    /// The last `n` entries, oldest first.
    pub fn recent(
        conn: &Connection,
        user: &UserId,
        persona: &PersonaId,
        n: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT speaker, text, created_at, success FROM history
             WHERE user_id = ?1 AND persona_id = ?2
             ORDER BY id DESC LIMIT ?3",
        )?;
        let mut rows = stmt
            .query_map(params![user.as_str(), persona.as_str(), n as i64], entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// The last `n` dialogue entries (user and persona lines only), oldest first.
    pub fn recent_dialogue(
        conn: &Connection,
        user: &UserId,
        persona: &PersonaId,
        n: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT speaker, text, created_at, success FROM history
             WHERE user_id = ?1 AND persona_id = ?2 AND speaker IN ('user', 'persona')
             ORDER BY id DESC LIMIT ?3",
        )?;
        let mut rows = stmt
            .query_map(params![user.as_str(), persona.as_str(), n as i64], entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Every entry, oldest first.
    pub fn all(conn: &Connection, user: &UserId, persona: &PersonaId) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT speaker, text, created_at, success FROM history
             WHERE user_id = ?1 AND persona_id = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![user.as_str(), persona.as_str()], entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Audit entries (`SYSTEM_DEBUG` and `AI_DECISION`), oldest first.
    pub fn audit_entries(
        conn: &Connection,
        user: &UserId,
        persona: &PersonaId,
    ) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT speaker, text, created_at, success FROM history
             WHERE user_id = ?1 AND persona_id = ?2
               AND speaker IN ('system_debug', 'ai_decision')
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![user.as_str(), persona.as_str()], entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of entries for the pair.
    pub fn count(conn: &Connection, user: &UserId, persona: &PersonaId) -> Result<usize> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM history WHERE user_id = ?1 AND persona_id = ?2",
            params![user.as_str(), persona.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Count audit lines. Verdicts come from the `success` column, never the text.
    pub fn audit_report(
        conn: &Connection,
        user: &UserId,
        persona: &PersonaId,
    ) -> Result<AuditReport> {
        let (total, succeeded, decisions): (i64, i64, i64) = conn.query_row(
            "SELECT
                 COALESCE(SUM(CASE WHEN speaker = 'system_debug'
                     AND success IS NOT NULL THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN speaker = 'system_debug'
                     AND success = 1 THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN speaker = 'ai_decision' THEN 1 ELSE 0 END), 0)
             FROM history WHERE user_id = ?1 AND persona_id = ?2",
            params![user.as_str(), persona.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(AuditReport {
            commands_total: total as u64,
            commands_succeeded: succeeded as u64,
            decisions: decisions as u64,
        })
    }

    /// Delete the pair's history. Returns rows removed.
    pub fn clear(conn: &Connection, user: &UserId, persona: &PersonaId) -> Result<usize> {
        let removed = conn.execute(
            "DELETE FROM history WHERE user_id = ?1 AND persona_id = ?2",
            params![user.as_str(), persona.as_str()],
        )?;
        Ok(removed)
    }

    /// Delete every history row of a user. Returns rows removed.
    pub fn clear_user(conn: &Connection, user: &UserId) -> Result<usize> {
        let removed = conn.execute(
            "DELETE FROM history WHERE user_id = ?1",
            params![user.as_str()],
        )?;
        Ok(removed)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let speaker: String = row.get(0)?;
    let text: String = row.get(1)?;
    let created_at: String = row.get(2)?;
    let success: Option<bool> = row.get(3)?;
    let speaker = Speaker::from_sql(&speaker).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("unknown speaker: {speaker}").into(),
        )
    })?;
    let timestamp = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    Ok(HistoryEntry::at(speaker, text, timestamp).with_success(success))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

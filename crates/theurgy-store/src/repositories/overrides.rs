//! Override repository: CRUD for the `persona_overrides` table.
//!
//! Values are stored as text. Parsing into typed settings happens in
//! [`crate::Store::runtime_overrides`].

use rusqlite::{Connection, OptionalExtension, params};
use theurgy_core::ids::PersonaId;
use theurgy_core::persona::OverrideKey;

use crate::errors::Result;

/// One stored override row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverrideRow {
    /// Raw setting name.
    pub setting: String,
    /// Raw value.
    pub value: String,
    /// RFC 3339 time of the last write.
    pub updated_at: String,
}

/// Override repository: stateless, every method takes `&Connection`.
pub struct OverrideRepo;

impl OverrideRepo {
    /// Insert or replace an override.
    pub fn upsert(conn: &Connection, persona: &PersonaId, key: OverrideKey, value: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO persona_overrides (persona_id, setting, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(persona_id, setting) DO UPDATE SET value = ?3, updated_at = ?4",
            params![persona.as_str(), key.as_sql(), value, now],
        )?;
        Ok(())
    }

    /// Get one override value.
    pub fn get(conn: &Connection, persona: &PersonaId, key: OverrideKey) -> Result<Option<String>> {
        let value = conn
            .query_row(
                "SELECT value FROM persona_overrides WHERE persona_id = ?1 AND setting = ?2",
                params![persona.as_str(), key.as_sql()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// All override rows for a persona, ordered by setting name.
    pub fn list(conn: &Connection, persona: &PersonaId) -> Result<Vec<OverrideRow>> {
        let mut stmt = conn.prepare(
            "SELECT setting, value, updated_at FROM persona_overrides
             WHERE persona_id = ?1 ORDER BY setting",
        )?;
        let rows = stmt
            .query_map(params![persona.as_str()], |row| {
                Ok(OverrideRow {
                    setting: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Remove one override. Returns whether a row existed.
    pub fn delete(conn: &Connection, persona: &PersonaId, key: OverrideKey) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM persona_overrides WHERE persona_id = ?1 AND setting = ?2",
            params![persona.as_str(), key.as_sql()],
        )?;
        Ok(changed > 0)
    }

    /// Remove every override of a persona. Returns rows removed.
    pub fn delete_all(conn: &Connection, persona: &PersonaId) -> Result<usize> {
        let changed = conn.execute(
            "DELETE FROM persona_overrides WHERE persona_id = ?1",
            params![persona.as_str()],
        )?;
        Ok(changed)
    }
}

//! Schema for the `history` and `persona_overrides` tables.

use rusqlite::Connection;

use crate::errors::Result;

/// Create all tables and indexes. Idempotent.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    if !has_column(conn, "history", "success")? {
        conn.execute_batch("ALTER TABLE history ADD COLUMN success INTEGER")?;
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    persona_id TEXT NOT NULL,
    speaker TEXT NOT NULL
        CHECK(speaker IN ('user', 'persona', 'system_debug', 'ai_decision')),
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    success INTEGER
);

CREATE INDEX IF NOT EXISTS idx_history_user_persona
    ON history(user_id, persona_id, id);

CREATE TABLE IF NOT EXISTS persona_overrides (
    persona_id TEXT NOT NULL,
    setting TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (persona_id, setting)
);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('history', 'persona_overrides')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn older_history_table_gains_success_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE history (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 user_id TEXT NOT NULL,
                 persona_id TEXT NOT NULL,
                 speaker TEXT NOT NULL,
                 text TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );",
        )
        .unwrap();
        run_migrations(&conn).unwrap();
        assert!(has_column(&conn, "history", "success").unwrap());
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn speaker_check_constraint_rejects_unknown() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO history (user_id, persona_id, speaker, text, created_at)
             VALUES ('u', 'p', 'narrator', 't', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}

//! SQLite schema definition.

/// Complete local database schema.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Credentials (single row, cold-start copy of the bearer token)
-- ============================================================================

CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    token TEXT NOT NULL,
    expires_at TEXT,
    obtained_at TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Medication Catalog
-- ============================================================================

CREATE TABLE IF NOT EXISTS medication_catalog (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    generic_name TEXT,
    aliases TEXT NOT NULL DEFAULT '[]',           -- JSON array of strings
    compositions TEXT NOT NULL DEFAULT '[]',      -- JSON array of {_id, name}
    strength TEXT,
    form TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE VIRTUAL TABLE IF NOT EXISTS medication_catalog_fts USING fts5(
    name,
    generic_name,
    aliases,
    compositions,
    content='medication_catalog',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS medication_catalog_ai AFTER INSERT ON medication_catalog BEGIN
    INSERT INTO medication_catalog_fts(rowid, name, generic_name, aliases, compositions)
    VALUES (new.rowid, new.name, new.generic_name, new.aliases, new.compositions);
END;

CREATE TRIGGER IF NOT EXISTS medication_catalog_ad AFTER DELETE ON medication_catalog BEGIN
    INSERT INTO medication_catalog_fts(medication_catalog_fts, rowid, name, generic_name, aliases, compositions)
    VALUES ('delete', old.rowid, old.name, old.generic_name, old.aliases, old.compositions);
END;

CREATE TRIGGER IF NOT EXISTS medication_catalog_au AFTER UPDATE ON medication_catalog BEGIN
    INSERT INTO medication_catalog_fts(medication_catalog_fts, rowid, name, generic_name, aliases, compositions)
    VALUES ('delete', old.rowid, old.name, old.generic_name, old.aliases, old.compositions);
    INSERT INTO medication_catalog_fts(rowid, name, generic_name, aliases, compositions)
    VALUES (new.rowid, new.name, new.generic_name, new.aliases, new.compositions);
END;

-- ============================================================================
-- Appointment Cache (server is the source of truth)
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    clinic_id TEXT,
    doctor_id TEXT,
    start_at TEXT,
    payload TEXT NOT NULL,                        -- JSON Appointment as last read
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status);
CREATE INDEX IF NOT EXISTS idx_appointments_clinic_start ON appointments(clinic_id, start_at);

-- ============================================================================
-- Interaction Override Audit (append-only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS override_audit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL,
    actor TEXT NOT NULL,
    composition_ids TEXT NOT NULL,                -- JSON array, sorted
    warnings TEXT NOT NULL,                       -- JSON array of acknowledged warnings
    granted_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS override_audit_no_update BEFORE UPDATE ON override_audit
BEGIN
    SELECT RAISE(ABORT, 'Override audit is append-only');
END;

CREATE TRIGGER IF NOT EXISTS override_audit_no_delete BEFORE DELETE ON override_audit
BEGIN
    SELECT RAISE(ABORT, 'Override audit is append-only');
END;

CREATE INDEX IF NOT EXISTS idx_override_audit_fingerprint ON override_audit(fingerprint);

-- ============================================================================
-- Sync State
-- ============================================================================

CREATE TABLE IF NOT EXISTS sync_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

INSERT OR IGNORE INTO sync_state (key, value) VALUES ('catalog_last_sync', '');
INSERT OR IGNORE INTO sync_state (key, value) VALUES ('appointments_last_sync', '');
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_fts_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO medication_catalog (id, name, generic_name, aliases) VALUES (?, ?, ?, ?)",
            ["m1", "Ecosprin 75", "Aspirin", r#"["disprin"]"#],
        )
        .unwrap();

        for term in ["ecosprin", "aspirin", "disprin"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM medication_catalog_fts WHERE medication_catalog_fts MATCH ?",
                    [term],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "term {}", term);
        }
    }

    #[test]
    fn test_credentials_single_row() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO credentials (id, token, obtained_at) VALUES (2, 't', 'now')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_override_audit_append_only() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO override_audit (fingerprint, actor, composition_ids, warnings, granted_at)
             VALUES ('f', 'dr', '[]', '[]', 'now')",
            [],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE override_audit SET actor = 'x'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM override_audit", []).is_err());
    }
}

//! Persisted bearer credential for cold start.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use clinic_net::{Credential, CredentialStore, TokenError, TokenResult};

use super::{Database, DbError, DbResult};

impl Database {
    /// Replace the stored credential.
    pub fn save_credential(&self, credential: &Credential) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO credentials (id, token, expires_at, obtained_at, updated_at)
            VALUES (1, ?1, ?2, ?3, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                token = excluded.token,
                expires_at = excluded.expires_at,
                obtained_at = excluded.obtained_at,
                updated_at = datetime('now')
            "#,
            params![
                credential.token,
                credential.expires_at.map(|t| t.to_rfc3339()),
                credential.obtained_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load_credential(&self) -> DbResult<Option<Credential>> {
        let row = self
            .conn
            .query_row(
                "SELECT token, expires_at, obtained_at FROM credentials WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(token, expires_at, obtained_at)| {
            Ok(Credential {
                token,
                expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
                obtained_at: parse_timestamp(&obtained_at)?,
            })
        })
        .transpose()
    }

    /// Delete the stored credential. Returns true if one existed.
    pub fn clear_credential(&self) -> DbResult<bool> {
        let rows = self.conn.execute("DELETE FROM credentials", [])?;
        Ok(rows > 0)
    }
}

fn parse_timestamp(value: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("credential timestamp: {}", e)))
}

/// [`CredentialStore`] backed by the `credentials` table.
pub struct SqliteCredentialStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteCredentialStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> DbResult<T>) -> TokenResult<T> {
        let db = self
            .db
            .lock()
            .map_err(|e| TokenError::Store(e.to_string()))?;
        f(&db).map_err(|e| TokenError::Store(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self) -> TokenResult<Option<Credential>> {
        self.with_db(|db| db.load_credential())
    }

    async fn save(&self, credential: &Credential) -> TokenResult<()> {
        self.with_db(|db| db.save_credential(credential))
    }

    async fn clear(&self) -> TokenResult<()> {
        self.with_db(|db| db.clear_credential().map(|_| ()))
    }
}

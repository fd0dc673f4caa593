//! Append-only log of interaction overrides.

use rusqlite::params;

use super::{Database, DbResult};
use crate::interactions::OverrideGrant;
use crate::models::InteractionWarning;

/// One acknowledged override, as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideRecord {
    pub id: i64,
    pub fingerprint: String,
    pub actor: String,
    pub composition_ids: Vec<String>,
    pub warnings: Vec<InteractionWarning>,
    pub granted_at: String,
}

impl Database {
    /// Record an override grant with the warnings it acknowledged.
    pub fn record_override(
        &self,
        grant: &OverrideGrant,
        composition_ids: &[String],
        warnings: &[InteractionWarning],
    ) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO override_audit (fingerprint, actor, composition_ids, warnings, granted_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                grant.fingerprint,
                grant.actor,
                serde_json::to_string(composition_ids)?,
                serde_json::to_string(warnings)?,
                grant.granted_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Overrides in grant order, optionally for one composition set.
    pub fn list_overrides(&self, fingerprint: Option<&str>) -> DbResult<Vec<OverrideRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, fingerprint, actor, composition_ids, warnings, granted_at
            FROM override_audit
            WHERE (?1 IS NULL OR fingerprint = ?1)
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([fingerprint], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, fingerprint, actor, composition_ids, warnings, granted_at) = row?;
            records.push(OverrideRecord {
                id,
                fingerprint,
                actor,
                composition_ids: serde_json::from_str(&composition_ids)?,
                warnings: serde_json::from_str(&warnings)?,
                granted_at,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::Utc;

    fn grant(fingerprint: &str, actor: &str) -> OverrideGrant {
        OverrideGrant {
            fingerprint: fingerprint.into(),
            actor: actor.into(),
            granted_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_and_list() {
        let db = Database::open_in_memory().unwrap();
        let warnings = vec![InteractionWarning::new("c-aspirin", "c-warfarin", Severity::Major)
            .with_description("Bleeding risk")];
        let ids = vec!["c-aspirin".to_string(), "c-warfarin".to_string()];

        let first = db.record_override(&grant("fp1", "dr-mehta"), &ids, &warnings).unwrap();
        let second = db.record_override(&grant("fp2", "dr-rao"), &ids[..1], &[]).unwrap();
        assert!(second > first);

        let all = db.list_overrides(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].actor, "dr-mehta");
        assert_eq!(all[0].composition_ids, ids);
        assert_eq!(all[0].warnings, warnings);

        let only = db.list_overrides(Some("fp2")).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].actor, "dr-rao");
    }
}

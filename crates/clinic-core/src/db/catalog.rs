//! Medication catalog operations.
//!
//! Search is two-stage: FTS5 prefix retrieval, then re-ranking by string
//! similarity so near-misses ("paracetmol") still surface the right brand.

use rusqlite::{params, OptionalExtension, Row};
use strsim::{jaro_winkler, normalized_levenshtein};

use super::{Database, DbError, DbResult};
use crate::models::{CatalogMedication, MedicationMatch};

/// Candidates pulled from FTS5 before re-ranking.
const FTS_CANDIDATE_LIMIT: usize = 25;

const SELECT_COLUMNS: &str =
    "m.id, m.name, m.generic_name, m.aliases, m.compositions, m.strength, m.form, m.active";

impl Database {
    /// Insert or update a catalog medication.
    pub fn upsert_medication(&self, medication: &CatalogMedication) -> DbResult<()> {
        let aliases_json = serde_json::to_string(&medication.aliases)?;
        let compositions_json = serde_json::to_string(&medication.compositions)?;

        self.conn.execute(
            r#"
            INSERT INTO medication_catalog (
                id, name, generic_name, aliases, compositions, strength, form, active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                generic_name = excluded.generic_name,
                aliases = excluded.aliases,
                compositions = excluded.compositions,
                strength = excluded.strength,
                form = excluded.form,
                active = excluded.active,
                updated_at = datetime('now')
            "#,
            params![
                medication.id,
                medication.name,
                medication.generic_name,
                aliases_json,
                compositions_json,
                medication.strength,
                medication.form,
                medication.active,
            ],
        )?;
        Ok(())
    }

    pub fn get_medication(&self, id: &str) -> DbResult<Option<CatalogMedication>> {
        let sql = format!("SELECT {} FROM medication_catalog m WHERE m.id = ?", SELECT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, [id], MedicationRow::from_row)
            .optional()?;

        row.map(|r| r.try_into()).transpose()
    }

    /// Search active medications by brand, generic, alias or composition name.
    pub fn search_medications(&self, query: &str, limit: usize) -> DbResult<Vec<MedicationMatch>> {
        let fts_query = escape_fts_query(query);
        if fts_query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {}
            FROM medication_catalog m
            JOIN medication_catalog_fts fts ON m.rowid = fts.rowid
            WHERE medication_catalog_fts MATCH ?
            AND m.active = 1
            ORDER BY bm25(medication_catalog_fts)
            LIMIT ?
            "#,
            SELECT_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![fts_query, FTS_CANDIDATE_LIMIT.max(limit) as i64],
            MedicationRow::from_row,
        )?;

        let query_lower = query.trim().to_lowercase();
        let mut matches = Vec::new();
        for row in rows {
            let medication: CatalogMedication = row?.try_into()?;
            let score = score_medication(&medication, &query_lower);
            matches.push(MedicationMatch { medication, score });
        }

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.medication.name.cmp(&b.medication.name))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    /// Mark a medication inactive. It stays readable but leaves search.
    pub fn deactivate_medication(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE medication_catalog SET active = 0, updated_at = datetime('now') WHERE id = ?",
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn count_medications(&self) -> DbResult<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM medication_catalog", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

struct MedicationRow {
    id: String,
    name: String,
    generic_name: Option<String>,
    aliases: String,
    compositions: String,
    strength: Option<String>,
    form: Option<String>,
    active: bool,
}

impl MedicationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            generic_name: row.get(2)?,
            aliases: row.get(3)?,
            compositions: row.get(4)?,
            strength: row.get(5)?,
            form: row.get(6)?,
            active: row.get(7)?,
        })
    }
}

impl TryFrom<MedicationRow> for CatalogMedication {
    type Error = DbError;

    fn try_from(row: MedicationRow) -> Result<Self, Self::Error> {
        Ok(CatalogMedication {
            id: row.id,
            name: row.name,
            generic_name: row.generic_name,
            aliases: serde_json::from_str(&row.aliases)?,
            compositions: serde_json::from_str(&row.compositions)?,
            strength: row.strength,
            form: row.form,
            active: row.active,
        })
    }
}

/// Best similarity between the query and any searchable name (0.0 - 1.0).
pub(crate) fn score_medication(medication: &CatalogMedication, query_lower: &str) -> f64 {
    let names = std::iter::once(medication.name.as_str())
        .chain(medication.generic_name.as_deref())
        .chain(medication.aliases.iter().map(String::as_str))
        .chain(medication.compositions.iter().map(|c| c.name.as_str()));

    names
        .map(|name| similarity(query_lower, &name.to_lowercase()))
        .fold(0.0, f64::max)
}

fn similarity(query: &str, candidate: &str) -> f64 {
    if candidate == query {
        return 1.0;
    }
    // Prefix hits rank just below exact matches
    if candidate.starts_with(query) {
        return 0.95;
    }
    let jw = jaro_winkler(query, candidate);
    let lev = normalized_levenshtein(query, candidate);
    (jw * 0.7 + lev * 0.3).min(0.9)
}

/// Strip FTS5 operators and turn each word into a prefix term.
fn escape_fts_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| format!("{}*", word))
        .collect::<Vec<_>>()
        .join(" ")
}

//! Medication catalog backed by the clinic API.
//!
//! Lookups go to `/medications` first and every document returned is written
//! to the local catalog. When the server cannot be reached the FTS5 index
//! answers from whatever was cached before.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use clinic_net::{encode_component, ClientError, ErrorKind, RequestEnvelope, ResilientHttpClient};

use crate::db::{score_medication, Database, DbError};
use crate::models::{CatalogMedication, MedicationDocument, MedicationMatch};

/// Shorter queries are not sent to the server.
pub const MIN_QUERY_CHARS: usize = 2;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    medications: Vec<MedicationDocument>,
}

/// Server-first medication lookups with a local fallback.
pub struct CatalogService {
    client: Arc<ResilientHttpClient>,
    db: Arc<Mutex<Database>>,
}

impl CatalogService {
    pub fn new(client: Arc<ResilientHttpClient>, db: Arc<Mutex<Database>>) -> Self {
        Self { client, db }
    }

    /// `GET /medications/search?q=<query>&limit=<limit>`
    ///
    /// Results keep the server's order. Each hit is scored against the query
    /// the same way the local index scores it.
    pub async fn search(&self, query: &str, limit: usize) -> CatalogResult<Vec<MedicationMatch>> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS || limit == 0 {
            return Ok(Vec::new());
        }

        let envelope = RequestEnvelope::get(format!(
            "/medications/search?q={}&limit={}",
            encode_component(query),
            limit
        ));
        let body = match self.client.send(&envelope).await {
            Ok(body) => body,
            Err(e) if e.kind.is_transient() => {
                tracing::warn!(kind = ?e.kind, query = %query, "Medication search unavailable; using local catalog");
                return Ok(self.db()?.search_medications(query, limit)?);
            }
            Err(e) => return Err(e.into()),
        };

        let medications: Vec<CatalogMedication> =
            decode_documents(body)?.into_iter().map(Into::into).collect();
        self.store(&medications);

        let query_lower = query.to_lowercase();
        let mut matches: Vec<MedicationMatch> = medications
            .into_iter()
            .map(|medication| {
                let score = score_medication(&medication, &query_lower);
                MedicationMatch { medication, score }
            })
            .collect();
        matches.truncate(limit);

        tracing::debug!(query = %query, count = matches.len(), "Medication search");
        Ok(matches)
    }

    /// `GET /medications/:id`
    ///
    /// A 404 retires the local copy so it drops out of offline search.
    pub async fn get(&self, medication_id: &str) -> CatalogResult<CatalogMedication> {
        let envelope =
            RequestEnvelope::get(format!("/medications/{}", encode_component(medication_id)));

        match self.client.send_json::<MedicationDocument>(&envelope).await {
            Ok(document) => {
                let medication = CatalogMedication::from(document);
                self.store(std::slice::from_ref(&medication));
                Ok(medication)
            }
            Err(e) if e.kind == ErrorKind::NotFound => {
                let retired = self
                    .db()
                    .and_then(|db| db.deactivate_medication(medication_id));
                match retired {
                    Ok(true) => {
                        tracing::info!(medication_id = %medication_id, "Medication withdrawn from catalog")
                    }
                    Ok(false) => {}
                    Err(db_err) => {
                        tracing::warn!(medication_id = %medication_id, error = %db_err, "Failed to retire medication")
                    }
                }
                Err(e.into())
            }
            Err(e) if e.kind.is_transient() => match self.db()?.get_medication(medication_id)? {
                Some(medication) => {
                    tracing::debug!(medication_id = %medication_id, "Using cached medication");
                    Ok(medication)
                }
                None => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, DbError> {
        self.db.lock().map_err(|e| DbError::Lock(e.to_string()))
    }

    fn store(&self, medications: &[CatalogMedication]) {
        let result = self.db().and_then(|db| {
            medications
                .iter()
                .try_for_each(|medication| db.upsert_medication(medication))
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to cache medications");
        }
    }
}

/// Accepts `{ "medications": [...] }` or a bare array.
fn decode_documents(body: Value) -> Result<Vec<MedicationDocument>, ClientError> {
    let decoded = if body.is_array() {
        serde_json::from_value(body)
    } else {
        serde_json::from_value::<SearchPage>(body).map(|page| page.medications)
    };
    decoded.map_err(|e| {
        ClientError::new(ErrorKind::Unknown)
            .with_message("Unexpected response format")
            .with_cause(e)
    })
}

//! Encounter mutations over the resilient client.
//!
//! Every mutation is one client call. The caller's appointment is replaced
//! only after the server accepts it; a failed call leaves it untouched.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value};

use clinic_net::{encode_component, ClientError, ErrorKind, RequestEnvelope, ResilientHttpClient};

use super::{next_status, EncounterError, EncounterResult, Transition};
use crate::db::{Database, DbError};
use crate::models::{
    Appointment, AppointmentFilter, AppointmentPage, AppointmentStatus, ClinicalNotes, Vitals,
};

enum Mutation {
    Vitals(Vitals),
    ClinicalNotes(ClinicalNotes),
    Complete,
    Cancel { reason: Option<String> },
    NoShow,
}

impl Mutation {
    fn transition(&self) -> Transition {
        match self {
            Mutation::Vitals(_) => Transition::RecordVitals,
            Mutation::ClinicalNotes(_) => Transition::SaveClinicalNotes,
            Mutation::Complete => Transition::Complete,
            Mutation::Cancel { .. } => Transition::Cancel,
            Mutation::NoShow => Transition::MarkNoShow,
        }
    }

    fn envelope(&self, appointment_id: &str) -> EncounterResult<RequestEnvelope> {
        let base = format!("/appointments/{}", encode_component(appointment_id));
        let envelope = match self {
            Mutation::Vitals(vitals) => {
                RequestEnvelope::patch(format!("{}/vitals", base)).with_json(vitals)?
            }
            Mutation::ClinicalNotes(notes) => {
                RequestEnvelope::patch(format!("{}/clinical-notes", base)).with_json(notes)?
            }
            Mutation::Complete => RequestEnvelope::post(format!("{}/complete", base)),
            Mutation::Cancel { reason } => {
                let body = match reason {
                    Some(reason) => json!({ "reason": reason }),
                    None => json!({}),
                };
                RequestEnvelope::post(format!("{}/cancel", base)).with_body(body)
            }
            Mutation::NoShow => RequestEnvelope::patch(format!("{}/status", base))
                .with_body(json!({ "status": AppointmentStatus::NoShow.as_str() })),
        };
        Ok(envelope)
    }

    /// Local rendition used when the server answers without a document.
    fn apply_locally(self, appointment: &mut Appointment) {
        match self {
            Mutation::Vitals(vitals) => appointment.vitals = Some(vitals),
            Mutation::ClinicalNotes(notes) => appointment.clinical_notes = Some(notes),
            Mutation::Cancel {
                reason: Some(reason),
            } => appointment.notes = Some(format!("Cancelled: {}", reason)),
            Mutation::Complete | Mutation::Cancel { reason: None } | Mutation::NoShow => {}
        }
    }
}

/// Reads and mutates appointments through the clinic API.
pub struct EncounterService {
    client: Arc<ResilientHttpClient>,
    db: Option<Arc<Mutex<Database>>>,
}

impl EncounterService {
    pub fn new(client: Arc<ResilientHttpClient>) -> Self {
        Self { client, db: None }
    }

    /// Cache every appointment read from the server.
    pub fn with_database(mut self, db: Arc<Mutex<Database>>) -> Self {
        self.db = Some(db);
        self
    }

    /// `GET /appointments/:id`
    pub async fn fetch(&self, appointment_id: &str) -> EncounterResult<Appointment> {
        let envelope =
            RequestEnvelope::get(format!("/appointments/{}", encode_component(appointment_id)));
        let appointment: Appointment = self.client.send_json(&envelope).await?;
        self.cache(&appointment);
        Ok(appointment)
    }

    /// `GET /appointments?<filters>`
    pub async fn list(&self, filter: &AppointmentFilter) -> EncounterResult<AppointmentPage> {
        let envelope = RequestEnvelope::get(format!("/appointments{}", filter.to_query()));
        let body = self.client.send(&envelope).await?;

        let page = if body.is_array() {
            AppointmentPage {
                appointments: decode(body)?,
                pagination: None,
            }
        } else {
            decode::<AppointmentPage>(body)?
        };

        if let Some(db) = &self.db {
            let result = db
                .lock()
                .map_err(|e| DbError::Lock(e.to_string()))
                .and_then(|mut db| {
                    db.cache_appointments(&page.appointments, &Utc::now().to_rfc3339())
                });
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to cache appointment list");
            }
        }

        tracing::debug!(count = page.appointments.len(), "Appointments fetched");
        Ok(page)
    }

    /// Last server copy held locally, for offline viewing.
    pub fn cached(&self, appointment_id: &str) -> EncounterResult<Option<Appointment>> {
        match &self.db {
            Some(db) => {
                let db = db.lock().map_err(|e| DbError::Lock(e.to_string()))?;
                Ok(db.get_cached_appointment(appointment_id)?)
            }
            None => Ok(None),
        }
    }

    /// `PATCH /appointments/:id/vitals`. Starts the consultation on a scheduled appointment.
    pub async fn record_vitals(
        &self,
        appointment: &mut Appointment,
        vitals: Vitals,
    ) -> EncounterResult<()> {
        if vitals.is_empty() {
            return Err(EncounterError::EmptyRecord("vitals"));
        }
        self.apply(appointment, Mutation::Vitals(vitals)).await
    }

    /// `PATCH /appointments/:id/clinical-notes`
    pub async fn save_clinical_notes(
        &self,
        appointment: &mut Appointment,
        notes: ClinicalNotes,
    ) -> EncounterResult<()> {
        if !notes.has_content() {
            return Err(EncounterError::EmptyRecord("clinical notes"));
        }
        self.apply(appointment, Mutation::ClinicalNotes(notes)).await
    }

    /// `POST /appointments/:id/complete`. Requires clinical notes.
    pub async fn complete(&self, appointment: &mut Appointment) -> EncounterResult<()> {
        self.apply(appointment, Mutation::Complete).await
    }

    /// `POST /appointments/:id/cancel`. Irreversible.
    pub async fn cancel(
        &self,
        appointment: &mut Appointment,
        reason: Option<String>,
    ) -> EncounterResult<()> {
        let reason = reason.filter(|r| !r.trim().is_empty());
        self.apply(appointment, Mutation::Cancel { reason }).await
    }

    /// `PATCH /appointments/:id/status` with `no-show`.
    ///
    /// The clinic API has no dedicated no-show route, and deployments whose
    /// status endpoint only accepts `scheduled`, `in-progress`, `completed` and
    /// `cancelled` answer 400. That surfaces as a `ValidationError` carrying
    /// the server message, and the appointment keeps its current status.
    pub async fn mark_no_show(&self, appointment: &mut Appointment) -> EncounterResult<()> {
        self.apply(appointment, Mutation::NoShow).await
    }

    async fn apply(&self, appointment: &mut Appointment, mutation: Mutation) -> EncounterResult<()> {
        let transition = mutation.transition();
        let from = appointment.status;
        let predicted = next_status(from, transition)
            .ok_or(EncounterError::IllegalTransition { from, transition })?;

        if transition == Transition::Complete && !appointment.has_clinical_notes() {
            return Err(EncounterError::MissingClinicalNotes);
        }

        let envelope = mutation.envelope(&appointment.id)?;
        let body = match self.client.send(&envelope).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    appointment_id = %appointment.id,
                    transition = %transition,
                    status = %from,
                    kind = ?e.kind,
                    "Appointment mutation failed; local status unchanged"
                );
                return Err(e.into());
            }
        };

        let updated = match body {
            Value::Object(ref fields) if fields.contains_key("_id") => {
                let has_status = fields.contains_key("status");
                let mut updated: Appointment = decode(body)?;
                if !has_status {
                    updated.status = predicted;
                }
                updated
            }
            _ => {
                let mut updated = appointment.clone();
                mutation.apply_locally(&mut updated);
                updated.status = predicted;
                updated
            }
        };

        if updated.status != predicted {
            tracing::debug!(
                appointment_id = %updated.id,
                expected = %predicted,
                actual = %updated.status,
                "Server status differs from prediction; keeping server copy"
            );
        }
        tracing::info!(
            appointment_id = %updated.id,
            transition = %transition,
            from = %from,
            to = %updated.status,
            "Appointment updated"
        );

        self.cache(&updated);
        *appointment = updated;
        Ok(())
    }

    fn cache(&self, appointment: &Appointment) {
        let Some(db) = &self.db else {
            return;
        };
        let result = db
            .lock()
            .map_err(|e| DbError::Lock(e.to_string()))
            .and_then(|db| db.cache_appointment(appointment));
        if let Err(e) = result {
            tracing::warn!(appointment_id = %appointment.id, error = %e, "Failed to cache appointment");
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ClientError> {
    serde_json::from_value(body).map_err(|e| {
        ClientError::new(ErrorKind::Unknown)
            .with_message("Unexpected response format")
            .with_cause(e)
    })
}

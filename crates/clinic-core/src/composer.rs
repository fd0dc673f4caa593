//! Prescription composition and submission.
//!
//! The composer owns the ordered medication list for one prescription. Every
//! change to composition membership re-runs the interaction gate and drops any
//! override; submission re-checks one last time and refuses to send a set the
//! operator has not acknowledged.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;

use clinic_net::{encode_component, ClientError, ErrorKind, RequestEnvelope, ResilientHttpClient};

use crate::db::{Database, DbError};
use crate::encounter::EncounterService;
use crate::interactions::{normalize, Assessment, GateError, InteractionGate, OverrideGrant};
use crate::models::{
    Appointment, AppointmentStatus, CatalogMedication, Diagnosis, InteractionWarning,
    MedicationCandidate, MedicationEdit, Prescription, PrescriptionTarget,
};

#[derive(Error, Debug)]
pub enum ComposerError {
    #[error("A prescription needs at least one medication")]
    NoMedications,

    #[error("No medication at position {0}")]
    NoSuchMedication(usize),

    #[error("Appointment is {0}; prescriptions can no longer be attached")]
    AppointmentClosed(AppointmentStatus),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub type ComposerResult<T> = Result<T, ComposerError>;

/// Result of a submission attempt that reached a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted(Prescription),
    /// Severe warnings need an acknowledgment for this exact set.
    OverrideRequired { warnings: Vec<InteractionWarning> },
    /// The appointment already has a prescription; edit that one instead.
    DuplicateExists { existing_prescription_id: String },
    /// The interaction check failed; refresh before submitting again.
    SafetyUnknown { error: ClientError },
}

/// Builds one prescription against the interaction gate.
pub struct PrescriptionComposer {
    client: Arc<ResilientHttpClient>,
    gate: InteractionGate,
    db: Option<Arc<Mutex<Database>>>,
    encounter: Option<Arc<EncounterService>>,
    appointment: Option<Appointment>,
    medications: Vec<MedicationCandidate>,
    assessment: Assessment,
    grant: Option<OverrideGrant>,
    diagnosis: Vec<Diagnosis>,
    notes: Option<String>,
}

impl PrescriptionComposer {
    pub fn new(client: Arc<ResilientHttpClient>, gate: InteractionGate) -> Self {
        Self {
            client,
            gate,
            db: None,
            encounter: None,
            appointment: None,
            medications: Vec::new(),
            assessment: Assessment::empty(),
            grant: None,
            diagnosis: Vec::new(),
            notes: None,
        }
    }

    /// Record override grants in the local audit log.
    pub fn with_database(mut self, db: Arc<Mutex<Database>>) -> Self {
        self.db = Some(db);
        self
    }

    /// Tie the prescription to an appointment, re-read after submission.
    pub fn with_encounter(mut self, encounter: Arc<EncounterService>, appointment: Appointment) -> Self {
        self.encounter = Some(encounter);
        self.appointment = Some(appointment);
        self
    }

    pub fn medications(&self) -> &[MedicationCandidate] {
        &self.medications
    }

    pub fn assessment(&self) -> &Assessment {
        &self.assessment
    }

    pub fn appointment(&self) -> Option<&Appointment> {
        self.appointment.as_ref()
    }

    pub fn has_override(&self) -> bool {
        self.grant
            .as_ref()
            .map_or(false, |grant| grant.covers(&self.assessment))
    }

    /// Sorted, distinct compositions across every medication.
    pub fn composition_ids(&self) -> Vec<String> {
        let all: Vec<String> = self
            .medications
            .iter()
            .flat_map(|m| m.composition_ids.iter().cloned())
            .collect();
        normalize(&all)
    }

    pub async fn add_medication(&mut self, medication: &CatalogMedication) -> &Assessment {
        self.add_candidate(MedicationCandidate::from_catalog(medication))
            .await
    }

    pub async fn add_candidate(&mut self, candidate: MedicationCandidate) -> &Assessment {
        tracing::debug!(medication_id = %candidate.medication_id, "Medication added");
        self.medications.push(candidate);
        self.membership_changed().await
    }

    pub async fn remove_medication(&mut self, index: usize) -> ComposerResult<MedicationCandidate> {
        if index >= self.medications.len() {
            return Err(ComposerError::NoSuchMedication(index));
        }
        let removed = self.medications.remove(index);
        tracing::debug!(medication_id = %removed.medication_id, "Medication removed");
        self.membership_changed().await;
        Ok(removed)
    }

    /// Dosing edits keep the current assessment and override.
    pub fn edit_medication(&mut self, index: usize, edit: MedicationEdit) -> ComposerResult<()> {
        let candidate = self
            .medications
            .get_mut(index)
            .ok_or(ComposerError::NoSuchMedication(index))?;
        edit.apply(candidate);
        Ok(())
    }

    pub fn set_diagnosis(&mut self, diagnosis: Vec<Diagnosis>) {
        self.diagnosis = diagnosis;
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes.filter(|n| !n.trim().is_empty());
    }

    /// Re-run the gate for the current set. A grant for the same set survives.
    pub async fn refresh(&mut self) -> &Assessment {
        self.assessment = self.gate.evaluate(&self.composition_ids()).await;
        &self.assessment
    }

    /// Acknowledge the current severe warnings as `actor`.
    pub fn grant_override(&mut self, actor: &str) -> ComposerResult<&OverrideGrant> {
        let grant = InteractionGate::grant_override(&self.assessment, actor)?;

        if let Some(db) = &self.db {
            let db = db.lock().map_err(|e| DbError::Lock(e.to_string()))?;
            db.record_override(&grant, &self.composition_ids(), self.assessment.warnings())?;
        }

        Ok(&*self.grant.insert(grant))
    }

    /// Persist the prescription. Every call consumes the current override.
    pub async fn submit(&mut self, target: &PrescriptionTarget) -> ComposerResult<SubmitOutcome> {
        if self.medications.is_empty() {
            return Err(ComposerError::NoMedications);
        }
        if let Some(appointment) = &self.appointment {
            if matches!(
                appointment.status,
                AppointmentStatus::Cancelled | AppointmentStatus::NoShow
            ) {
                return Err(ComposerError::AppointmentClosed(appointment.status));
            }
        }

        let grant = self.grant.take();
        self.refresh().await;

        if let Assessment::Unknown { error, .. } = &self.assessment {
            tracing::warn!(
                fingerprint = %self.assessment.fingerprint(),
                "Submission blocked: interaction check unresolved"
            );
            return Ok(SubmitOutcome::SafetyUnknown {
                error: error.clone(),
            });
        }

        // A grant still covering this set is sent even if the re-check came
        // back clean; the server runs its own check.
        let covered = grant.as_ref().filter(|g| g.covers(&self.assessment));
        let override_ddi = covered.is_some();
        if self.assessment.requires_override() && !override_ddi {
            tracing::info!(
                fingerprint = %self.assessment.fingerprint(),
                max_severity = ?self.assessment.max_severity(),
                "Submission blocked: override required"
            );
            return Ok(SubmitOutcome::OverrideRequired {
                warnings: self.assessment.warnings().to_vec(),
            });
        }

        let envelope = self.envelope(target, override_ddi);
        let body = match self.client.send(&envelope).await {
            Ok(body) => body,
            Err(error) => return self.rejected(error),
        };

        let id = prescription_id(&body).ok_or_else(|| {
            ClientError::new(ErrorKind::Unknown).with_message("Prescription response has no id")
        })?;
        let prescription = Prescription {
            id,
            appointment_id: target
                .appointment_id()
                .map(str::to_string)
                .or_else(|| self.appointment.as_ref().map(|a| a.id.clone())),
            medications: self.medications.clone(),
            warnings: self.assessment.warnings().to_vec(),
            override_ddi,
            overridden_by: covered.map(|g| g.actor.clone()),
            submitted_at: Utc::now(),
        };

        tracing::info!(
            prescription_id = %prescription.id,
            medications = prescription.medications.len(),
            warnings = prescription.warnings.len(),
            override_ddi,
            "Prescription submitted"
        );

        self.reload_appointment().await;
        Ok(SubmitOutcome::Submitted(prescription))
    }

    async fn membership_changed(&mut self) -> &Assessment {
        if self.grant.take().is_some() {
            tracing::info!("Composition set changed; interaction override cleared");
        }
        self.refresh().await
    }

    fn envelope(&self, target: &PrescriptionTarget, override_ddi: bool) -> RequestEnvelope {
        let meds: Vec<Value> = self.medications.iter().map(MedicationCandidate::to_wire).collect();
        let warnings: Vec<Value> = self
            .assessment
            .warnings()
            .iter()
            .map(InteractionWarning::to_snapshot)
            .collect();

        let mut body = json!({
            "meds": meds,
            "diagnosis": self.diagnosis,
            "notes": self.notes,
            "overrideDDI": override_ddi,
            "ddiWarnings": warnings,
        });

        match target {
            PrescriptionTarget::Create {
                clinic_id,
                patient_id,
                appointment_id,
            } => {
                body["clinic"] = json!(clinic_id);
                body["patient"] = json!(patient_id);
                let appointment = appointment_id
                    .clone()
                    .or_else(|| self.appointment.as_ref().map(|a| a.id.clone()));
                if let Some(appointment) = appointment {
                    body["appointment"] = json!(appointment);
                }
                RequestEnvelope::post("/prescriptions").with_body(body)
            }
            PrescriptionTarget::Update { prescription_id } => RequestEnvelope::put(format!(
                "/prescriptions/{}",
                encode_component(prescription_id)
            ))
            .with_body(body),
        }
    }

    /// Turn business-rule rejections into outcomes; everything else is an error.
    fn rejected(&mut self, error: ClientError) -> ComposerResult<SubmitOutcome> {
        if error.kind != ErrorKind::ValidationError {
            return Err(error.into());
        }

        if let Some(existing) = error
            .body_field("existingPrescriptionId")
            .and_then(Value::as_str)
        {
            tracing::info!(existing_prescription_id = existing, "Prescription already exists");
            return Ok(SubmitOutcome::DuplicateExists {
                existing_prescription_id: existing.to_string(),
            });
        }

        if error.body_field("requiresOverride").and_then(Value::as_bool) == Some(true) {
            let mut warnings: Vec<InteractionWarning> = error
                .body_field("ddiWarnings")
                .cloned()
                .and_then(|w| serde_json::from_value(w).ok())
                .unwrap_or_default();
            warnings = warnings.into_iter().map(InteractionWarning::canonical).collect();
            warnings.sort_by(|x, y| y.severity.cmp(&x.severity));

            tracing::warn!(
                fingerprint = %self.assessment.fingerprint(),
                warnings = warnings.len(),
                "Server requires an interaction override"
            );
            self.assessment = Assessment::Evaluated {
                warnings: warnings.clone(),
                fingerprint: self.assessment.fingerprint().to_string(),
                pairs_checked: self.assessment.pairs_checked().to_vec(),
            };
            return Ok(SubmitOutcome::OverrideRequired { warnings });
        }

        Err(error.into())
    }

    async fn reload_appointment(&mut self) {
        let (Some(encounter), Some(appointment)) = (self.encounter.clone(), &self.appointment) else {
            return;
        };
        let appointment_id = appointment.id.clone();
        match encounter.fetch(&appointment_id).await {
            Ok(updated) => {
                tracing::debug!(appointment_id = %appointment_id, status = %updated.status, "Appointment re-read");
                self.appointment = Some(updated);
            }
            Err(e) => {
                tracing::warn!(appointment_id = %appointment_id, error = %e, "Failed to re-read appointment");
            }
        }
    }
}

fn prescription_id(body: &Value) -> Option<String> {
    body.get("_id")
        .or_else(|| body.get("prescription").and_then(|p| p.get("_id")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

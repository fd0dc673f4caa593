//! Clinic Core Library
//!
//! Encounter workflow and prescription interaction safety for the clinic
//! mobile apps, behind a single resilient network client.
//!
//! # Architecture
//!
//! ```text
//!   Host app (Swift / Kotlin)
//!        │  token source, reachability
//!        ▼
//!   ┌──────────────────────────── ClinicCore ────────────────────────────┐
//!   │                                                                    │
//!   │  EncounterService          PrescriptionComposer                    │
//!   │   scheduled → in-progress    add / remove ──► InteractionGate      │
//!   │   → completed | cancelled    grant override    (pairwise DDI)      │
//!   │   | no-show                  submit                                │
//!   │        │                          │                                │
//!   │        └────────────┬─────────────┘                                │
//!   │                     ▼                                              │
//!   │          ResilientHttpClient (clinic-net)                          │
//!   │           connectivity → bearer → retry/backoff → ClientError      │
//!   │                                                                    │
//!   │  SQLite: credentials · medication catalog · appointment cache      │
//!   │          · override audit                                          │
//!   └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Principle
//!
//! **A failed interaction check is never a clean result.** Submission stays
//! blocked until the check completes, and severe warnings need an override
//! for the exact composition set being submitted.
//!
//! # Modules
//!
//! - [`models`]: Domain types (Appointment, Vitals, InteractionWarning, etc.)
//! - [`catalog`]: Server-first medication lookups with an offline index
//! - [`encounter`]: Appointment status transitions and their API calls
//! - [`interactions`]: Interaction gate and knowledge-base lookup
//! - [`composer`]: Prescription composition and submission
//! - [`db`]: SQLite storage with FTS5 catalog search
//! - [`config`]: Client configuration
//! - [`logging`]: Tracing subscriber setup

pub mod catalog;
pub mod composer;
pub mod config;
pub mod db;
pub mod encounter;
pub mod interactions;
pub mod logging;
pub mod models;

// Re-export commonly used types
pub use catalog::{CatalogError, CatalogService};
pub use composer::{ComposerError, PrescriptionComposer, SubmitOutcome};
pub use config::{ClientConfig, ConfigError};
pub use db::{Database, SqliteCredentialStore};
pub use encounter::{EncounterError, EncounterService, Transition};
pub use interactions::{Assessment, InteractionGate, OverrideGrant};
pub use models::{
    Appointment, AppointmentStatus, CatalogMedication, ClinicalNotes, InteractionWarning,
    MedicationCandidate, PrescriptionTarget, Severity, Vitals,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use clinic_net::{
    ClientError, ConnectivityGate, Credential, ErrorKind, ReqwestTransport, ResilientHttpClient,
    TokenError, TokenProvider, TokenResult, TokenSource, Transport,
};

use interactions::HttpInteractionLookup;
use models::{AppointmentFilter, Composition, Diagnosis, MedicationEdit, MedicationMatch};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicCoreError {
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<ClientError> for ClinicCoreError {
    fn from(e: ClientError) -> Self {
        let message = e.message;
        match e.kind {
            ErrorKind::NetworkUnavailable => ClinicCoreError::NetworkUnavailable(message),
            ErrorKind::SessionExpired => ClinicCoreError::SessionExpired(message),
            ErrorKind::PermissionDenied => ClinicCoreError::PermissionDenied(message),
            ErrorKind::NotFound => ClinicCoreError::NotFound(message),
            ErrorKind::ServerError => ClinicCoreError::ServerError(message),
            ErrorKind::ValidationError => ClinicCoreError::ValidationError(message),
            ErrorKind::Unknown => ClinicCoreError::Unknown(message),
        }
    }
}

impl From<db::DbError> for ClinicCoreError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => ClinicCoreError::NotFound(what),
            other => ClinicCoreError::DatabaseError(other.to_string()),
        }
    }
}

impl From<EncounterError> for ClinicCoreError {
    fn from(e: EncounterError) -> Self {
        match e {
            EncounterError::Client(e) => e.into(),
            EncounterError::Db(e) => e.into(),
            other => ClinicCoreError::InvalidInput(other.to_string()),
        }
    }
}

impl From<CatalogError> for ClinicCoreError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Client(e) => e.into(),
            CatalogError::Db(e) => e.into(),
        }
    }
}

impl From<ComposerError> for ClinicCoreError {
    fn from(e: ComposerError) -> Self {
        match e {
            ComposerError::Client(e) => e.into(),
            ComposerError::Db(e) => e.into(),
            other => ClinicCoreError::InvalidInput(other.to_string()),
        }
    }
}

impl From<ConfigError> for ClinicCoreError {
    fn from(e: ConfigError) -> Self {
        ClinicCoreError::ConfigError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicCoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicCoreError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Host Callbacks
// =========================================================================

/// Identity provider session owned by the host app.
#[uniffi::export(with_foreign)]
pub trait HostTokenSource: Send + Sync {
    /// Current session token, if signed in.
    fn current_token(&self) -> Option<String>;

    /// Reload the session; `None` when the user must sign in again.
    fn refresh_token(&self) -> Option<String>;
}

/// Network reachability as reported by the host platform.
#[uniffi::export(with_foreign)]
pub trait HostConnectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

struct HostTokenBridge(Arc<dyn HostTokenSource>);

#[async_trait]
impl TokenSource for HostTokenBridge {
    async fn fetch_token(&self) -> TokenResult<Option<Credential>> {
        let host = self.0.clone();
        let token = tokio::task::spawn_blocking(move || host.current_token())
            .await
            .map_err(|e| TokenError::Provider(e.to_string()))?;
        Ok(token.filter(|t| !t.is_empty()).map(Credential::new))
    }

    async fn refresh_token(&self) -> TokenResult<Credential> {
        let host = self.0.clone();
        let token = tokio::task::spawn_blocking(move || host.refresh_token())
            .await
            .map_err(|e| TokenError::Provider(e.to_string()))?;
        token
            .filter(|t| !t.is_empty())
            .map(Credential::new)
            .ok_or(TokenError::NoSession)
    }
}

struct HostConnectivityBridge(Arc<dyn HostConnectivity>);

#[async_trait]
impl ConnectivityGate for HostConnectivityBridge {
    async fn is_reachable(&self) -> bool {
        let host = self.0.clone();
        tokio::task::spawn_blocking(move || host.is_online())
            .await
            .unwrap_or(false)
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open the core against the clinic API with host-provided session and reachability.
#[uniffi::export]
pub fn open_clinic_core(
    config: FfiClientConfig,
    token_source: Arc<dyn HostTokenSource>,
    connectivity: Arc<dyn HostConnectivity>,
) -> Result<Arc<ClinicCore>, ClinicCoreError> {
    let transport = ReqwestTransport::new()
        .map_err(|e| ClinicCoreError::ConfigError(format!("HTTP transport: {}", e)))?;
    let core = ClinicCore::with_transport(
        config.into(),
        Arc::new(transport),
        Arc::new(HostTokenBridge(token_source)),
        Arc::new(HostConnectivityBridge(connectivity)),
    )?;
    Ok(Arc::new(core))
}

/// Configuration from `CLINIC_*` environment variables (development builds).
#[uniffi::export]
pub fn client_config_from_env() -> Result<FfiClientConfig, ClinicCoreError> {
    Ok(ClientConfig::from_env()?.into())
}

/// Install the tracing subscriber once at app startup.
#[uniffi::export]
pub fn init_logging(filter: Option<String>) -> bool {
    logging::init_logging(filter.as_deref())
}

// =========================================================================
// Main API Object
// =========================================================================

/// Process-wide entry point for the host app.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    db: Arc<Mutex<Database>>,
    client: Arc<ResilientHttpClient>,
    encounters: Arc<EncounterService>,
    catalog: CatalogService,
    gate: InteractionGate,
    /// Each session has its own lock; the map lock is never held across an await
    prescriptions: Mutex<HashMap<String, Arc<PrescriptionSession>>>,
}

type PrescriptionSession = tokio::sync::Mutex<PrescriptionComposer>;

impl ClinicCore {
    /// Build the core over any transport (tests use a scripted one).
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        token_source: Arc<dyn TokenSource>,
        connectivity: Arc<dyn ConnectivityGate>,
    ) -> Result<Self, ClinicCoreError> {
        config.validate()?;

        let db = match &config.database_path {
            Some(path) => Database::open(path)?,
            None => Database::open_in_memory()?,
        };
        let db = Arc::new(Mutex::new(db));

        let tokens = Arc::new(TokenProvider::new(
            token_source,
            Arc::new(SqliteCredentialStore::new(db.clone())),
        ));
        let client = Arc::new(
            ResilientHttpClient::new(config.base_url.clone(), transport, tokens, connectivity)
                .with_policy(config.retry_policy()),
        );
        let encounters = Arc::new(EncounterService::new(client.clone()).with_database(db.clone()));
        let catalog = CatalogService::new(client.clone(), db.clone());
        let gate = InteractionGate::new(Arc::new(HttpInteractionLookup::new(client.clone())));

        tracing::info!(base_url = %config.base_url, persistent = config.database_path.is_some(), "Clinic core opened");

        Ok(Self {
            db,
            client,
            encounters,
            catalog,
            gate,
            prescriptions: Mutex::new(HashMap::new()),
        })
    }

    /// Current server copy; the local cache only when the device is offline.
    async fn appointment(&self, appointment_id: &str) -> Result<Appointment, ClinicCoreError> {
        match self.encounters.fetch(appointment_id).await {
            Ok(appointment) => Ok(appointment),
            Err(EncounterError::Client(e)) if e.kind == ErrorKind::NetworkUnavailable => {
                match self.encounters.cached(appointment_id)? {
                    Some(appointment) => {
                        tracing::debug!(appointment_id = %appointment_id, "Offline; using cached appointment");
                        Ok(appointment)
                    }
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn session(&self, session_id: &str) -> Result<Arc<PrescriptionSession>, ClinicCoreError> {
        self.prescriptions
            .lock()?
            .get(session_id)
            .cloned()
            .ok_or_else(|| ClinicCoreError::NotFound(format!("prescription session {}", session_id)))
    }

    async fn mutate(
        &self,
        appointment_id: &str,
        action: AppointmentAction,
    ) -> Result<FfiAppointment, ClinicCoreError> {
        let mut appointment = self.appointment(appointment_id).await?;
        match action {
            AppointmentAction::RecordVitals(vitals) => {
                self.encounters.record_vitals(&mut appointment, vitals).await?
            }
            AppointmentAction::SaveClinicalNotes(notes) => {
                self.encounters.save_clinical_notes(&mut appointment, notes).await?
            }
            AppointmentAction::Complete => self.encounters.complete(&mut appointment).await?,
            AppointmentAction::Cancel(reason) => {
                self.encounters.cancel(&mut appointment, reason).await?
            }
            AppointmentAction::MarkNoShow => self.encounters.mark_no_show(&mut appointment).await?,
        }
        Ok(appointment.into())
    }
}

enum AppointmentAction {
    RecordVitals(Vitals),
    SaveClinicalNotes(ClinicalNotes),
    Complete,
    Cancel(Option<String>),
    MarkNoShow,
}

#[uniffi::export(async_runtime = "tokio")]
impl ClinicCore {
    // =========================================================================
    // Appointment Operations
    // =========================================================================

    /// Re-read an appointment from the server.
    pub async fn fetch_appointment(&self, appointment_id: String) -> Result<FfiAppointment, ClinicCoreError> {
        let appointment = self.encounters.fetch(&appointment_id).await?;
        Ok(appointment.into())
    }

    /// List appointments from the server and refresh the local cache.
    pub async fn list_appointments(
        &self,
        filter: FfiAppointmentFilter,
    ) -> Result<Vec<FfiAppointment>, ClinicCoreError> {
        let page = self.encounters.list(&filter.try_into()?).await?;
        Ok(page.appointments.into_iter().map(Into::into).collect())
    }

    /// Appointments cached on this device, for offline viewing.
    pub fn cached_appointments(&self, status: Option<String>) -> Result<Vec<FfiAppointment>, ClinicCoreError> {
        let status = status.as_deref().map(parse_status).transpose()?;
        let db = self.db.lock()?;
        let appointments = db.list_cached_appointments(status)?;
        Ok(appointments.into_iter().map(Into::into).collect())
    }

    /// Write vitals; the first write starts the consultation.
    pub async fn record_vitals(
        &self,
        appointment_id: String,
        vitals: FfiVitals,
    ) -> Result<FfiAppointment, ClinicCoreError> {
        self.mutate(&appointment_id, AppointmentAction::RecordVitals(vitals.into()))
            .await
    }

    pub async fn save_clinical_notes(
        &self,
        appointment_id: String,
        notes: FfiClinicalNotes,
    ) -> Result<FfiAppointment, ClinicCoreError> {
        self.mutate(&appointment_id, AppointmentAction::SaveClinicalNotes(notes.into()))
            .await
    }

    pub async fn complete_appointment(&self, appointment_id: String) -> Result<FfiAppointment, ClinicCoreError> {
        self.mutate(&appointment_id, AppointmentAction::Complete).await
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: String,
        reason: Option<String>,
    ) -> Result<FfiAppointment, ClinicCoreError> {
        self.mutate(&appointment_id, AppointmentAction::Cancel(reason))
            .await
    }

    pub async fn mark_no_show(&self, appointment_id: String) -> Result<FfiAppointment, ClinicCoreError> {
        self.mutate(&appointment_id, AppointmentAction::MarkNoShow).await
    }

    /// Forget the session; the next request re-authenticates.
    pub async fn sign_out(&self) {
        self.client.tokens().clear().await;
        tracing::info!("Signed out");
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Add or update a medication in the local catalog.
    pub fn upsert_medication(&self, medication: FfiMedication) -> Result<(), ClinicCoreError> {
        let db = self.db.lock()?;
        db.upsert_medication(&medication.into())?;
        Ok(())
    }

    /// Get a medication from the server, or the cached copy while offline.
    /// `None` when the server no longer knows it.
    pub async fn get_medication(&self, medication_id: String) -> Result<Option<FfiMedication>, ClinicCoreError> {
        match self.catalog.get(&medication_id).await {
            Ok(medication) => Ok(Some(medication.into())),
            Err(CatalogError::Client(e)) if e.kind == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Search by brand, generic name or composition. Falls back to the
    /// local index when the server is unreachable.
    pub async fn search_medications(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiMedicationMatch>, ClinicCoreError> {
        let matches = self.catalog.search(&query, limit as usize).await?;
        Ok(matches.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Prescription Operations
    // =========================================================================

    /// Open a prescription session, optionally tied to an appointment.
    pub async fn start_prescription(&self, appointment_id: Option<String>) -> Result<String, ClinicCoreError> {
        let mut composer = PrescriptionComposer::new(self.client.clone(), self.gate.clone())
            .with_database(self.db.clone());
        if let Some(appointment_id) = appointment_id {
            let appointment = self.appointment(&appointment_id).await?;
            composer = composer.with_encounter(self.encounters.clone(), appointment);
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        self.prescriptions
            .lock()?
            .insert(session_id.clone(), Arc::new(tokio::sync::Mutex::new(composer)));
        tracing::debug!(session_id = %session_id, "Prescription session started");
        Ok(session_id)
    }

    /// Add a catalog medication and re-check interactions.
    pub async fn add_medication(
        &self,
        session_id: String,
        medication_id: String,
    ) -> Result<FfiAssessment, ClinicCoreError> {
        let session = self.session(&session_id)?;
        let medication = self.catalog.get(&medication_id).await?;

        let mut composer = session.lock().await;
        composer.add_medication(&medication).await;
        Ok(FfiAssessment::of(&composer))
    }

    pub async fn remove_medication(
        &self,
        session_id: String,
        index: u32,
    ) -> Result<FfiAssessment, ClinicCoreError> {
        let session = self.session(&session_id)?;
        let mut composer = session.lock().await;
        composer.remove_medication(index as usize).await?;
        Ok(FfiAssessment::of(&composer))
    }

    /// Change dosing fields; interactions are not re-checked.
    pub async fn edit_medication(
        &self,
        session_id: String,
        index: u32,
        edit: FfiMedicationEdit,
    ) -> Result<Vec<FfiMedicationLine>, ClinicCoreError> {
        let session = self.session(&session_id)?;
        let mut composer = session.lock().await;
        composer.edit_medication(index as usize, edit.into())?;
        Ok(composer.medications().iter().map(Into::into).collect())
    }

    pub async fn set_prescription_details(
        &self,
        session_id: String,
        diagnosis: Vec<FfiDiagnosis>,
        notes: Option<String>,
    ) -> Result<(), ClinicCoreError> {
        let session = self.session(&session_id)?;
        let mut composer = session.lock().await;
        composer.set_diagnosis(diagnosis.into_iter().map(Into::into).collect());
        composer.set_notes(notes);
        Ok(())
    }

    /// Re-run the interaction check, e.g. after a failed lookup.
    pub async fn refresh_interactions(&self, session_id: String) -> Result<FfiAssessment, ClinicCoreError> {
        let session = self.session(&session_id)?;
        let mut composer = session.lock().await;
        composer.refresh().await;
        Ok(FfiAssessment::of(&composer))
    }

    /// Acknowledge the current severe warnings.
    pub async fn grant_override(
        &self,
        session_id: String,
        actor: String,
    ) -> Result<FfiAssessment, ClinicCoreError> {
        let session = self.session(&session_id)?;
        let mut composer = session.lock().await;
        composer.grant_override(&actor)?;
        Ok(FfiAssessment::of(&composer))
    }

    pub async fn submit_prescription(
        &self,
        session_id: String,
        target: FfiPrescriptionTarget,
    ) -> Result<FfiSubmitOutcome, ClinicCoreError> {
        let session = self.session(&session_id)?;
        let mut composer = session.lock().await;
        let outcome = composer.submit(&target.into()).await?;

        if let SubmitOutcome::Submitted(_) = &outcome {
            self.prescriptions.lock()?.remove(&session_id);
        }
        Ok(outcome.into())
    }

    pub fn discard_prescription(&self, session_id: String) -> bool {
        self.prescriptions
            .lock()
            .map(|mut sessions| sessions.remove(&session_id).is_some())
            .unwrap_or(false)
    }
}

fn parse_status(value: &str) -> Result<AppointmentStatus, ClinicCoreError> {
    AppointmentStatus::parse(value)
        .ok_or_else(|| ClinicCoreError::InvalidInput(format!("unknown appointment status {:?}", value)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe client configuration.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiClientConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub database_path: Option<String>,
}

impl From<FfiClientConfig> for ClientConfig {
    fn from(config: FfiClientConfig) -> Self {
        ClientConfig {
            base_url: config.base_url,
            request_timeout_ms: config.request_timeout_ms,
            max_retries: config.max_retries,
            database_path: config.database_path,
            ..ClientConfig::default()
        }
    }
}

impl From<ClientConfig> for FfiClientConfig {
    fn from(config: ClientConfig) -> Self {
        Self {
            base_url: config.base_url,
            request_timeout_ms: config.request_timeout_ms,
            max_retries: config.max_retries,
            database_path: config.database_path,
        }
    }
}

/// FFI-safe appointment filter.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiAppointmentFilter {
    pub clinic_id: Option<String>,
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub status: Option<String>,
    pub date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl TryFrom<FfiAppointmentFilter> for AppointmentFilter {
    type Error = ClinicCoreError;

    fn try_from(filter: FfiAppointmentFilter) -> Result<Self, Self::Error> {
        Ok(AppointmentFilter {
            clinic: filter.clinic_id,
            doctor: filter.doctor_id,
            patient: filter.patient_id,
            status: filter.status.as_deref().map(parse_status).transpose()?,
            date: filter.date,
            page: filter.page,
            limit: filter.limit,
        })
    }
}

/// FFI-safe vitals.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiVitals {
    pub blood_pressure_systolic: Option<f64>,
    pub blood_pressure_diastolic: Option<f64>,
    pub pulse: Option<f64>,
    pub temperature: Option<f64>,
    pub spo2: Option<f64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub notes: Option<String>,
    pub bmi: Option<f64>,
}

impl From<FfiVitals> for Vitals {
    fn from(v: FfiVitals) -> Self {
        Vitals {
            blood_pressure_systolic: v.blood_pressure_systolic,
            blood_pressure_diastolic: v.blood_pressure_diastolic,
            pulse: v.pulse,
            temperature: v.temperature,
            spo2: v.spo2,
            weight: v.weight,
            height: v.height,
            notes: v.notes,
            recorded_at: None,
        }
    }
}

impl From<Vitals> for FfiVitals {
    fn from(v: Vitals) -> Self {
        Self {
            bmi: v.bmi(),
            blood_pressure_systolic: v.blood_pressure_systolic,
            blood_pressure_diastolic: v.blood_pressure_diastolic,
            pulse: v.pulse,
            temperature: v.temperature,
            spo2: v.spo2,
            weight: v.weight,
            height: v.height,
            notes: v.notes,
        }
    }
}

/// FFI-safe clinical notes.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiClinicalNotes {
    pub chief_complaint: Option<String>,
    pub symptoms: Option<String>,
    pub examination: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub additional_notes: Option<String>,
}

impl From<FfiClinicalNotes> for ClinicalNotes {
    fn from(n: FfiClinicalNotes) -> Self {
        ClinicalNotes {
            chief_complaint: n.chief_complaint,
            symptoms: n.symptoms,
            examination: n.examination,
            diagnosis: n.diagnosis,
            treatment_plan: n.treatment_plan,
            additional_notes: n.additional_notes,
            recorded_at: None,
        }
    }
}

impl From<ClinicalNotes> for FfiClinicalNotes {
    fn from(n: ClinicalNotes) -> Self {
        Self {
            chief_complaint: n.chief_complaint,
            symptoms: n.symptoms,
            examination: n.examination,
            diagnosis: n.diagnosis,
            treatment_plan: n.treatment_plan,
            additional_notes: n.additional_notes,
        }
    }
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: String,
    pub status: String,
    pub clinic_id: Option<String>,
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub start_at: Option<String>,
    pub vitals: Option<FfiVitals>,
    pub clinical_notes: Option<FfiClinicalNotes>,
    pub notes: Option<String>,
    pub prescription_ids: Vec<String>,
    /// Actions the UI may offer, e.g. `RecordVitals`, `Complete`
    pub allowed_actions: Vec<String>,
}

impl From<Appointment> for FfiAppointment {
    fn from(apt: Appointment) -> Self {
        let mut allowed: Vec<Transition> = encounter::allowed_transitions(apt.status);
        if !apt.has_clinical_notes() {
            allowed.retain(|t| *t != Transition::Complete);
        }
        Self {
            patient_name: apt.patient_name().map(str::to_string),
            status: apt.status.as_str().to_string(),
            clinic_id: apt.clinic.as_ref().map(|r| r.id().to_string()),
            doctor_id: apt.doctor.as_ref().map(|r| r.id().to_string()),
            patient_id: apt.patient.as_ref().map(|r| r.id().to_string()),
            start_at: apt.start_at.map(|t| t.to_rfc3339()),
            vitals: apt.vitals.map(Into::into),
            clinical_notes: apt.clinical_notes.map(Into::into),
            notes: apt.notes,
            prescription_ids: apt.prescriptions.iter().map(|r| r.id().to_string()).collect(),
            allowed_actions: allowed.iter().map(|t| format!("{:?}", t)).collect(),
            id: apt.id,
        }
    }
}

/// FFI-safe catalog medication.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedication {
    pub id: String,
    pub name: String,
    pub generic_name: Option<String>,
    pub aliases: Vec<String>,
    pub compositions: Vec<FfiComposition>,
    pub strength: Option<String>,
    pub form: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiComposition {
    pub id: String,
    pub name: String,
}

impl From<CatalogMedication> for FfiMedication {
    fn from(m: CatalogMedication) -> Self {
        Self {
            id: m.id,
            name: m.name,
            generic_name: m.generic_name,
            aliases: m.aliases,
            compositions: m
                .compositions
                .into_iter()
                .map(|c| FfiComposition { id: c.id, name: c.name })
                .collect(),
            strength: m.strength,
            form: m.form,
            active: m.active,
        }
    }
}

impl From<FfiMedication> for CatalogMedication {
    fn from(m: FfiMedication) -> Self {
        CatalogMedication {
            id: m.id,
            name: m.name,
            generic_name: m.generic_name,
            aliases: m.aliases,
            compositions: m
                .compositions
                .into_iter()
                .map(|c| Composition::new(c.id, c.name))
                .collect(),
            strength: m.strength,
            form: m.form,
            active: m.active,
        }
    }
}

/// FFI-safe search hit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedicationMatch {
    pub medication: FfiMedication,
    pub score: f64,
}

impl From<MedicationMatch> for FfiMedicationMatch {
    fn from(m: MedicationMatch) -> Self {
        Self {
            medication: m.medication.into(),
            score: m.score,
        }
    }
}

/// FFI-safe medication line in a prescription session.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedicationLine {
    pub medication_id: String,
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

impl From<&MedicationCandidate> for FfiMedicationLine {
    fn from(c: &MedicationCandidate) -> Self {
        Self {
            medication_id: c.medication_id.clone(),
            name: c.name.clone(),
            dosage: c.dosage.clone(),
            frequency: c.frequency.clone(),
            duration: c.duration.clone(),
            instructions: c.instructions.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiMedicationEdit {
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

impl From<FfiMedicationEdit> for MedicationEdit {
    fn from(e: FfiMedicationEdit) -> Self {
        MedicationEdit {
            dosage: e.dosage,
            frequency: e.frequency,
            duration: e.duration,
            instructions: e.instructions,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDiagnosis {
    pub code: Option<String>,
    pub text: String,
}

impl From<FfiDiagnosis> for Diagnosis {
    fn from(d: FfiDiagnosis) -> Self {
        Diagnosis {
            code: d.code,
            text: d.text,
        }
    }
}

/// FFI-safe interaction warning.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInteractionWarning {
    pub composition_a: String,
    pub composition_a_name: Option<String>,
    pub composition_b: String,
    pub composition_b_name: Option<String>,
    pub severity: String,
    pub description: Option<String>,
    pub recommendation: Option<String>,
    pub requires_override: bool,
}

impl From<&InteractionWarning> for FfiInteractionWarning {
    fn from(w: &InteractionWarning) -> Self {
        Self {
            composition_a: w.comp_a.id().to_string(),
            composition_a_name: w.comp_a.name().map(str::to_string),
            composition_b: w.comp_b.id().to_string(),
            composition_b_name: w.comp_b.name().map(str::to_string),
            severity: w.severity.as_str().to_string(),
            description: w.description.clone(),
            recommendation: w.recommendation.clone(),
            requires_override: w.severity.requires_override(),
        }
    }
}

/// FFI-safe gate state of a prescription session.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAssessment {
    /// `false` when the interaction check failed
    pub evaluated: bool,
    pub fingerprint: String,
    pub warnings: Vec<FfiInteractionWarning>,
    pub max_severity: Option<String>,
    pub requires_override: bool,
    pub has_override: bool,
    /// Submission would be refused locally
    pub blocking: bool,
    pub error_message: Option<String>,
    pub medications: Vec<FfiMedicationLine>,
}

impl FfiAssessment {
    fn of(composer: &PrescriptionComposer) -> Self {
        let assessment = composer.assessment();
        let has_override = composer.has_override();
        Self {
            evaluated: !assessment.is_unknown(),
            fingerprint: assessment.fingerprint().to_string(),
            warnings: assessment.warnings().iter().map(Into::into).collect(),
            max_severity: assessment.max_severity().map(|s| s.as_str().to_string()),
            requires_override: assessment.requires_override(),
            has_override,
            blocking: assessment.is_unknown() || (assessment.requires_override() && !has_override),
            error_message: match assessment {
                Assessment::Unknown { error, .. } => Some(error.message.clone()),
                Assessment::Evaluated { .. } => None,
            },
            medications: composer.medications().iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiPrescriptionTarget {
    Create {
        clinic_id: String,
        patient_id: String,
        appointment_id: Option<String>,
    },
    Update {
        prescription_id: String,
    },
}

impl From<FfiPrescriptionTarget> for PrescriptionTarget {
    fn from(t: FfiPrescriptionTarget) -> Self {
        match t {
            FfiPrescriptionTarget::Create {
                clinic_id,
                patient_id,
                appointment_id,
            } => PrescriptionTarget::Create {
                clinic_id,
                patient_id,
                appointment_id,
            },
            FfiPrescriptionTarget::Update { prescription_id } => {
                PrescriptionTarget::Update { prescription_id }
            }
        }
    }
}

#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiSubmitOutcome {
    Submitted {
        prescription_id: String,
        override_ddi: bool,
        warning_count: u32,
    },
    OverrideRequired {
        warnings: Vec<FfiInteractionWarning>,
    },
    DuplicateExists {
        existing_prescription_id: String,
    },
    SafetyUnknown {
        message: String,
    },
}

impl From<SubmitOutcome> for FfiSubmitOutcome {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Submitted(rx) => FfiSubmitOutcome::Submitted {
                prescription_id: rx.id,
                override_ddi: rx.override_ddi,
                warning_count: rx.warnings.len() as u32,
            },
            SubmitOutcome::OverrideRequired { warnings } => FfiSubmitOutcome::OverrideRequired {
                warnings: warnings.iter().map(Into::into).collect(),
            },
            SubmitOutcome::DuplicateExists {
                existing_prescription_id,
            } => FfiSubmitOutcome::DuplicateExists {
                existing_prescription_id,
            },
            SubmitOutcome::SafetyUnknown { error } => FfiSubmitOutcome::SafetyUnknown {
                message: error.message,
            },
        }
    }
}

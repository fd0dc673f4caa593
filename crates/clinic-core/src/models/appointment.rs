//! Appointment, vitals and clinical-note models.
//!
//! These mirror the JSON the clinic API returns. Server documents may be
//! populated (`{"_id": ..., "name": ...}`) or bare ids, so references are
//! modeled with [`EntityRef`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinic_net::encode_component;

/// Lifecycle state of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::InProgress => "in-progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "in-progress" => Some(AppointmentStatus::InProgress),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no-show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    /// Completed, cancelled and no-show appointments accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    #[default]
    FirstVisit,
    FollowUp,
}

/// Reference to another server document, bare or populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Id(String),
    Populated {
        #[serde(rename = "_id")]
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl EntityRef {
    pub fn id(&self) -> &str {
        match self {
            EntityRef::Id(id) => id,
            EntityRef::Populated { id, .. } => id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            EntityRef::Id(_) => None,
            EntityRef::Populated { name, .. } => name.as_deref(),
        }
    }
}

impl From<&str> for EntityRef {
    fn from(id: &str) -> Self {
        EntityRef::Id(id.to_string())
    }
}

/// Walk-in patient details captured before a patient record exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporaryPatient {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Physiological readings taken at the start of a consultation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure_systolic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure_diastolic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<f64>,
    /// Degrees Fahrenheit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<f64>,
    /// Kilograms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Centimeters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Set by the server.
    #[serde(default, skip_serializing)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Vitals {
    /// True when no reading or note was entered.
    pub fn is_empty(&self) -> bool {
        self.blood_pressure_systolic.is_none()
            && self.blood_pressure_diastolic.is_none()
            && self.pulse.is_none()
            && self.temperature.is_none()
            && self.spo2.is_none()
            && self.weight.is_none()
            && self.height.is_none()
            && self.notes.as_deref().map_or(true, |n| n.trim().is_empty())
    }

    /// Body-mass index from weight (kg) and height (cm).
    pub fn bmi(&self) -> Option<f64> {
        let weight = self.weight?;
        let height_m = self.height? / 100.0;
        if height_m <= 0.0 {
            return None;
        }
        Some(weight / (height_m * height_m))
    }
}

/// Consultation findings recorded by the doctor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalNotes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chief_complaint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
    #[serde(default, skip_serializing)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl ClinicalNotes {
    /// True when at least one field holds non-blank text.
    pub fn has_content(&self) -> bool {
        [
            &self.chief_complaint,
            &self.symptoms,
            &self.examination,
            &self.diagnosis,
            &self.treatment_plan,
            &self.additional_notes,
        ]
        .iter()
        .any(|field| field.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// A booked visit between a patient and a doctor at a clinic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub clinic: Option<EntityRef>,
    #[serde(default)]
    pub doctor: Option<EntityRef>,
    #[serde(default)]
    pub patient: Option<EntityRef>,
    #[serde(default, rename = "tempPatientData")]
    pub temporary_patient: Option<TemporaryPatient>,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub visit_type: VisitType,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vitals: Option<Vitals>,
    #[serde(default)]
    pub clinical_notes: Option<ClinicalNotes>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub prescriptions: Vec<EntityRef>,
}

impl Appointment {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            clinic: None,
            doctor: None,
            patient: None,
            temporary_patient: None,
            status: AppointmentStatus::Scheduled,
            visit_type: VisitType::FirstVisit,
            start_at: None,
            end_at: None,
            vitals: None,
            clinical_notes: None,
            notes: None,
            prescriptions: Vec::new(),
        }
    }

    pub fn has_vitals(&self) -> bool {
        self.vitals.as_ref().is_some_and(|v| !v.is_empty())
    }

    pub fn has_clinical_notes(&self) -> bool {
        self.clinical_notes.as_ref().is_some_and(ClinicalNotes::has_content)
    }

    /// Display name of the patient, falling back to the walk-in details.
    pub fn patient_name(&self) -> Option<&str> {
        self.patient
            .as_ref()
            .and_then(EntityRef::name)
            .or_else(|| self.temporary_patient.as_ref()?.name.as_deref())
    }
}

/// Query filters for `GET /appointments`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub clinic: Option<String>,
    pub doctor: Option<String>,
    pub patient: Option<String>,
    pub status: Option<AppointmentStatus>,
    /// Calendar day, `YYYY-MM-DD`
    pub date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl AppointmentFilter {
    /// Render as a query string, including the leading `?` when non-empty.
    pub fn to_query(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(clinic) = &self.clinic {
            pairs.push(("clinic", clinic.clone()));
        }
        if let Some(doctor) = &self.doctor {
            pairs.push(("doctor", doctor.clone()));
        }
        if let Some(patient) = &self.patient {
            pairs.push(("patient", patient.clone()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(date) = &self.date {
            pairs.push(("date", date.clone()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }

        if pairs.is_empty() {
            return String::new();
        }
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, encode_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{}", query)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u32,
}

/// One page of `GET /appointments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentPage {
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

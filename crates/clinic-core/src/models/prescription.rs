//! Submitted prescription model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{InteractionWarning, MedicationCandidate};

/// Where a prescription submission goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrescriptionTarget {
    /// `POST /prescriptions`
    Create {
        clinic_id: String,
        patient_id: String,
        appointment_id: Option<String>,
    },
    /// `PUT /prescriptions/:id`
    Update { prescription_id: String },
}

impl PrescriptionTarget {
    pub fn appointment_id(&self) -> Option<&str> {
        match self {
            PrescriptionTarget::Create { appointment_id, .. } => appointment_id.as_deref(),
            PrescriptionTarget::Update { .. } => None,
        }
    }
}

/// Diagnosis line attached to a prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub text: String,
}

/// A prescription the server accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Prescription {
    pub id: String,
    pub appointment_id: Option<String>,
    pub medications: Vec<MedicationCandidate>,
    /// Warnings acknowledged at submission time
    pub warnings: Vec<InteractionWarning>,
    pub override_ddi: bool,
    pub overridden_by: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

//! Medication catalog and prescription line models.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::EntityRef;

/// Active ingredient; the unit of interaction checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

impl Composition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A medication in the locally cached catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMedication {
    /// Server medication id
    pub id: String,
    /// Brand name shown to the prescriber
    pub name: String,
    pub generic_name: Option<String>,
    /// Alternative spellings and brand names for search
    pub aliases: Vec<String>,
    pub compositions: Vec<Composition>,
    /// Strength as printed, e.g. "500mg"
    pub strength: Option<String>,
    /// Tablet, syrup, injection...
    pub form: Option<String>,
    pub active: bool,
}

impl CatalogMedication {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            generic_name: None,
            aliases: Vec::new(),
            compositions: Vec::new(),
            strength: None,
            form: None,
            active: true,
        }
    }

    pub fn with_composition(mut self, id: &str, name: &str) -> Self {
        self.compositions.push(Composition::new(id, name));
        self
    }

    pub fn composition_ids(&self) -> Vec<String> {
        self.compositions.iter().map(|c| c.id.clone()).collect()
    }
}

/// Medication document as served by `/medications`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub generic_name: Option<String>,
    /// Populated composition documents, or bare ids when not populated
    #[serde(default, rename = "unique_composition")]
    pub unique_composition: Option<Vec<EntityRef>>,
    /// Raw label text, e.g. "Paracetamol 500mg + Caffeine 50mg"
    #[serde(default, rename = "exact_composition")]
    pub exact_composition: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
}

impl From<MedicationDocument> for CatalogMedication {
    fn from(doc: MedicationDocument) -> Self {
        let compositions = doc
            .unique_composition
            .unwrap_or_default()
            .iter()
            .map(|c| Composition::new(c.id(), c.name().unwrap_or(c.id())))
            .collect();
        let name = doc
            .brand_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| doc.generic_name.clone())
            .unwrap_or_else(|| doc.id.clone());

        CatalogMedication {
            id: doc.id,
            name,
            generic_name: doc.generic_name,
            aliases: Vec::new(),
            compositions,
            strength: doc.exact_composition,
            form: doc.form,
            active: true,
        }
    }
}

/// Catalog search hit with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct MedicationMatch {
    pub medication: CatalogMedication,
    /// 0.0 - 1.0
    pub score: f64,
}

/// One medication line while a prescription is being composed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationCandidate {
    pub medication_id: String,
    pub name: String,
    pub composition_ids: Vec<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

impl MedicationCandidate {
    pub fn from_catalog(medication: &CatalogMedication) -> Self {
        Self {
            medication_id: medication.id.clone(),
            name: medication.name.clone(),
            composition_ids: medication.composition_ids(),
            dosage: None,
            frequency: None,
            duration: None,
            instructions: None,
        }
    }

    pub fn with_dosage(mut self, dosage: &str) -> Self {
        self.dosage = Some(dosage.to_string());
        self
    }

    pub fn with_frequency(mut self, frequency: &str) -> Self {
        self.frequency = Some(frequency.to_string());
        self
    }

    pub fn with_duration(mut self, duration: &str) -> Self {
        self.duration = Some(duration.to_string());
        self
    }

    /// Wire form of a `meds[]` entry.
    pub fn to_wire(&self) -> Value {
        json!({
            "medication": self.medication_id,
            "dosage": self.dosage,
            "frequency": self.frequency,
            "duration": self.duration,
            "notes": self.instructions,
        })
    }
}

/// Field edits that do not change composition membership.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MedicationEdit {
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

impl MedicationEdit {
    /// Apply every field that is set.
    pub fn apply(self, candidate: &mut MedicationCandidate) {
        if let Some(dosage) = self.dosage {
            candidate.dosage = Some(dosage);
        }
        if let Some(frequency) = self.frequency {
            candidate.frequency = Some(frequency);
        }
        if let Some(duration) = self.duration {
            candidate.duration = Some(duration);
        }
        if let Some(instructions) = self.instructions {
            candidate.instructions = Some(instructions);
        }
    }
}

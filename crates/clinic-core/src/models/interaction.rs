//! Drug-drug interaction models.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::EntityRef;

/// Interaction severity, ordered lowest to highest.
///
/// `Unknown` is the knowledge-base default for rules imported without a
/// grading. It ranks below `Minor` and never requires an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Unknown,
    Minor,
    Moderate,
    Major,
    Contraindicated,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Major => "major",
            Severity::Contraindicated => "contraindicated",
        }
    }

    /// Unrecognized gradings map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "minor" => Severity::Minor,
            "moderate" => Severity::Moderate,
            "major" => Severity::Major,
            "contraindicated" => Severity::Contraindicated,
            _ => Severity::Unknown,
        }
    }

    pub fn requires_override(&self) -> bool {
        matches!(self, Severity::Major | Severity::Contraindicated)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Severity::parse).unwrap_or_default())
    }
}

/// One interaction between two compositions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionWarning {
    pub comp_a: EntityRef,
    pub comp_b: EntityRef,
    #[serde(default)]
    pub severity: Severity,
    /// Stored prescriptions name this field `text`.
    #[serde(default, alias = "text")]
    pub description: Option<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
}

impl InteractionWarning {
    pub fn new(comp_a: &str, comp_b: &str, severity: Severity) -> Self {
        Self {
            comp_a: EntityRef::from(comp_a),
            comp_b: EntityRef::from(comp_b),
            severity,
            description: None,
            recommendation: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    /// Composition ids ordered so that `a <= b`.
    pub fn pair(&self) -> (&str, &str) {
        let (a, b) = (self.comp_a.id(), self.comp_b.id());
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Same warning with the pair in canonical order.
    pub fn canonical(mut self) -> Self {
        if self.comp_a.id() > self.comp_b.id() {
            std::mem::swap(&mut self.comp_a, &mut self.comp_b);
        }
        self
    }

    /// Wire form attached to a prescription submission.
    pub fn to_snapshot(&self) -> Value {
        let (a, b) = self.pair();
        json!({
            "compA": a,
            "compB": b,
            "severity": self.severity.as_str(),
            "description": self.description,
            "recommendation": self.recommendation,
        })
    }
}

/// Highest severity present, if any.
pub fn max_severity(warnings: &[InteractionWarning]) -> Option<Severity> {
    warnings.iter().map(|w| w.severity).max()
}

/// True iff the highest severity is major or contraindicated.
pub fn requires_override(warnings: &[InteractionWarning]) -> bool {
    max_severity(warnings).is_some_and(|s| s.requires_override())
}

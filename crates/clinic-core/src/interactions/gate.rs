//! Pairwise interaction gate.
//!
//! The gate answers one question for a composition set: may a prescription
//! containing it be persisted without an explicit override? A failed lookup
//! is never read as "no interactions"; it yields [`Assessment::Unknown`],
//! which blocks submission until re-evaluated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use clinic_net::ClientError;

use super::{GateError, GateResult, InteractionLookup};
use crate::models::{max_severity, requires_override, InteractionWarning, Severity};

/// Result of evaluating one composition set.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    Evaluated {
        /// Highest severity first
        warnings: Vec<InteractionWarning>,
        fingerprint: String,
        /// Every unordered pair covered by the lookup
        pairs_checked: Vec<(String, String)>,
    },
    Unknown {
        fingerprint: String,
        error: ClientError,
    },
}

impl Assessment {
    /// Assessment of the empty set.
    pub fn empty() -> Self {
        Assessment::Evaluated {
            warnings: Vec::new(),
            fingerprint: fingerprint(&[]),
            pairs_checked: Vec::new(),
        }
    }

    pub fn fingerprint(&self) -> &str {
        match self {
            Assessment::Evaluated { fingerprint, .. } | Assessment::Unknown { fingerprint, .. } => {
                fingerprint
            }
        }
    }

    /// Warnings found; empty when the lookup failed.
    pub fn warnings(&self) -> &[InteractionWarning] {
        match self {
            Assessment::Evaluated { warnings, .. } => warnings,
            Assessment::Unknown { .. } => &[],
        }
    }

    pub fn pairs_checked(&self) -> &[(String, String)] {
        match self {
            Assessment::Evaluated { pairs_checked, .. } => pairs_checked,
            Assessment::Unknown { .. } => &[],
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Assessment::Unknown { .. })
    }

    pub fn max_severity(&self) -> Option<Severity> {
        max_severity(self.warnings())
    }

    /// True when the set was evaluated and carries a major or contraindicated warning.
    pub fn requires_override(&self) -> bool {
        match self {
            Assessment::Evaluated { warnings, .. } => requires_override(warnings),
            Assessment::Unknown { .. } => false,
        }
    }

    /// True when submission must not proceed without further action.
    pub fn is_blocking(&self) -> bool {
        self.is_unknown() || self.requires_override()
    }
}

/// An operator's acknowledgment of severe warnings for one exact composition set.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideGrant {
    pub fingerprint: String,
    pub actor: String,
    pub granted_at: DateTime<Utc>,
}

impl OverrideGrant {
    /// Whether this grant applies to `assessment`.
    pub fn covers(&self, assessment: &Assessment) -> bool {
        !assessment.is_unknown() && self.fingerprint == assessment.fingerprint()
    }
}

/// Evaluates composition sets against an [`InteractionLookup`].
#[derive(Clone)]
pub struct InteractionGate {
    lookup: Arc<dyn InteractionLookup>,
}

impl InteractionGate {
    pub fn new(lookup: Arc<dyn InteractionLookup>) -> Self {
        Self { lookup }
    }

    /// Evaluate a composition set given in any order, duplicates allowed.
    ///
    /// Sets with fewer than two distinct compositions are evaluated locally.
    pub async fn evaluate(&self, composition_ids: &[String]) -> Assessment {
        let ids = normalize(composition_ids);
        let fingerprint = fingerprint(&ids);

        if ids.len() < 2 {
            return Assessment::Evaluated {
                warnings: Vec::new(),
                fingerprint,
                pairs_checked: Vec::new(),
            };
        }

        let pairs_checked = unordered_pairs(&ids);
        match self.lookup.lookup(&ids).await {
            Ok(raw) => {
                let warnings = reconcile(raw, &ids);
                tracing::debug!(
                    fingerprint = %fingerprint,
                    compositions = ids.len(),
                    pairs = pairs_checked.len(),
                    warnings = warnings.len(),
                    max_severity = ?max_severity(&warnings),
                    "Interaction check complete"
                );
                Assessment::Evaluated {
                    warnings,
                    fingerprint,
                    pairs_checked,
                }
            }
            Err(error) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    kind = ?error.kind,
                    error = %error,
                    "Interaction check failed; submission blocked until re-evaluated"
                );
                Assessment::Unknown { fingerprint, error }
            }
        }
    }

    /// Grant an override for exactly the set `assessment` describes.
    pub fn grant_override(assessment: &Assessment, actor: &str) -> GateResult<OverrideGrant> {
        if actor.trim().is_empty() {
            return Err(GateError::MissingActor);
        }
        if assessment.is_unknown() {
            return Err(GateError::Unresolved);
        }
        if !assessment.requires_override() {
            return Err(GateError::NotRequired);
        }

        tracing::info!(
            fingerprint = %assessment.fingerprint(),
            actor,
            max_severity = ?assessment.max_severity(),
            "Interaction override granted"
        );
        Ok(OverrideGrant {
            fingerprint: assessment.fingerprint().to_string(),
            actor: actor.to_string(),
            granted_at: Utc::now(),
        })
    }
}

/// Sorted, de-duplicated composition ids.
pub fn normalize(composition_ids: &[String]) -> Vec<String> {
    composition_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// SHA-256 over the normalized ids joined by newlines.
pub fn fingerprint(normalized_ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_ids.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// Every unordered pair `(a, b)` with `a < b` from a normalized id list.
pub fn unordered_pairs(normalized_ids: &[String]) -> Vec<(String, String)> {
    let n = normalized_ids.len();
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for (i, a) in normalized_ids.iter().enumerate() {
        for b in &normalized_ids[i + 1..] {
            pairs.push((a.clone(), b.clone()));
        }
    }
    pairs
}

/// Canonicalize, drop pairs outside the set, keep the most severe warning per pair.
fn reconcile(raw: Vec<InteractionWarning>, normalized_ids: &[String]) -> Vec<InteractionWarning> {
    let mut by_pair: BTreeMap<(String, String), InteractionWarning> = BTreeMap::new();

    for warning in raw.into_iter().map(InteractionWarning::canonical) {
        let (a, b) = warning.pair();
        if a == b
            || normalized_ids.binary_search_by(|id| id.as_str().cmp(a)).is_err()
            || normalized_ids.binary_search_by(|id| id.as_str().cmp(b)).is_err()
        {
            continue;
        }
        let key = (a.to_string(), b.to_string());
        match by_pair.get(&key) {
            Some(existing) if existing.severity >= warning.severity => {}
            _ => {
                by_pair.insert(key, warning);
            }
        }
    }

    let mut warnings: Vec<_> = by_pair.into_values().collect();
    // Stable sort keeps pair order within a severity
    warnings.sort_by(|x, y| y.severity.cmp(&x.severity));
    warnings
}

//! Drug-drug interaction gate and its knowledge-base lookup.

mod gate;
mod lookup;

pub use gate::*;
pub use lookup::*;

use thiserror::Error;

/// Override policy violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Interaction check did not complete; re-run it before overriding")]
    Unresolved,

    #[error("No major or contraindicated interaction requires an override")]
    NotRequired,

    #[error("An override must name the acting clinician")]
    MissingActor,
}

pub type GateResult<T> = Result<T, GateError>;

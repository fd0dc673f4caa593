//! Appointment lifecycle: the status transition table and the service that
//! persists each step through the clinic API.

mod service;
mod transitions;

pub use service::*;
pub use transitions::*;

use thiserror::Error;

use clinic_net::ClientError;

use crate::db::DbError;
use crate::models::AppointmentStatus;

#[derive(Error, Debug)]
pub enum EncounterError {
    #[error("Cannot {transition} an appointment that is {from}")]
    IllegalTransition {
        from: AppointmentStatus,
        transition: Transition,
    },

    #[error("Clinical notes are required before completing the appointment")]
    MissingClinicalNotes,

    #[error("Nothing to save: {0} are empty")]
    EmptyRecord(&'static str),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub type EncounterResult<T> = Result<T, EncounterError>;

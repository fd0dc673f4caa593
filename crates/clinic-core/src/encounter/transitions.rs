//! Appointment status transition table.
//!
//! ```text
//!              RecordVitals                Complete
//! scheduled ───────────────► in-progress ───────────► completed
//!     │  ▲ SaveClinicalNotes     │  ▲ RecordVitals / SaveClinicalNotes
//!     │  └──────────┘            │  └──────────┘
//!     ├── Cancel ────────────────┴── Cancel ─────────► cancelled
//!     └── MarkNoShow ────────────────────────────────► no-show
//! ```
//!
//! The first vitals write is also the `scheduled → in-progress` transition;
//! the table names it so the implicit rule is testable on its own.

use std::fmt;

use crate::models::AppointmentStatus;

/// Operator actions that mutate an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    RecordVitals,
    SaveClinicalNotes,
    Complete,
    Cancel,
    MarkNoShow,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::RecordVitals => "record vitals",
            Transition::SaveClinicalNotes => "save clinical notes",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
            Transition::MarkNoShow => "mark no-show",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status after applying `transition` to `current`, or `None` if illegal.
pub fn next_status(current: AppointmentStatus, transition: Transition) -> Option<AppointmentStatus> {
    use AppointmentStatus::*;
    use Transition::*;

    match (current, transition) {
        (Scheduled, RecordVitals) => Some(InProgress),
        (InProgress, RecordVitals) => Some(InProgress),
        (Scheduled, SaveClinicalNotes) => Some(Scheduled),
        (InProgress, SaveClinicalNotes) => Some(InProgress),
        (InProgress, Complete) => Some(Completed),
        (Scheduled, Cancel) | (InProgress, Cancel) => Some(Cancelled),
        (Scheduled, MarkNoShow) => Some(NoShow),
        _ => None,
    }
}

/// Transitions available from `current`.
pub fn allowed_transitions(current: AppointmentStatus) -> Vec<Transition> {
    [
        Transition::RecordVitals,
        Transition::SaveClinicalNotes,
        Transition::Complete,
        Transition::Cancel,
        Transition::MarkNoShow,
    ]
    .into_iter()
    .filter(|t| next_status(current, *t).is_some())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    const ALL_STATUSES: [AppointmentStatus; 5] = [Scheduled, InProgress, Completed, Cancelled, NoShow];

    #[test]
    fn test_first_vitals_starts_consultation() {
        assert_eq!(next_status(Scheduled, Transition::RecordVitals), Some(InProgress));
        // Re-recording is a pure data write
        assert_eq!(next_status(InProgress, Transition::RecordVitals), Some(InProgress));
    }

    #[test]
    fn test_complete_only_from_in_progress() {
        assert_eq!(next_status(InProgress, Transition::Complete), Some(Completed));
        assert_eq!(next_status(Scheduled, Transition::Complete), None);
    }

    #[test]
    fn test_cancel_and_no_show() {
        assert_eq!(next_status(Scheduled, Transition::Cancel), Some(Cancelled));
        assert_eq!(next_status(InProgress, Transition::Cancel), Some(Cancelled));
        assert_eq!(next_status(Scheduled, Transition::MarkNoShow), Some(NoShow));
        assert_eq!(next_status(InProgress, Transition::MarkNoShow), None);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for status in ALL_STATUSES.iter().filter(|s| s.is_terminal()) {
            assert!(allowed_transitions(*status).is_empty(), "{} accepted a transition", status);
        }
    }

    #[test]
    fn test_notes_never_change_status() {
        for status in ALL_STATUSES {
            if let Some(next) = next_status(status, Transition::SaveClinicalNotes) {
                assert_eq!(next, status);
            }
        }
    }

    #[test]
    fn test_allowed_from_scheduled() {
        assert_eq!(
            allowed_transitions(Scheduled),
            vec![
                Transition::RecordVitals,
                Transition::SaveClinicalNotes,
                Transition::Cancel,
                Transition::MarkNoShow,
            ]
        );
    }
}

//! Offline cache of server appointments.

use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, DbResult};
use crate::models::{Appointment, AppointmentStatus};

pub const APPOINTMENTS_SYNC_KEY: &str = "appointments_last_sync";

const UPSERT_APPOINTMENT: &str = r#"
    INSERT INTO appointments (id, status, clinic_id, doctor_id, start_at, payload, cached_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
    ON CONFLICT(id) DO UPDATE SET
        status = excluded.status,
        clinic_id = excluded.clinic_id,
        doctor_id = excluded.doctor_id,
        start_at = excluded.start_at,
        payload = excluded.payload,
        cached_at = datetime('now')
"#;

fn upsert_appointment(conn: &Connection, appointment: &Appointment) -> DbResult<()> {
    let payload = serde_json::to_string(appointment)?;
    conn.execute(
        UPSERT_APPOINTMENT,
        params![
            appointment.id,
            appointment.status.as_str(),
            appointment.clinic.as_ref().map(|c| c.id()),
            appointment.doctor.as_ref().map(|d| d.id()),
            appointment.start_at.map(|t| t.to_rfc3339()),
            payload,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Store the appointment exactly as last read from the server.
    pub fn cache_appointment(&self, appointment: &Appointment) -> DbResult<()> {
        upsert_appointment(&self.conn, appointment)
    }

    /// Cache a page of appointments in one transaction and stamp the sync marker.
    pub fn cache_appointments(
        &mut self,
        appointments: &[Appointment],
        synced_at: &str,
    ) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        for appointment in appointments {
            upsert_appointment(&tx, appointment)?;
        }
        tx.execute(
            r#"
            INSERT INTO sync_state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
            "#,
            params![APPOINTMENTS_SYNC_KEY, synced_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_cached_appointment(&self, id: &str) -> DbResult<Option<Appointment>> {
        let payload: Option<String> = self
            .conn
            .query_row("SELECT payload FROM appointments WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
    }

    /// Cached appointments, optionally filtered by status, ordered by start time.
    pub fn list_cached_appointments(
        &self,
        status: Option<AppointmentStatus>,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT payload FROM appointments
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY start_at IS NULL, start_at, id
            "#,
        )?;
        let rows = stmt.query_map([status.map(|s| s.as_str())], |row| row.get::<_, String>(0))?;

        let mut appointments = Vec::new();
        for payload in rows {
            appointments.push(serde_json::from_str(&payload?)?);
        }
        Ok(appointments)
    }
}

//! On-disk storage: credential cold start, catalog and appointment cache.

use std::sync::{Arc, Mutex};

use clinic_core::db::{Database, SqliteCredentialStore, APPOINTMENTS_SYNC_KEY};
use clinic_core::models::{Appointment, AppointmentStatus, CatalogMedication};
use clinic_net::mock::{ScriptedTransport, StaticTokenSource};
use clinic_net::{
    ConnectivityFlag, ErrorKind, RequestEnvelope, ResilientHttpClient, TokenProvider,
};
use serde_json::json;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Arc<Mutex<Database>> {
    let path = dir.path().join("clinic.db");
    Arc::new(Mutex::new(Database::open(path).unwrap()))
}

fn provider(db: &Arc<Mutex<Database>>, source: StaticTokenSource) -> Arc<TokenProvider> {
    Arc::new(TokenProvider::new(
        Arc::new(source),
        Arc::new(SqliteCredentialStore::new(db.clone())),
    ))
}

#[tokio::test]
async fn test_credential_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let db = open(&dir);
        let tokens = provider(&db, StaticTokenSource::new(Some("tok-1")));
        assert_eq!(tokens.current().await.as_deref(), Some("tok-1"));
    }

    // Cold start before the identity provider has restored its session
    let db = open(&dir);
    let tokens = provider(&db, StaticTokenSource::new(None));
    assert_eq!(tokens.current().await.as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn test_session_expiry_deletes_persisted_credential() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let tokens = provider(&db, StaticTokenSource::new(Some("stale")));

    let transport = Arc::new(
        ScriptedTransport::new().respond_times(401, json!({"error": "Invalid token"}), 2),
    );
    let client = ResilientHttpClient::new(
        "http://clinic.test/api",
        transport.clone(),
        tokens,
        Arc::new(ConnectivityFlag::default()),
    );

    let err = client
        .send(&RequestEnvelope::get("/appointments"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionExpired);
    assert_eq!(transport.attempts(), 1);
    drop(client);
    drop(db);

    let db = open(&dir);
    assert!(db.lock().unwrap().load_credential().unwrap().is_none());
}

#[test]
fn test_catalog_search_after_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let db = open(&dir);
        let db = db.lock().unwrap();
        let mut warf = CatalogMedication::new("m-warf", "Warf 5")
            .with_composition("c-warfarin", "Warfarin");
        warf.generic_name = Some("Warfarin sodium".into());
        db.upsert_medication(&warf).unwrap();
        db.upsert_medication(
            &CatalogMedication::new("m-ecosprin", "Ecosprin 75").with_composition("c-aspirin", "Aspirin"),
        )
        .unwrap();
    }

    let db = open(&dir);
    let db = db.lock().unwrap();
    assert_eq!(db.count_medications().unwrap(), 2);

    let hits = db.search_medications("warfarin", 5).unwrap();
    assert_eq!(hits[0].medication.id, "m-warf");
    assert_eq!(hits[0].medication.composition_ids(), vec!["c-warfarin".to_string()]);
}

#[test]
fn test_appointment_cache_after_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let db = open(&dir);
        let mut db = db.lock().unwrap();
        let mut done = Appointment::new("apt-2");
        done.status = AppointmentStatus::Completed;
        db.cache_appointments(&[Appointment::new("apt-1"), done], "2026-10-18T08:00:00Z")
            .unwrap();
    }

    let db = open(&dir);
    let db = db.lock().unwrap();
    assert_eq!(
        db.sync_marker(APPOINTMENTS_SYNC_KEY).unwrap().as_deref(),
        Some("2026-10-18T08:00:00Z")
    );
    let completed = db
        .list_cached_appointments(Some(AppointmentStatus::Completed))
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, "apt-2");
    assert_eq!(db.list_cached_appointments(None).unwrap().len(), 2);
}

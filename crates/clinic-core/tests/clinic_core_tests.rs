//! End-to-end flow through the host-facing `ClinicCore` object.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clinic_core::{
    ClientConfig, ClinicCore, ClinicCoreError, FfiAppointmentFilter, FfiClinicalNotes,
    FfiComposition, FfiMedication, FfiPrescriptionTarget, FfiSubmitOutcome, FfiVitals,
};
use clinic_net::mock::{ScriptedTransport, StaticTokenSource};
use clinic_net::{
    ConnectivityFlag, Method, PreparedRequest, RawResponse, Transport, TransportError,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Catalog documents in the server's wire format.
fn catalog() -> Vec<Value> {
    let medication = |id: &str, brand: &str, comp_id: &str, comp_name: &str| {
        json!({
            "_id": id,
            "brandName": brand,
            "genericName": comp_name,
            "unique_composition": [{"_id": comp_id, "name": comp_name}],
            "form": "Tablet"
        })
    };
    vec![
        medication("m-warf", "Warf 5", "c-warfarin", "Warfarin"),
        medication("m-ecosprin", "Ecosprin 75", "c-aspirin", "Aspirin"),
        medication("m-dolo", "Dolo 650", "c-paracetamol", "Paracetamol"),
    ]
}

fn search_catalog(path: &str) -> Value {
    let query = path
        .split("q=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap_or_default()
        .to_lowercase();
    let hits: Vec<Value> = catalog()
        .into_iter()
        .filter(|m| {
            ["brandName", "genericName"]
                .iter()
                .filter_map(|field| m[*field].as_str())
                .any(|name| name.to_lowercase().contains(&query))
        })
        .collect();
    let total = hits.len();
    json!({"medications": hits, "pagination": {"page": 1, "limit": 20, "total": total}})
}

/// Minimal clinic API holding one appointment and a small catalog.
fn clinic_api(appointment: Arc<Mutex<Value>>) -> ScriptedTransport {
    ScriptedTransport::new().with_handler(move |request: &PreparedRequest| {
        let mut apt = appointment
            .lock()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let path = request
            .url
            .trim_start_matches("http://clinic.test/api")
            .to_string();
        let body = request.body.clone().unwrap_or(Value::Null);

        let response = match (request.method, path.as_str()) {
            (Method::Get, "/appointments/apt-1") => apt.clone(),
            (Method::Get, p) if p.starts_with("/appointments?") => {
                json!({"appointments": [apt.clone()]})
            }
            (Method::Patch, "/appointments/apt-1/vitals") => {
                apt["vitals"] = body;
                if apt["status"] == "scheduled" {
                    apt["status"] = json!("in-progress");
                }
                apt.clone()
            }
            (Method::Patch, "/appointments/apt-1/clinical-notes") => {
                apt["clinicalNotes"] = body;
                apt.clone()
            }
            (Method::Post, "/appointments/apt-1/complete") => {
                if apt["status"] != "in-progress" {
                    return Ok(RawResponse::new(
                        400,
                        json!({"error": "Appointment is not in progress"}),
                    ));
                }
                apt["status"] = json!("completed");
                apt.clone()
            }
            (Method::Get, p) if p.starts_with("/medications/search?") => search_catalog(p),
            (Method::Get, p) if p.starts_with("/medications/") => {
                let id = p.trim_start_matches("/medications/");
                match catalog().into_iter().find(|m| m["_id"] == id) {
                    Some(medication) => medication,
                    None => {
                        return Ok(RawResponse::new(
                            404,
                            json!({"error": "Medication not found"}),
                        ))
                    }
                }
            }
            (Method::Post, "/compositions/check-ddi") => {
                let ids = body["compositionIds"].as_array().cloned().unwrap_or_default();
                let has = |id: &str| ids.iter().any(|v| v == id);
                if has("c-warfarin") && has("c-aspirin") {
                    json!({"warnings": [{
                        "compA": {"_id": "c-aspirin", "name": "Aspirin"},
                        "compB": {"_id": "c-warfarin", "name": "Warfarin"},
                        "severity": "major",
                        "description": "Increased risk of bleeding"
                    }]})
                } else {
                    json!({"warnings": []})
                }
            }
            (Method::Post, "/prescriptions") => {
                apt["status"] = json!("completed");
                apt["prescriptions"] = json!(["rx-1"]);
                return Ok(RawResponse::new(201, json!({"_id": "rx-1"})));
            }
            _ => return Ok(RawResponse::new(404, json!({"error": "Route not found"}))),
        };
        Ok(RawResponse::new(200, response))
    })
}

fn medication(id: &str, name: &str, composition: (&str, &str)) -> FfiMedication {
    FfiMedication {
        id: id.into(),
        name: name.into(),
        generic_name: None,
        aliases: Vec::new(),
        compositions: vec![FfiComposition {
            id: composition.0.into(),
            name: composition.1.into(),
        }],
        strength: None,
        form: Some("tablet".into()),
        active: true,
    }
}

fn open_core(transport: Arc<dyn Transport>, connectivity: Arc<ConnectivityFlag>) -> ClinicCore {
    let config = ClientConfig {
        base_url: "http://clinic.test/api".into(),
        ..ClientConfig::default()
    };
    ClinicCore::with_transport(
        config,
        transport,
        Arc::new(StaticTokenSource::new(Some("tok"))),
        connectivity,
    )
    .unwrap()
}

#[tokio::test]
async fn test_consultation_to_prescription() {
    let appointment = Arc::new(Mutex::new(json!({
        "_id": "apt-1",
        "status": "scheduled",
        "clinic": "clinic-1",
        "patient": {"_id": "patient-1", "name": "Asha Rao"}
    })));
    let transport = Arc::new(clinic_api(appointment.clone()));
    let core = open_core(transport.clone(), Arc::new(ConnectivityFlag::default()));

    // Vitals start the consultation; complete stays hidden until notes exist
    let apt = core
        .record_vitals(
            "apt-1".into(),
            FfiVitals {
                pulse: Some(78.0),
                weight: Some(64.0),
                height: Some(160.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(apt.status, "in-progress");
    assert_eq!(apt.patient_name.as_deref(), Some("Asha Rao"));
    assert!(apt.vitals.as_ref().and_then(|v| v.bmi).is_some());
    assert!(!apt.allowed_actions.contains(&"Complete".to_string()));

    let apt = core
        .save_clinical_notes(
            "apt-1".into(),
            FfiClinicalNotes {
                chief_complaint: Some("Palpitations".into()),
                diagnosis: Some("Atrial fibrillation".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(apt.allowed_actions.contains(&"Complete".to_string()));

    let hits = core.search_medications("warf".into(), 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].medication.id, "m-warf");
    assert_eq!(hits[0].medication.compositions[0].id, "c-warfarin");

    let session = core.start_prescription(Some("apt-1".into())).await.unwrap();
    core.add_medication(session.clone(), "m-warf".into()).await.unwrap();
    let assessment = core
        .add_medication(session.clone(), "m-ecosprin".into())
        .await
        .unwrap();
    assert!(assessment.evaluated);
    assert!(assessment.requires_override);
    assert!(assessment.blocking);
    assert_eq!(assessment.max_severity.as_deref(), Some("major"));
    assert_eq!(assessment.medications.len(), 2);

    let target = FfiPrescriptionTarget::Create {
        clinic_id: "clinic-1".into(),
        patient_id: "patient-1".into(),
        appointment_id: Some("apt-1".into()),
    };

    let outcome = core
        .submit_prescription(session.clone(), target.clone())
        .await
        .unwrap();
    assert!(matches!(outcome, FfiSubmitOutcome::OverrideRequired { ref warnings } if warnings.len() == 1));
    assert!(transport.requests_to("/prescriptions").is_empty());

    let assessment = core
        .grant_override(session.clone(), "dr-mehta".into())
        .await
        .unwrap();
    assert!(assessment.has_override);
    assert!(!assessment.blocking);

    let outcome = core.submit_prescription(session.clone(), target).await.unwrap();
    let FfiSubmitOutcome::Submitted {
        prescription_id,
        override_ddi,
        warning_count,
    } = outcome
    else {
        panic!("expected submission, got {:?}", outcome);
    };
    assert_eq!(prescription_id, "rx-1");
    assert!(override_ddi);
    assert_eq!(warning_count, 1);

    // The server completed the appointment; the local copy was re-read
    let completed = core.cached_appointments(Some("completed".into())).unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].prescription_ids, vec!["rx-1".to_string()]);

    // Submitted sessions are closed
    assert!(!core.discard_prescription(session));
}

#[tokio::test]
async fn test_offline_core_reports_network_unavailable() {
    let appointment = Arc::new(Mutex::new(json!({"_id": "apt-1", "status": "scheduled"})));
    let transport = Arc::new(clinic_api(appointment));
    let connectivity = Arc::new(ConnectivityFlag::new(false));
    let core = open_core(transport.clone(), connectivity.clone());

    let err = core
        .list_appointments(FfiAppointmentFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClinicCoreError::NetworkUnavailable(_)));
    assert_eq!(transport.attempts(), 0);

    connectivity.set_online(true);
    let listed = core
        .list_appointments(FfiAppointmentFilter {
            status: Some("scheduled".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    // The cached copy is now readable while offline
    connectivity.set_online(false);
    assert_eq!(core.cached_appointments(None).unwrap().len(), 1);
}

#[tokio::test]
async fn test_catalog_served_offline_from_earlier_lookups() {
    let appointment = Arc::new(Mutex::new(json!({"_id": "apt-1", "status": "scheduled"})));
    let transport = Arc::new(clinic_api(appointment));
    let connectivity = Arc::new(ConnectivityFlag::default());
    let core = open_core(transport.clone(), connectivity.clone());

    let hits = core.search_medications("dolo".into(), 10).await.unwrap();
    assert_eq!(hits.len(), 1);

    connectivity.set_online(false);
    let hits = core.search_medications("dolo".into(), 10).await.unwrap();
    assert_eq!(hits[0].medication.name, "Dolo 650");
    let med = core.get_medication("m-dolo".into()).await.unwrap().unwrap();
    assert_eq!(med.compositions[0].name, "Paracetamol");

    // Locally entered medications are searchable too
    core.upsert_medication(medication("m-local", "Dolokind", ("c-paracetamol", "Paracetamol")))
        .unwrap();
    let hits = core.search_medications("dolo".into(), 10).await.unwrap();
    assert_eq!(hits.len(), 2);

    connectivity.set_online(true);
    assert!(core.get_medication("m-retired".into()).await.unwrap().is_none());
    let err = core.add_medication("no-session".into(), "m-dolo".into()).await.unwrap_err();
    assert!(matches!(err, ClinicCoreError::NotFound(_)));
}

#[tokio::test]
async fn test_complete_uses_current_server_state() {
    let appointment = Arc::new(Mutex::new(json!({
        "_id": "apt-1",
        "status": "scheduled",
        "clinic": "clinic-1"
    })));
    let transport = Arc::new(clinic_api(appointment.clone()));
    let core = open_core(transport.clone(), Arc::new(ConnectivityFlag::default()));

    let apt = core.fetch_appointment("apt-1".into()).await.unwrap();
    assert_eq!(apt.status, "scheduled");

    // Another device starts and documents the consultation
    {
        let mut apt = appointment.lock().unwrap();
        apt["status"] = json!("in-progress");
        apt["clinicalNotes"] = json!({"chiefComplaint": "Cough", "diagnosis": "URTI"});
    }

    let apt = core.complete_appointment("apt-1".into()).await.unwrap();
    assert_eq!(apt.status, "completed");
    assert_eq!(transport.requests_to("/appointments/apt-1/complete").len(), 1);

    let cached = core.cached_appointments(Some("completed".into())).unwrap();
    assert_eq!(cached.len(), 1);
}

#[tokio::test]
async fn test_offline_mutation_checks_cached_copy() {
    let appointment = Arc::new(Mutex::new(json!({"_id": "apt-1", "status": "scheduled"})));
    let transport = Arc::new(clinic_api(appointment));
    let connectivity = Arc::new(ConnectivityFlag::default());
    let core = open_core(transport.clone(), connectivity.clone());

    core.fetch_appointment("apt-1".into()).await.unwrap();
    connectivity.set_online(false);

    // The cached copy is still scheduled, so complete is refused before any send
    let err = core.complete_appointment("apt-1".into()).await.unwrap_err();
    assert!(matches!(err, ClinicCoreError::InvalidInput(_)));

    // Nothing cached: the network error surfaces unchanged
    let err = core.complete_appointment("apt-9".into()).await.unwrap_err();
    assert!(matches!(err, ClinicCoreError::NetworkUnavailable(_)));
    assert_eq!(transport.attempts(), 1);
}

/// Holds the interaction check for any set containing warfarin until released.
struct HeldInteractionCheck {
    api: ScriptedTransport,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl Transport for HeldInteractionCheck {
    async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        let holds_warfarin = request.url.ends_with("/compositions/check-ddi")
            && request
                .body
                .as_ref()
                .and_then(|b| b["compositionIds"].as_array())
                .is_some_and(|ids| ids.iter().any(|id| id == "c-warfarin"));
        if holds_warfarin {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.api.execute(request).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_check_does_not_block_other_sessions() {
    let appointment = Arc::new(Mutex::new(json!({"_id": "apt-1", "status": "scheduled"})));
    let transport = Arc::new(HeldInteractionCheck {
        api: clinic_api(appointment),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let core = Arc::new(open_core(transport.clone(), Arc::new(ConnectivityFlag::default())));

    let slow = core.start_prescription(None).await.unwrap();
    let fast = core.start_prescription(None).await.unwrap();
    core.add_medication(slow.clone(), "m-ecosprin".into()).await.unwrap();
    core.add_medication(fast.clone(), "m-ecosprin".into()).await.unwrap();

    let pending = {
        let core = core.clone();
        let slow = slow.clone();
        tokio::spawn(async move { core.add_medication(slow, "m-warf".into()).await })
    };
    transport.entered.notified().await;

    // The other session is checked while the first one is still waiting
    let assessment = tokio::time::timeout(
        Duration::from_secs(5),
        core.add_medication(fast.clone(), "m-dolo".into()),
    )
    .await
    .expect("second session waited on the first")
    .unwrap();
    assert!(assessment.evaluated);
    assert!(assessment.warnings.is_empty());
    assert_eq!(assessment.medications.len(), 2);

    // Sessions can be discarded while another one is mid-check
    let spare = core.start_prescription(None).await.unwrap();
    assert!(core.discard_prescription(spare));

    transport.release.notify_one();
    let assessment = pending.await.unwrap().unwrap();
    assert!(assessment.blocking);
    assert_eq!(assessment.max_severity.as_deref(), Some("major"));
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let appointment = Arc::new(Mutex::new(json!({"_id": "apt-1", "status": "scheduled"})));
    let core = open_core(
        Arc::new(clinic_api(appointment)),
        Arc::new(ConnectivityFlag::default()),
    );

    let err = core.cached_appointments(Some("rescheduled".into())).unwrap_err();
    assert!(matches!(err, ClinicCoreError::InvalidInput(_)));

    let err = core
        .add_medication("no-such-session".into(), "m-warf".into())
        .await
        .unwrap_err();
    assert!(matches!(err, ClinicCoreError::NotFound(_)));

    // Complete before the consultation started is refused locally
    let err = core.complete_appointment("apt-1".into()).await.unwrap_err();
    assert!(matches!(err, ClinicCoreError::InvalidInput(_)));
}

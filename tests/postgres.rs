//! PostgreSQL-backed store tests.
//!
//! Skipped unless `BURSAR_TEST_DATABASE_URL` points at a database the tests
//! may migrate and write to. Rows use random names so runs do not collide.

use bursar::config::BursarConfig;
use bursar::ledger::Inflow;
use bursar::migration::{startup_migrations, Migrator};
use bursar::model::{Certificate, StudentInput, TransactionKind};
use bursar::store::{constraints, CertificateStore, PgStore, StudentStore};
use bursar::AppState;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

mod common;

fn pg_store() -> Option<PgStore> {
    let Ok(url) = std::env::var("BURSAR_TEST_DATABASE_URL") else {
        eprintln!("BURSAR_TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let store = PgStore::connect(&url).expect("connect to test database");
    startup_migrations(store.executor(), &Migrator::bundled(), Some(30)).expect("migrate");
    Some(store)
}

fn tag() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

#[test]
fn test_migrations_are_idempotent() {
    let Some(store) = pg_store() else { return };
    let migrator = Migrator::bundled();
    assert_eq!(
        startup_migrations(store.executor(), &migrator, Some(30)).unwrap(),
        0
    );
    assert!(migrator.status(store.executor()).unwrap().is_up_to_date());
}

#[test]
fn test_student_round_trip() {
    let Some(store) = pg_store() else { return };
    let state = AppState::with_store(Arc::new(store), &BursarConfig::default());
    let t = tag();
    let created = state
        .directory
        .create(StudentInput {
            last_name: Some(format!("NOM{t}")),
            first_name: Some("Reine".into()),
            sex: Some("F".into()),
            class_name: Some("CE1".into()),
            school_year: Some("2024-2025".into()),
            matricule: Some(format!("M{t}")),
            ..Default::default()
        })
        .unwrap();

    let fetched = state.directory.get(created.id).unwrap();
    assert_eq!(fetched.last_name, created.last_name);
    assert_eq!(fetched.matricule, created.matricule);
    assert_eq!(state.directory.search(&format!("nom{t}")).unwrap().len(), 1);

    state.directory.delete(created.id).unwrap();
    assert!(state.directory.get(created.id).is_err());
}

#[test]
fn test_duplicate_matricule_hits_constraint() {
    let Some(store) = pg_store() else { return };
    let now = Utc::now();
    let t = tag();
    let input = || StudentInput {
        last_name: Some(format!("NOM{t}")),
        first_name: Some("Marc".into()),
        sex: Some("M".into()),
        class_name: Some("CP".into()),
        school_year: Some("2024-2025".into()),
        matricule: Some(format!("M{t}")),
        ..Default::default()
    };
    let a = input().into_student(Uuid::new_v4(), now).unwrap();
    let b = input().into_student(Uuid::new_v4(), now).unwrap();
    store.insert_student(&a).unwrap();
    let err = store.insert_student(&b).unwrap_err();
    assert!(err.is_unique_violation_on(constraints::STUDENT_MATRICULE));
}

#[test]
fn test_inflow_receipts_unique_in_database() {
    let Some(store) = pg_store() else { return };
    let state = AppState::with_store(Arc::new(store), &BursarConfig::default());
    let t = tag();
    let student = state
        .directory
        .create(StudentInput {
            last_name: Some(format!("NOM{t}")),
            first_name: Some("Eve".into()),
            sex: Some("F".into()),
            class_name: Some("CM2".into()),
            school_year: Some("2024-2025".into()),
            ..Default::default()
        })
        .unwrap();
    let inflow = || Inflow {
        student_id: Some(student.id),
        amount: Some(Decimal::from(5_000)),
        receipt: Some(format!("R{t}")),
        motive: Some("Scolarité".into()),
        date: None,
    };

    let first = state.ledger.record_inflow(&common::cashier(), inflow()).unwrap();
    assert_eq!(first.kind, TransactionKind::Inflow);
    let err = state
        .ledger
        .record_inflow(&common::cashier(), inflow())
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(state.ledger.get(first.id).unwrap().amount, Decimal::from(5_000));
}

#[test]
fn test_certificate_code_constraint() {
    let Some(store) = pg_store() else { return };
    let code = format!("PG{}", tag());
    let certificate = Certificate {
        id: Uuid::new_v4(),
        code: code.clone(),
        student_id: None,
        student_name: "AGBO Reine".into(),
        class_name: "CE1".into(),
        matricule: None,
        first_enrollment_date: String::new(),
        delivery_date: "10/03/2025".into(),
        created_at: Utc::now(),
    };
    store.insert_certificate(&certificate).unwrap();
    assert!(store.certificate_code_taken(&code).unwrap());

    let twin = Certificate {
        id: Uuid::new_v4(),
        ..certificate
    };
    let err = store.insert_certificate(&twin).unwrap_err();
    assert!(err.is_unique_violation_on(constraints::CERTIFICATE_CODE));
}

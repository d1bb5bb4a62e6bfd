mod common;

use bursar::model::{Certificate, CertificateRequest};
use bursar::store::{constraints, CertificateStore};
use bursar::BursarError;
use common::{fixture, fixture_with, pay, student, StubRenderer};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

fn request(nom: &str, prenom: &str, classe: &str) -> CertificateRequest {
    CertificateRequest {
        last_name: Some(nom.into()),
        first_name: Some(prenom.into()),
        class_name: Some(classe.into()),
        ..Default::default()
    }
}

#[test]
fn test_issue_renders_pdf_and_stamps_delivery_date() {
    let f = fixture();
    let issued = f.state.certificates.issue(request("AGBO", "Reine", "CE1")).unwrap();
    assert!(issued.pdf.starts_with(b"%PDF"));
    assert_eq!(issued.certificate.code.len(), 10);
    assert_eq!(issued.certificate.student_name, "AGBO Reine");
    // 2025-03-10 09:00 UTC is the same day in UTC+1.
    assert_eq!(issued.certificate.delivery_date, "10/03/2025");
}

#[test]
fn test_issue_fills_in_from_student_record() {
    let f = fixture();
    let reine = student(&f.state, "AGBO", "Reine", "CE1");
    let issued = f
        .state
        .certificates
        .issue(CertificateRequest {
            student_id: Some(reine.id),
            enrollment_date: Some("2022-09-05".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(issued.certificate.class_name, "CE1");
    assert_eq!(issued.certificate.student_id, Some(reine.id));
    assert_eq!(issued.certificate.first_enrollment_date, "05/09/2022");
}

#[test]
fn test_missing_identity_is_rejected() {
    let f = fixture();
    let err = f
        .state
        .certificates
        .issue(request("AGBO", "", "CE1"))
        .unwrap_err();
    assert!(matches!(err, BursarError::Validation { .. }));
    assert!(f.state.certificates.history().unwrap().is_empty());
}

#[test]
fn test_sequential_codes_are_unique() {
    let f = fixture_with(Arc::new(StubRenderer { fail: false }));
    let codes: HashSet<String> = (0..500)
        .map(|i| {
            f.state
                .certificates
                .issue(request("ELEVE", &format!("N{i}"), "CP"))
                .unwrap()
                .certificate
                .code
        })
        .collect();
    assert_eq!(codes.len(), 500);
}

#[test]
fn test_concurrent_issuance_yields_distinct_codes() {
    let f = fixture_with(Arc::new(StubRenderer { fail: false }));
    let workers = 8;
    let per_worker = 1_250;

    let handles: Vec<_> = (0..workers)
        .map(|w| {
            let registry = f.state.certificates.clone();
            thread::spawn(move || {
                (0..per_worker)
                    .map(|i| {
                        registry
                            .issue(request("ELEVE", &format!("W{w}N{i}"), "CM1"))
                            .unwrap()
                            .certificate
                            .code
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut codes = HashSet::new();
    for handle in handles {
        for code in handle.join().unwrap() {
            assert!(codes.insert(code), "duplicate certificate code");
        }
    }
    assert_eq!(codes.len(), 10_000);
}

#[test]
fn test_colliding_insert_loses_to_unique_constraint() {
    let f = fixture();
    let certificate = Certificate {
        id: Uuid::new_v4(),
        code: "SAMECODE00".into(),
        student_id: None,
        student_name: "AGBO Reine".into(),
        class_name: "CE1".into(),
        matricule: None,
        first_enrollment_date: String::new(),
        delivery_date: "10/03/2025".into(),
        created_at: common::start_time(),
    };
    let twin = Certificate {
        id: Uuid::new_v4(),
        ..certificate.clone()
    };

    let store = f.store.clone();
    let results: Vec<_> = [certificate, twin]
        .into_iter()
        .map(|c| {
            let store = store.clone();
            thread::spawn(move || store.insert_certificate(&c))
        })
        .map(|h| h.join().unwrap())
        .collect();

    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].is_unique_violation_on(constraints::CERTIFICATE_CODE));
    let err: BursarError = results.into_iter().find_map(Result::err).unwrap().into();
    assert!(err.is_conflict());
}

#[test]
fn test_render_failure_keeps_the_record() {
    let f = fixture_with(Arc::new(StubRenderer { fail: true }));
    let err = f
        .state
        .certificates
        .issue(request("AGBO", "Reine", "CE1"))
        .unwrap_err();
    assert!(matches!(err, BursarError::Internal(_)));

    let history = f.state.certificates.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].student_name, "AGBO Reine");
}

#[test]
fn test_history_is_newest_first_and_capped() {
    let f = fixture_with(Arc::new(StubRenderer { fail: false }));
    for i in 0..55 {
        f.clock.advance(chrono::Duration::minutes(1));
        f.state
            .certificates
            .issue(request("ELEVE", &format!("N{i:02}"), "CP"))
            .unwrap();
    }
    let history = f.state.certificates.history().unwrap();
    assert_eq!(history.len(), 50);
    assert_eq!(history[0].student_name, "ELEVE N54");
    assert!(history.windows(2).all(|w| w[0].created_at >= w[1].created_at));
}

#[test]
fn test_deleting_a_student_keeps_transactions_and_certificates() {
    let f = fixture();
    let reine = student(&f.state, "AGBO", "Reine", "CE1");
    let payment = pay(&f.state, &reine, 10_000, "R-100", "Scolarité");
    f.state
        .certificates
        .issue(CertificateRequest {
            student_id: Some(reine.id),
            ..Default::default()
        })
        .unwrap();

    f.state.directory.delete(reine.id).unwrap();

    let kept = f.state.ledger.get(payment.id).unwrap();
    assert_eq!(kept.student_id, Some(reine.id));
    assert_eq!(kept.student_name.as_deref(), Some("AGBO Reine"));
    let history = f.state.certificates.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].student_id, Some(reine.id));
}

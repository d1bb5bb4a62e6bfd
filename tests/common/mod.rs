//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use bursar::auth::Principal;
use bursar::certificates::CertificateDocument;
use bursar::clock::FixedClock;
use bursar::config::BursarConfig;
use bursar::directory::ClassRoster;
use bursar::ledger::{DailyReport, Inflow};
use bursar::model::{FeeInput, Role, Student, StudentInput, Transaction};
use bursar::reconciliation::Statement;
use bursar::report::{DocumentRenderer, PdfRenderer, RenderError, RenderResult};
use bursar::store::MemoryStore;
use bursar::AppState;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub const YEAR: &str = "2024-2025";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

pub struct Fixture {
    pub state: AppState,
    pub clock: Arc<FixedClock>,
    pub store: Arc<MemoryStore>,
}

pub fn fixture() -> Fixture {
    let config = BursarConfig::default();
    fixture_with(Arc::new(PdfRenderer::new(config.school.clone())))
}

pub fn fixture_with(renderer: Arc<dyn DocumentRenderer>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(start_time()));
    let state = AppState::new(
        store.clone(),
        clock.clone(),
        renderer,
        &BursarConfig::default(),
    );
    Fixture {
        state,
        clock,
        store,
    }
}

pub fn cashier() -> Principal {
    Principal {
        user_id: Uuid::new_v4(),
        username: "caisse1".into(),
        display_name: Some("Awa KPADONOU".into()),
        role: Role::Cashier,
    }
}

pub fn admin() -> Principal {
    Principal {
        user_id: Uuid::new_v4(),
        username: "admin".into(),
        display_name: None,
        role: Role::Admin,
    }
}

pub fn student(state: &AppState, nom: &str, prenom: &str, classe: &str) -> Student {
    state
        .directory
        .create(StudentInput {
            last_name: Some(nom.into()),
            first_name: Some(prenom.into()),
            sex: Some("F".into()),
            class_name: Some(classe.into()),
            school_year: Some(YEAR.into()),
            ..Default::default()
        })
        .unwrap()
}

pub fn fee(state: &AppState, classe: &str, amount: i64) {
    state
        .fees
        .create(FeeInput {
            class_name: Some(classe.into()),
            amount: Some(Decimal::from(amount)),
            school_year: Some(YEAR.into()),
        })
        .unwrap();
}

pub fn pay(state: &AppState, s: &Student, amount: i64, receipt: &str, motive: &str) -> Transaction {
    state
        .ledger
        .record_inflow(
            &cashier(),
            Inflow {
                student_id: Some(s.id),
                amount: Some(Decimal::from(amount)),
                receipt: Some(receipt.into()),
                motive: Some(motive.into()),
                date: None,
            },
        )
        .unwrap()
}

/// Renderer that skips layout, or fails every document.
pub struct StubRenderer {
    pub fail: bool,
}

impl StubRenderer {
    fn output(&self) -> RenderResult {
        if self.fail {
            Err(RenderError::Backend("printer on fire".into()))
        } else {
            Ok(b"%PDF-stub".to_vec())
        }
    }
}

impl DocumentRenderer for StubRenderer {
    fn certificate(&self, _: &CertificateDocument) -> RenderResult {
        self.output()
    }
    fn daily_report(&self, _: &DailyReport) -> RenderResult {
        self.output()
    }
    fn statement(&self, _: &Statement) -> RenderResult {
        self.output()
    }
    fn class_roster(&self, _: &ClassRoster) -> RenderResult {
        self.output()
    }
}

//! One function per endpoint. Each takes the shared state and the parsed
//! request and returns a response or a [`BursarError`] for the router to map.

use super::{ApiRequest, ApiResponse};
use crate::auth::{Credentials, Principal, RegisterInput};
use crate::error::{BursarError, BursarResult};
use crate::model::{
    AgentInput, CertificateRequest, FeeInput, Role, StudentInput, TransactionFilter,
    TransactionInput, TransactionKind, TransactionPatch,
};
use crate::state::AppState;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const DAILY_REPORT_FILE: &str = "rapport-journalier.pdf";
const STATEMENT_FILE: &str = "releve-scolarite.pdf";
const ROSTER_FILE: &str = "liste-eleves.pdf";

/// JSON body; an empty body deserializes to the default value.
fn body<T: DeserializeOwned + Default>(req: &ApiRequest) -> BursarResult<T> {
    if req.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&req.body).map_err(|e| {
        log::debug!("rejected request body: {e}");
        BursarError::validation("body", "Corps de requête JSON invalide.")
    })
}

pub(super) fn parse_id(raw: &str) -> BursarResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| BursarError::validation("id", "Identifiant invalide."))
}

/// `YYYY-MM-DD` or `DD/MM/YYYY`.
fn parse_day(raw: &str) -> BursarResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .map_err(|_| BursarError::validation("date", "Date invalide."))
}

pub fn health(state: &AppState) -> ApiResponse {
    ApiResponse::ok(&json!({ "status": "ok", "backend": state.store.backend_name() }))
}

#[cfg(feature = "metrics")]
pub fn metrics() -> ApiResponse {
    ApiResponse {
        status: 200,
        content_type: super::ContentType::Text,
        disposition: None,
        body: crate::metrics::METRICS.render(),
    }
}

// --- users -----------------------------------------------------------------

pub fn login(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let credentials: Credentials = body(req)?;
    let outcome = state.auth.login(&credentials)?;
    Ok(ApiResponse::ok(&json!({
        "message": "Connexion réussie",
        "token": outcome.token,
        "user": outcome.user,
        "expiresAt": outcome.expires_at,
    })))
}

pub fn verify_token(principal: &Principal) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&json!({
        "success": true,
        "message": "Token valide",
        "user": principal,
    })))
}

pub fn register(state: &AppState, req: &ApiRequest, actor: &Principal) -> BursarResult<ApiResponse> {
    let input: RegisterInput = body(req)?;
    let user = state.auth.register(actor, input)?;
    Ok(ApiResponse::created(&json!({
        "message": "Utilisateur créé avec succès",
        "user": { "id": user.id, "username": user.username, "role": user.role },
    })))
}

// --- fees ------------------------------------------------------------------

pub fn create_fee(state: &AppState, req: &ApiRequest, actor: &Principal) -> BursarResult<ApiResponse> {
    actor.require(&[Role::Admin])?;
    let input: FeeInput = body(req)?;
    Ok(ApiResponse::created(&state.fees.create(input)?))
}

pub fn list_fees(state: &AppState) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.fees.list()?))
}

// --- students --------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportBody {
    Rows(Vec<StudentInput>),
    Wrapped { eleves: Vec<StudentInput> },
}

impl Default for ImportBody {
    fn default() -> Self {
        ImportBody::Rows(Vec::new())
    }
}

/// JSON (`[...]` or `{"eleves": [...]}`) or CSV with a header row.
fn import_rows(req: &ApiRequest) -> BursarResult<Vec<StudentInput>> {
    let is_csv = req
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("text/csv"));
    if !is_csv {
        return Ok(match body::<ImportBody>(req)? {
            ImportBody::Rows(rows) | ImportBody::Wrapped { eleves: rows } => rows,
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(req.body.as_slice());
    reader
        .deserialize::<StudentInput>()
        .enumerate()
        .map(|(row, record)| {
            record.map_err(|e| {
                BursarError::validation("eleves", format!("Ligne {}: CSV invalide ({e})", row + 1))
            })
        })
        .collect()
}

pub fn import_students(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let count = state.directory.import(import_rows(req)?)?;
    Ok(ApiResponse::created(&json!({
        "message": "Importation réussie",
        "count": count,
    })))
}

pub fn student_by_matricule(state: &AppState, matricule: &str) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.directory.find_by_matricule(matricule)?))
}

pub fn create_student(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let input: StudentInput = body(req)?;
    Ok(ApiResponse::created(&state.directory.create(input)?))
}

pub fn list_class(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let class_name = req
        .param("classe")
        .ok_or_else(|| BursarError::validation("classe", "Classe requise."))?;
    Ok(ApiResponse::ok(&state.directory.list_class(class_name)?))
}

pub fn search_students(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let query = req.param("q").unwrap_or_default();
    Ok(ApiResponse::ok(&state.directory.search(query)?))
}

pub fn classes(state: &AppState) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.directory.classes()?))
}

pub fn get_student(state: &AppState, id: Uuid) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.directory.get(id)?))
}

pub fn update_student(state: &AppState, req: &ApiRequest, id: Uuid) -> BursarResult<ApiResponse> {
    let patch: StudentInput = body(req)?;
    Ok(ApiResponse::ok(&state.directory.update(id, patch)?))
}

pub fn delete_student(state: &AppState, id: Uuid) -> BursarResult<ApiResponse> {
    state.directory.delete(id)?;
    Ok(ApiResponse::ok(&json!({ "message": "Élève supprimé" })))
}

pub fn statement(state: &AppState, id: Uuid) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.reconciler.statement(id)?))
}

// --- ledger ----------------------------------------------------------------

pub fn record_transaction(
    state: &AppState,
    req: &ApiRequest,
    by: &Principal,
) -> BursarResult<ApiResponse> {
    let input: TransactionInput = body(req)?;
    Ok(ApiResponse::created(&state.ledger.record(by, input)?))
}

/// Date bound from a query value: a calendar day (local) or an RFC 3339
/// instant. `end` selects the exclusive end of a day instead of its start.
fn bound(state: &AppState, raw: &str, end: bool) -> BursarResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let (start, stop) = state.ledger.local_day().bounds(parse_day(raw)?);
    Ok(if end { stop } else { start })
}

pub fn list_transactions(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let kind = req
        .param("kind")
        .or_else(|| req.param("type"))
        .map(|k| {
            TransactionKind::parse(k)
                .ok_or_else(|| BursarError::validation("type", "Type invalide (entree | sortie)"))
        })
        .transpose()?;
    let filter = TransactionFilter {
        kind,
        student_id: req.param("eleve").map(parse_id).transpose()?,
        from: req.param("from").map(|d| bound(state, d, false)).transpose()?,
        until: req.param("to").map(|d| bound(state, d, true)).transpose()?,
    };
    Ok(ApiResponse::ok(&state.ledger.list(&filter)?))
}

pub fn get_transaction(state: &AppState, id: Uuid) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.ledger.get(id)?))
}

pub fn update_transaction(
    state: &AppState,
    req: &ApiRequest,
    id: Uuid,
) -> BursarResult<ApiResponse> {
    let patch: TransactionPatch = body(req)?;
    let updated = state.ledger.update(id, patch)?;
    Ok(ApiResponse::ok(&json!({
        "message": "Transaction mise à jour",
        "data": updated,
    })))
}

pub fn delete_transaction(state: &AppState, id: Uuid) -> BursarResult<ApiResponse> {
    state.ledger.delete(id)?;
    Ok(ApiResponse::ok(&json!({ "message": "Transaction supprimée" })))
}

// --- certificates ----------------------------------------------------------

pub fn issue_certificate(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let request: CertificateRequest = body(req)?;
    let issued = state.certificates.issue(request)?;
    let filename = format!("certificat_{}.pdf", issued.certificate.code);
    Ok(ApiResponse::pdf(issued.pdf, &filename))
}

pub fn certificate_history(state: &AppState) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&json!({ "certificats": state.certificates.history()? })))
}

pub fn search_in_class(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let found = state.directory.search_in_class(
        req.param("classe"),
        req.param("annee"),
        req.param("search"),
    )?;
    Ok(ApiResponse::ok(&found))
}

// --- dashboard -------------------------------------------------------------

pub fn progress(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.reconciler.progress(req.param("annee"))?))
}

pub fn stats(state: &AppState, viewer: &Principal) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.ledger.stats(viewer)?))
}

pub fn cash_stats(state: &AppState) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.ledger.cash_stats()?))
}

pub fn headcount(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let effectifs = state.directory.headcount(req.param("annee"))?;
    Ok(ApiResponse::ok(&json!({ "effectifs": effectifs })))
}

// --- printed reports -------------------------------------------------------

pub fn daily_report_pdf(state: &AppState, req: &ApiRequest) -> BursarResult<ApiResponse> {
    let day = match req.param("date") {
        Some(raw) => parse_day(raw)?,
        None => state.ledger.today(),
    };
    let report = state.ledger.daily_report(day)?;
    let pdf = state.renderer.daily_report(&report)?;
    Ok(ApiResponse::pdf(pdf, DAILY_REPORT_FILE))
}

pub fn statement_pdf(state: &AppState, id: Uuid) -> BursarResult<ApiResponse> {
    let statement = state.reconciler.statement(id)?;
    let pdf = state.renderer.statement(&statement)?;
    Ok(ApiResponse::pdf(pdf, STATEMENT_FILE))
}

pub fn roster_pdf(state: &AppState, class_name: &str) -> BursarResult<ApiResponse> {
    let roster = state.directory.roster(class_name, state.ledger.today())?;
    let pdf = state.renderer.class_roster(&roster)?;
    Ok(ApiResponse::pdf(pdf, ROSTER_FILE))
}

// --- agents ----------------------------------------------------------------

pub fn create_agent(state: &AppState, req: &ApiRequest, owner: &Principal) -> BursarResult<ApiResponse> {
    let input: AgentInput = body(req)?;
    Ok(ApiResponse::created(&state.auth.create_agent(owner, input)?))
}

pub fn list_agents(state: &AppState, owner: &Principal) -> BursarResult<ApiResponse> {
    Ok(ApiResponse::ok(&state.auth.agents(owner)?))
}

pub fn deactivate_agent(state: &AppState, actor: &Principal, id: Uuid) -> BursarResult<ApiResponse> {
    state.auth.deactivate_agent(actor, id)?;
    Ok(ApiResponse::ok(&json!({ "message": "Agent désactivé" })))
}

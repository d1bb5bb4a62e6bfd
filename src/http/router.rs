use super::handlers::{self, parse_id};
use super::{decode_segment, ApiRequest, ApiResponse, Method};
use crate::auth::Principal;
use crate::error::{BursarError, BursarResult};
use crate::state::AppState;

const ROUTE_NOT_FOUND: &str = "Route introuvable";

/// Dispatch one request. Every `/api` route except login requires a bearer
/// token; errors become `{"error": "..."}` bodies.
pub fn route(state: &AppState, req: &ApiRequest) -> ApiResponse {
    let segments: Vec<String> = req
        .path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect();
    let path: Vec<&str> = segments.iter().map(String::as_str).collect();

    match dispatch(state, req, &path) {
        Ok(response) => response,
        Err(err) => {
            if !matches!(err, BursarError::Internal(_)) {
                log::debug!("{:?} {} -> {err}", req.method, req.path);
            }
            ApiResponse::error(&err)
        }
    }
}

fn dispatch(state: &AppState, req: &ApiRequest, path: &[&str]) -> BursarResult<ApiResponse> {
    match (req.method, path) {
        (Method::Get, ["health"]) => Ok(handlers::health(state)),
        #[cfg(feature = "metrics")]
        (Method::Get, ["metrics"]) => Ok(handlers::metrics()),
        (Method::Post, ["api", "users", "login"]) => handlers::login(state, req),
        (_, ["api", rest @ ..]) => {
            let principal = state.auth.authenticate(req.authorization.as_deref())?;
            api(state, req, &principal, rest)
        }
        _ => Err(BursarError::NotFound(ROUTE_NOT_FOUND.into())),
    }
}

fn api(
    state: &AppState,
    req: &ApiRequest,
    principal: &Principal,
    path: &[&str],
) -> BursarResult<ApiResponse> {
    use Method::{Delete, Get, Post, Put};

    match (req.method, path) {
        (Get, ["users", "verify-token"]) => handlers::verify_token(principal),

        (Post, ["admin", "users", "register"]) => handlers::register(state, req, principal),
        (Post, ["admin", "frais"]) => handlers::create_fee(state, req, principal),
        (Get, ["admin", "frais"]) => handlers::list_fees(state),
        (Post, ["admin", "eleves", "import"]) => handlers::import_students(state, req),
        (Get, ["admin", "eleves", "matricule", m]) => handlers::student_by_matricule(state, m),

        (Post, ["eleves"]) => handlers::create_student(state, req),
        (Get, ["eleves"]) => handlers::list_class(state, req),
        (Get, ["eleves", "search"]) => handlers::search_students(state, req),
        (Get, ["eleves", "classes"]) => handlers::classes(state),
        (Get, ["eleves", id]) => handlers::get_student(state, parse_id(id)?),
        (Put, ["eleves", id]) => handlers::update_student(state, req, parse_id(id)?),
        (Delete, ["eleves", id]) => handlers::delete_student(state, parse_id(id)?),
        (Get, ["eleves", id, "releve"]) => handlers::statement(state, parse_id(id)?),

        (Post, ["caisse"]) => handlers::record_transaction(state, req, principal),
        (Get, ["caisse"]) => handlers::list_transactions(state, req),
        (Get, ["caisse", id]) => handlers::get_transaction(state, parse_id(id)?),
        (Put, ["caisse", id]) => handlers::update_transaction(state, req, parse_id(id)?),
        (Delete, ["caisse", id]) => handlers::delete_transaction(state, parse_id(id)?),

        (Post, ["certificat"]) => handlers::issue_certificate(state, req),
        (Get, ["certificat", "history"]) => handlers::certificate_history(state),
        (Get, ["certificat", "eleves"]) => handlers::search_in_class(state, req),

        (Get, ["dashboard", "progress"]) => handlers::progress(state, req),
        (Get, ["dashboard", "stats"]) => handlers::stats(state, principal),
        (Get, ["dashboard", "stats-caisse"]) => handlers::cash_stats(state),
        (Get, ["dashboard", "effectifs"]) => handlers::headcount(state, req),

        (Get, ["rapport", "journalier"]) => handlers::daily_report_pdf(state, req),
        (Get, ["rapport", "releve", id]) => handlers::statement_pdf(state, parse_id(id)?),
        (Get, ["rapport", "eleves", class_name]) => handlers::roster_pdf(state, class_name),

        (Post, ["agents"]) => handlers::create_agent(state, req, principal),
        (Get, ["agents"]) => handlers::list_agents(state, principal),
        (Delete, ["agents", id]) => handlers::deactivate_agent(state, principal, parse_id(id)?),

        _ => Err(BursarError::NotFound(ROUTE_NOT_FOUND.into())),
    }
}

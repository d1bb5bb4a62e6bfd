//! Classification of database errors.

use crate::executor::DbError;

const UNIQUE_VIOLATION_MARKERS: [&str; 2] =
    ["duplicate key value violates unique constraint", "23505"];

/// Name of the violated unique constraint, if `error` is a unique violation.
///
/// The server message reads
/// `duplicate key value violates unique constraint "name"`; the quoted name is
/// extracted. A violation whose name cannot be read yields `"unknown"`.
pub(crate) fn unique_violation_constraint(error: &DbError) -> Option<String> {
    let message = match error {
        DbError::Postgres(pg) => pg.to_string(),
        DbError::Query(msg) | DbError::Other(msg) => msg.clone(),
        DbError::Parse(_) => return None,
    };
    classify_message(&message)
}

fn classify_message(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    if !UNIQUE_VIOLATION_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }
    let name = lower
        .find("unique constraint \"")
        .map(|start| &lower[start + "unique constraint \"".len()..])
        .and_then(|rest| rest.split('"').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("unknown");
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_constraint_name() {
        let err = DbError::Other(
            "db error: ERROR: duplicate key value violates unique constraint \"transactions_inflow_receipt_key\""
                .into(),
        );
        assert_eq!(
            unique_violation_constraint(&err).as_deref(),
            Some("transactions_inflow_receipt_key")
        );
    }

    #[test]
    fn test_sqlstate_only_message() {
        let err = DbError::Query("SQLSTATE 23505".into());
        assert_eq!(unique_violation_constraint(&err).as_deref(), Some("unknown"));
    }

    #[test]
    fn test_other_errors_are_not_violations() {
        assert!(unique_violation_constraint(&DbError::Other("relation \"x\" does not exist".into())).is_none());
        assert!(unique_violation_constraint(&DbError::Parse("duplicate key".into())).is_none());
    }
}

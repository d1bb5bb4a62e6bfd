//! Service-level error taxonomy.
//!
//! Every component returns [`BursarError`]. The HTTP layer maps each variant
//! to a status code; internal details never reach the client.

use crate::report::RenderError;
use crate::store::StoreError;
use std::fmt;

#[derive(Debug)]
pub enum BursarError {
    /// A required field is missing or malformed
    Validation { field: &'static str, message: String },
    /// The referenced entity does not exist
    NotFound(String),
    /// A uniqueness rule was violated
    Conflict(String),
    /// Missing or invalid credentials
    Unauthorized(String),
    /// Authenticated, but the role does not allow the operation
    Forbidden(String),
    /// Anything unexpected, including renderer and database failures
    Internal(String),
}

pub type BursarResult<T> = Result<T, BursarError>;

impl BursarError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BursarError::Validation {
            field,
            message: message.into(),
        }
    }

    /// HTTP status code and reason phrase for this error.
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            BursarError::Validation { .. } => (400, "Bad Request"),
            BursarError::Unauthorized(_) => (401, "Unauthorized"),
            BursarError::Forbidden(_) => (403, "Forbidden"),
            BursarError::NotFound(_) => (404, "Not Found"),
            BursarError::Conflict(_) => (409, "Conflict"),
            BursarError::Internal(_) => (500, "Internal Server Error"),
        }
    }

    /// Message safe to send to a client.
    pub fn public_message(&self) -> String {
        match self {
            BursarError::Validation { message, .. } => message.clone(),
            BursarError::NotFound(s)
            | BursarError::Conflict(s)
            | BursarError::Unauthorized(s)
            | BursarError::Forbidden(s) => s.clone(),
            BursarError::Internal(_) => "Erreur serveur".to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BursarError::Conflict(_))
    }
}

impl fmt::Display for BursarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BursarError::Validation { field, message } => {
                write!(f, "Validation error on '{field}': {message}")
            }
            BursarError::NotFound(s) => write!(f, "Not found: {s}"),
            BursarError::Conflict(s) => write!(f, "Conflict: {s}"),
            BursarError::Unauthorized(s) => write!(f, "Unauthorized: {s}"),
            BursarError::Forbidden(s) => write!(f, "Forbidden: {s}"),
            BursarError::Internal(s) => write!(f, "Internal error: {s}"),
        }
    }
}

impl std::error::Error for BursarError {}

impl From<StoreError> for BursarError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { constraint } => {
                BursarError::Conflict(format!("duplicate value for {constraint}"))
            }
            StoreError::NotFound(what) => BursarError::NotFound(what),
            other => BursarError::Internal(other.to_string()),
        }
    }
}

impl From<RenderError> for BursarError {
    fn from(err: RenderError) -> Self {
        BursarError::Internal(format!("document rendering failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BursarError::validation("montant", "x").status().0, 400);
        assert_eq!(BursarError::NotFound("x".into()).status().0, 404);
        assert_eq!(BursarError::Conflict("x".into()).status().0, 409);
        assert_eq!(BursarError::Unauthorized("x".into()).status().0, 401);
        assert_eq!(BursarError::Forbidden("x".into()).status().0, 403);
        assert_eq!(BursarError::Internal("x".into()).status().0, 500);
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = BursarError::Internal("connection reset by peer at 10.0.0.3".into());
        assert_eq!(err.public_message(), "Erreur serveur");
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let err: BursarError = StoreError::UniqueViolation {
            constraint: "transactions_recu_entree_key".into(),
        }
        .into();
        assert!(err.is_conflict());
    }
}

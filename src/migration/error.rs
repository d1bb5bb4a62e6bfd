//! Migration-specific error types

use crate::executor::DbError;

#[derive(Debug)]
pub enum MigrationError {
    /// Database execution error
    Database(DbError),
    /// Checksum mismatch
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },
    /// Migration lock timeout
    LockTimeout(String),
    /// Migration failed during execution
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
    /// Applied migration unknown to this binary
    Unknown { version: i64, name: String },
    /// Stored row could not be decoded
    InvalidRecord(String),
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {e}"),
            MigrationError::ChecksumMismatch {
                version,
                name,
                stored,
                current,
            } => write!(
                f,
                "Migration '{name}' (version {version}) has been modified after being applied.\n\
                 Stored checksum: {stored}\n\
                 Current checksum: {current}"
            ),
            MigrationError::LockTimeout(msg) => write!(
                f,
                "Migration lock timeout: {msg}\n\
                 Another process may be running migrations."
            ),
            MigrationError::ExecutionFailed {
                version,
                name,
                error,
            } => write!(
                f,
                "Migration '{name}' (version {version}) failed during execution: {error}"
            ),
            MigrationError::Unknown { version, name } => write!(
                f,
                "Applied migration '{name}' (version {version}) is not known to this build"
            ),
            MigrationError::InvalidRecord(msg) => write!(f, "Invalid migration record: {msg}"),
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<DbError> for MigrationError {
    fn from(error: DbError) -> Self {
        MigrationError::Database(error)
    }
}

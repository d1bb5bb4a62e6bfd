//! Checksums of migration bodies

use crate::migration::MigrationError;
use sha2::{Digest, Sha256};

/// SHA-256 of the migration statements, hex encoded.
///
/// Statements are joined with `;\n` so that moving text across a statement
/// boundary changes the checksum.
pub fn calculate_checksum(statements: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, statement) in statements.iter().enumerate() {
        if i > 0 {
            hasher.update(b";\n");
        }
        hasher.update(statement.trim().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Compare a stored checksum with the one computed from the compiled migration.
pub fn validate_checksum(
    version: i64,
    name: &str,
    stored: &str,
    current: &str,
) -> Result<(), MigrationError> {
    if stored == current {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            version,
            name: name.to_string(),
            stored: stored.to_string(),
            current: current.to_string(),
        })
    }
}

//! Migration state table management

use crate::executor::{DbError, SqlExecutor};

pub const STATE_TABLE: &str = "bursar_migrations";

/// Create the `bursar_migrations` table and its index if they don't exist.
///
/// Version `-1` is reserved for the lock row (see [`super::lock`]).
pub fn initialize_state_table(executor: &dyn SqlExecutor) -> Result<(), DbError> {
    executor.execute(
        r#"
        CREATE TABLE IF NOT EXISTS bursar_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            execution_time_ms BIGINT,
            success BOOLEAN NOT NULL DEFAULT true
        )
        "#,
        &[],
    )?;

    executor.execute(
        "CREATE INDEX IF NOT EXISTS idx_bursar_migrations_applied_at \
         ON bursar_migrations(applied_at)",
        &[],
    )?;

    Ok(())
}

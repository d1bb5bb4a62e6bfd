//! In-process migration on service startup

use crate::executor::SqlExecutor;
use crate::migration::{MigrationError, MigrationLockGuard, Migrator};

/// Bring the schema up to date before serving requests.
///
/// The first instance to start takes the lock and applies pending migrations;
/// the others wait (up to `timeout_seconds`, default 60) and then find nothing
/// to do. Any failure should abort startup.
pub fn startup_migrations(
    executor: &dyn SqlExecutor,
    migrator: &Migrator,
    timeout_seconds: Option<u64>,
) -> Result<usize, MigrationError> {
    let lock = MigrationLockGuard::acquire(executor, timeout_seconds)?;
    migrator.validate_checksums(lock.executor())?;

    let applied = migrator.up_with_lock(&lock, None)?;
    if applied > 0 {
        log::info!("Applied {applied} migration(s) on startup");
    } else {
        log::debug!("No pending migrations to apply");
    }
    Ok(applied)
}

//! Migrator - applies and rolls back compiled migrations

use crate::executor::SqlExecutor;
use crate::migration::schema::MIGRATIONS;
use crate::migration::{
    initialize_state_table, validate_checksum, Migration, MigrationError, MigrationLockGuard,
    MigrationRecord, MigrationStatus, PendingMigration,
};
use chrono::Utc;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    /// Migrations sorted by version.
    pub fn new(mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { migrations }
    }

    /// The schema shipped with this crate.
    pub fn bundled() -> Self {
        Self::new(MIGRATIONS.to_vec())
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Compare the state table with the compiled migrations.
    ///
    /// Fails on a checksum mismatch or on an applied version this build does
    /// not know.
    pub fn status(&self, executor: &dyn SqlExecutor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor)?;
        let applied = Self::query_applied_migrations(executor)?;
        self.compare(applied)
    }

    fn compare(&self, applied: Vec<MigrationRecord>) -> Result<MigrationStatus, MigrationError> {
        for record in &applied {
            match self.migrations.iter().find(|m| m.version == record.version) {
                Some(migration) => validate_checksum(
                    record.version,
                    &record.name,
                    &record.checksum,
                    &migration.checksum(),
                )?,
                None => {
                    return Err(MigrationError::Unknown {
                        version: record.version,
                        name: record.name.clone(),
                    })
                }
            }
        }

        let pending = self
            .migrations
            .iter()
            .filter(|m| !applied.iter().any(|r| r.version == m.version))
            .map(|m| PendingMigration {
                version: m.version,
                name: m.name.to_string(),
                checksum: m.checksum(),
            })
            .collect();

        Ok(MigrationStatus::new(applied, pending))
    }

    /// Verify the checksums of all applied migrations.
    pub fn validate_checksums(&self, executor: &dyn SqlExecutor) -> Result<(), MigrationError> {
        self.status(executor).map(|_| ())
    }

    /// Apply pending migrations under the migration lock.
    pub fn up(
        &self,
        executor: &dyn SqlExecutor,
        steps: Option<usize>,
    ) -> Result<usize, MigrationError> {
        let lock = MigrationLockGuard::acquire(executor, None)?;
        self.up_with_lock(&lock, steps)
    }

    /// Apply pending migrations while `lock` is held.
    pub fn up_with_lock(
        &self,
        lock: &MigrationLockGuard<'_>,
        steps: Option<usize>,
    ) -> Result<usize, MigrationError> {
        let executor = lock.executor();
        let status = self.status(executor)?;
        let take = steps.unwrap_or(status.pending.len());
        let mut applied_count = 0;

        for pending in status.pending.iter().take(take) {
            let Some(migration) = self.migrations.iter().find(|m| m.version == pending.version)
            else {
                continue;
            };

            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::migration_span(migration.version).entered();

            let start = Instant::now();
            run_statements(executor, migration, migration.up)?;
            let execution_time_ms = i64::try_from(start.elapsed().as_millis()).ok();

            let record = MigrationRecord::new(
                migration.version,
                migration.name.to_string(),
                pending.checksum.clone(),
                Utc::now(),
                execution_time_ms,
                true,
            );
            Self::record_migration(executor, &record)?;
            log::info!(
                "applied migration {} ({}) in {}ms",
                migration.version,
                migration.name,
                execution_time_ms.unwrap_or_default()
            );
            applied_count += 1;
        }

        Ok(applied_count)
    }

    /// Roll back the last `steps` applied migrations (default 1), newest first.
    pub fn down(
        &self,
        executor: &dyn SqlExecutor,
        steps: Option<usize>,
    ) -> Result<usize, MigrationError> {
        let lock = MigrationLockGuard::acquire(executor, None)?;
        let executor = lock.executor();
        let status = self.status(executor)?;

        let mut applied = status.applied;
        applied.sort_by_key(|m| std::cmp::Reverse(m.version));

        let mut rolled_back = 0;
        for record in applied.iter().take(steps.unwrap_or(1)) {
            let Some(migration) = self.migrations.iter().find(|m| m.version == record.version)
            else {
                continue;
            };
            run_statements(executor, migration, migration.down)?;
            executor.execute(
                "DELETE FROM bursar_migrations WHERE version = $1",
                &[&record.version],
            )?;
            log::info!("rolled back migration {} ({})", migration.version, migration.name);
            rolled_back += 1;
        }

        Ok(rolled_back)
    }

    /// Excludes the lock row (version = -1).
    fn query_applied_migrations(
        executor: &dyn SqlExecutor,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        let rows = executor.query_all(
            "SELECT version, name, checksum, applied_at, execution_time_ms, success \
             FROM bursar_migrations WHERE version > 0 ORDER BY version ASC",
            &[],
        )?;
        rows.iter().map(MigrationRecord::from_row).collect()
    }

    fn record_migration(
        executor: &dyn SqlExecutor,
        record: &MigrationRecord,
    ) -> Result<(), MigrationError> {
        executor.execute(
            "INSERT INTO bursar_migrations \
             (version, name, checksum, applied_at, execution_time_ms, success) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &record.version,
                &record.name,
                &record.checksum,
                &record.applied_at,
                &record.execution_time_ms,
                &record.success,
            ],
        )?;
        Ok(())
    }
}

fn run_statements(
    executor: &dyn SqlExecutor,
    migration: &Migration,
    statements: &[&str],
) -> Result<(), MigrationError> {
    for statement in statements {
        executor
            .execute(statement, &[])
            .map_err(|e| MigrationError::ExecutionFailed {
                version: migration.version,
                name: migration.name.to_string(),
                error: e.to_string(),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: i64, name: &str, checksum: String) -> MigrationRecord {
        MigrationRecord::new(version, name.into(), checksum, Utc::now(), Some(3), true)
    }

    #[test]
    fn test_bundled_migrations_are_all_pending_on_empty_table() {
        let migrator = Migrator::bundled();
        let status = migrator.compare(Vec::new()).unwrap();
        assert_eq!(status.pending.len(), MIGRATIONS.len());
        assert_eq!(status.next_pending_version(), Some(MIGRATIONS[0].version));
    }

    #[test]
    fn test_applied_prefix_leaves_rest_pending() {
        let migrator = Migrator::bundled();
        let first = migrator.migrations()[0];
        let status = migrator
            .compare(vec![record(first.version, first.name, first.checksum())])
            .unwrap();
        assert_eq!(status.latest_applied_version(), Some(first.version));
        assert_eq!(status.pending.len(), MIGRATIONS.len() - 1);
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn test_edited_migration_is_rejected() {
        let migrator = Migrator::bundled();
        let first = migrator.migrations()[0];
        let err = migrator
            .compare(vec![record(first.version, first.name, "0".repeat(64))])
            .unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_unknown_applied_version_is_rejected() {
        let migrator = Migrator::bundled();
        let err = migrator
            .compare(vec![record(1, "from_the_future", "x".into())])
            .unwrap_err();
        assert!(matches!(err, MigrationError::Unknown { version: 1, .. }));
    }
}

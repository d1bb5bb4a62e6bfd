//! Table-based migration lock.
//!
//! The process that inserts the row with version `-1` into the state table
//! holds the lock; the primary key makes the insert atomic. The guard deletes
//! the row when dropped.

use crate::executor::SqlExecutor;
use crate::migration::{initialize_state_table, MigrationError};
use std::time::{Duration, Instant};

const LOCK_VERSION: i64 = -1;
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct MigrationLockGuard<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> MigrationLockGuard<'a> {
    /// Wait up to `timeout_seconds` (default 60) for the lock.
    pub fn acquire(
        executor: &'a dyn SqlExecutor,
        timeout_seconds: Option<u64>,
    ) -> Result<Self, MigrationError> {
        initialize_state_table(executor)?;
        let timeout = Duration::from_secs(timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        let start = Instant::now();

        loop {
            let inserted = executor.execute(
                "INSERT INTO bursar_migrations (version, name, checksum, applied_at, success) \
                 VALUES ($1, 'LOCK', 'lock', NOW(), true) ON CONFLICT (version) DO NOTHING",
                &[&LOCK_VERSION],
            )?;
            if inserted > 0 {
                log::debug!("migration lock acquired");
                return Ok(Self { executor });
            }
            if start.elapsed() >= timeout {
                return Err(MigrationError::LockTimeout(format!(
                    "lock not acquired within {}s; if no migration is running, remove it with \
                     DELETE FROM bursar_migrations WHERE version = {LOCK_VERSION}",
                    timeout.as_secs()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn executor(&self) -> &'a dyn SqlExecutor {
        self.executor
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.executor.execute(
            "DELETE FROM bursar_migrations WHERE version = $1",
            &[&LOCK_VERSION],
        ) {
            log::error!("failed to release migration lock: {e}");
        }
    }
}

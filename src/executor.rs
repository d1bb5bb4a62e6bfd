//! SQL execution over `may_postgres`.
//!
//! [`SqlExecutor`] is the seam the PostgreSQL store and the migrator talk to.
//! [`MayPostgresExecutor`] is the production implementation; every statement
//! it runs is timed and, with the `tracing` feature, wrapped in a span.

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Error raised while talking to the database.
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// Statement rejected before reaching the server
    Query(String),
    /// Row could not be decoded into the expected type
    Parse(String),
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            DbError::Query(s) => write!(f, "Query error: {s}"),
            DbError::Parse(s) => write!(f, "Parse error: {s}"),
            DbError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        DbError::Postgres(err)
    }
}

/// Executes SQL statements.
///
/// Parameters use `$1`, `$2`, ... placeholders.
pub trait SqlExecutor: Send + Sync {
    /// Run a statement and return the number of rows affected.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError>;

    /// Run a query expected to return exactly one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError>;

    /// Run a query and return all rows.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError>;

    /// Run a query returning zero or one row.
    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query_all(query, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(DbError::Query(format!("expected at most one row, got {n}"))),
        }
    }
}

/// [`SqlExecutor`] backed by a single `may_postgres::Client`.
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Run `SELECT 1` to check the connection is alive.
    pub fn check_health(&self) -> Result<bool, DbError> {
        crate::connection::check_connection_health(&self.client)
            .map_err(|e| DbError::Other(format!("Health check error: {e}")))
    }

    fn timed<T>(
        &self,
        query: &str,
        run: impl FnOnce(&Client) -> Result<T, PostgresError>,
    ) -> Result<T, DbError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(query).entered();
        #[cfg(not(feature = "tracing"))]
        let _ = query;

        let start = Instant::now();
        let result = run(&self.client).map_err(|e| {
            #[cfg(feature = "metrics")]
            METRICS.record_query_error();
            log::debug!("statement failed: {e}");
            DbError::Postgres(e)
        });

        #[cfg(feature = "metrics")]
        METRICS.record_query_duration(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        result
    }
}

impl SqlExecutor for MayPostgresExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.timed(query, |c| c.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.timed(query, |c| c.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.timed(query, |c| c.query(query, params))
    }
}

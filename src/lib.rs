//! # Bursar
//!
//! Back-office service for a private primary school: student records, a
//! tuition cash ledger, reconciliation of what each student owes against
//! what was paid, school-attendance certificates and printable reports.
//!
//! Runs on the `may` coroutine runtime end to end: `may_minihttp` serves
//! requests and `may_postgres` talks to the database. Services share one
//! injected [`store::Store`], either PostgreSQL or in-memory.

pub mod auth;
pub mod certificates;
pub mod clock;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod executor;
pub mod fees;
pub mod http;
pub mod ident;
pub mod ledger;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod reconciliation;
pub mod report;
pub mod state;
pub mod store;

pub use error::{BursarError, BursarResult};
pub use state::AppState;

//! Domain records shared by the store, the services and the HTTP layer.

pub mod certificate;
pub mod fee;
pub mod student;
pub mod transaction;
pub mod user;

pub use certificate::{Certificate, CertificateRequest};
pub use fee::{FeeInput, FeeSchedule, FEE_CLASSES};
pub use student::{Sex, Student, StudentInput};
pub use transaction::{
    checked_total, max_amount, LedgerTotals, Transaction, TransactionFilter, TransactionInput, TransactionKind,
    TransactionPatch,
};
pub use user::{Agent, AgentInput, Role, User};

//! Persistence seam.
//!
//! One trait per collection. Services hold an `Arc<dyn Store>` and never know
//! which backend they run against. Both backends enforce the same unique
//! constraints and report violations as [`StoreError::UniqueViolation`]
//! carrying the constraint name, so callers can map them to a conflict.

pub mod error_handling;
pub mod memory;
pub mod postgres;
pub mod value_conversion;

use crate::executor::DbError;
use crate::model::{
    Agent, Certificate, FeeSchedule, LedgerTotals, Student, Transaction, TransactionFilter, User,
};
use std::fmt;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Names of the unique constraints, shared by both backends.
pub mod constraints {
    pub const STUDENT_MATRICULE: &str = "students_matricule_key";
    pub const FEE_CLASS_YEAR: &str = "fee_schedules_class_year_key";
    pub const TRANSACTION_REFERENCE: &str = "transactions_reference_key";
    pub const INFLOW_RECEIPT: &str = "transactions_inflow_receipt_key";
    pub const CERTIFICATE_CODE: &str = "certificates_code_key";
    pub const USERNAME: &str = "users_username_key";
}

#[derive(Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write
    UniqueViolation { constraint: String },
    /// The row to update does not exist
    NotFound(String),
    /// Driver or server failure
    Database(DbError),
    /// A row could not be mapped to a record
    Parse(String),
    /// An aggregate exceeded the decimal range
    Overflow(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn unique(constraint: &str) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    pub fn is_unique_violation_on(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UniqueViolation { constraint } => {
                write!(f, "unique constraint violated: {constraint}")
            }
            StoreError::NotFound(what) => write!(f, "not found: {what}"),
            StoreError::Database(e) => write!(f, "{e}"),
            StoreError::Parse(s) => write!(f, "row mapping failed: {s}"),
            StoreError::Overflow(what) => write!(f, "amount overflow in {what}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match error_handling::unique_violation_constraint(&err) {
            Some(constraint) => StoreError::UniqueViolation { constraint },
            None => StoreError::Database(err),
        }
    }
}

pub trait StudentStore {
    fn insert_student(&self, student: &Student) -> StoreResult<()>;

    /// Insert every record or none of them.
    fn insert_students(&self, students: &[Student]) -> StoreResult<()>;

    fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>>;

    /// Replace a record. `NotFound` when no row has this id.
    fn update_student(&self, student: &Student) -> StoreResult<()>;

    fn delete_student(&self, id: Uuid) -> StoreResult<bool>;

    fn find_student_by_matricule(&self, matricule: &str) -> StoreResult<Option<Student>>;

    /// Case-insensitive substring match on last or first name, optionally
    /// restricted to a class and year.
    fn search_students(
        &self,
        needle: &str,
        class_year: Option<(&str, &str)>,
        limit: usize,
    ) -> StoreResult<Vec<Student>>;

    /// Students of a class, sorted by last name then first name.
    fn students_in_class(&self, class_name: &str) -> StoreResult<Vec<Student>>;

    /// Distinct class names, sorted.
    fn class_names(&self) -> StoreResult<Vec<String>>;

    /// Student count per class, sorted by class name.
    fn headcount(&self, school_year: Option<&str>) -> StoreResult<Vec<(String, u64)>>;
}

pub trait FeeStore {
    fn insert_fee(&self, fee: &FeeSchedule) -> StoreResult<()>;

    /// All entries, school year descending then class ascending.
    fn list_fees(&self) -> StoreResult<Vec<FeeSchedule>>;

    fn find_fee(&self, class_name: &str, school_year: &str) -> StoreResult<Option<FeeSchedule>>;

    fn fees_for_year(&self, school_year: &str) -> StoreResult<Vec<FeeSchedule>>;
}

pub trait TransactionStore {
    fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Replace a record. `NotFound` when no row has this id.
    fn update_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    fn delete_transaction(&self, id: Uuid) -> StoreResult<bool>;

    /// Matching entries, most recent first.
    fn list_transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>>;

    /// Whether an inflow other than `except` already carries this receipt.
    fn inflow_receipt_taken(&self, receipt: &str, except: Option<Uuid>) -> StoreResult<bool>;

    fn totals(&self, filter: &TransactionFilter) -> StoreResult<LedgerTotals>;
}

pub trait CertificateStore {
    fn insert_certificate(&self, certificate: &Certificate) -> StoreResult<()>;

    fn certificate_code_taken(&self, code: &str) -> StoreResult<bool>;

    /// Most recently created first.
    fn recent_certificates(&self, limit: usize) -> StoreResult<Vec<Certificate>>;
}

pub trait UserStore {
    fn insert_user(&self, user: &User) -> StoreResult<()>;

    fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    fn insert_agent(&self, agent: &Agent) -> StoreResult<()>;

    fn agents_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Agent>>;

    fn get_agent(&self, id: Uuid) -> StoreResult<Option<Agent>>;

    /// Mark an agent inactive. `false` when it does not exist.
    fn deactivate_agent(&self, id: Uuid) -> StoreResult<bool>;
}

/// Everything the services need from persistence.
pub trait Store:
    StudentStore + FeeStore + TransactionStore + CertificateStore + UserStore + Send + Sync
{
    fn backend_name(&self) -> &'static str;
}

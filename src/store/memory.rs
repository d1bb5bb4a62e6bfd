//! In-process backend used by tests and by the `memory` configuration.
//!
//! All collections live behind one lock, so a uniqueness check and the write
//! it guards happen atomically, the same guarantee the PostgreSQL indexes give.

use super::constraints::*;
use super::{
    CertificateStore, FeeStore, Store, StoreError, StoreResult, StudentStore, TransactionStore,
    UserStore,
};
use crate::model::{
    Agent, Certificate, FeeSchedule, LedgerTotals, Student, Transaction, TransactionFilter,
    TransactionKind, User,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Collections {
    students: HashMap<Uuid, Student>,
    fees: Vec<FeeSchedule>,
    transactions: HashMap<Uuid, Transaction>,
    certificates: Vec<Certificate>,
    users: HashMap<Uuid, User>,
    agents: Vec<Agent>,
}

impl Collections {
    fn matricule_taken(&self, matricule: Option<&str>, except: Option<Uuid>) -> bool {
        let Some(m) = matricule else { return false };
        self.students
            .values()
            .any(|s| Some(s.id) != except && s.matricule.as_deref() == Some(m))
    }

    fn check_transaction(&self, t: &Transaction) -> StoreResult<()> {
        let others = self.transactions.values().filter(|o| o.id != t.id);
        for other in others {
            if other.reference == t.reference {
                return Err(StoreError::unique(TRANSACTION_REFERENCE));
            }
            if t.kind == TransactionKind::Inflow
                && other.kind == TransactionKind::Inflow
                && t.receipt.is_some()
                && other.receipt == t.receipt
            {
                return Err(StoreError::unique(INFLOW_RECEIPT));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

impl StudentStore for MemoryStore {
    fn insert_student(&self, student: &Student) -> StoreResult<()> {
        let mut c = self.write();
        if c.matricule_taken(student.matricule.as_deref(), None) {
            return Err(StoreError::unique(STUDENT_MATRICULE));
        }
        c.students.insert(student.id, student.clone());
        Ok(())
    }

    fn insert_students(&self, students: &[Student]) -> StoreResult<()> {
        let mut c = self.write();
        let mut batch = BTreeSet::new();
        for s in students {
            if let Some(m) = s.matricule.as_deref() {
                if c.matricule_taken(Some(m), None) || !batch.insert(m) {
                    return Err(StoreError::unique(STUDENT_MATRICULE));
                }
            }
        }
        for s in students {
            c.students.insert(s.id, s.clone());
        }
        Ok(())
    }

    fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>> {
        Ok(self.read().students.get(&id).cloned())
    }

    fn update_student(&self, student: &Student) -> StoreResult<()> {
        let mut c = self.write();
        if !c.students.contains_key(&student.id) {
            return Err(StoreError::NotFound(format!("student {}", student.id)));
        }
        if c.matricule_taken(student.matricule.as_deref(), Some(student.id)) {
            return Err(StoreError::unique(STUDENT_MATRICULE));
        }
        c.students.insert(student.id, student.clone());
        Ok(())
    }

    fn delete_student(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.write().students.remove(&id).is_some())
    }

    fn find_student_by_matricule(&self, matricule: &str) -> StoreResult<Option<Student>> {
        Ok(self
            .read()
            .students
            .values()
            .find(|s| s.matricule.as_deref() == Some(matricule))
            .cloned())
    }

    fn search_students(
        &self,
        needle: &str,
        class_year: Option<(&str, &str)>,
        limit: usize,
    ) -> StoreResult<Vec<Student>> {
        let needle = needle.to_lowercase();
        let c = self.read();
        let mut found: Vec<Student> = c
            .students
            .values()
            .filter(|s| {
                class_year.map_or(true, |(class, year)| {
                    s.class_name == class && s.school_year == year
                })
            })
            .filter(|s| contains_ci(&s.last_name, &needle) || contains_ci(&s.first_name, &needle))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });
        found.truncate(limit);
        Ok(found)
    }

    fn students_in_class(&self, class_name: &str) -> StoreResult<Vec<Student>> {
        let c = self.read();
        let mut found: Vec<Student> = c
            .students
            .values()
            .filter(|s| s.class_name == class_name)
            .cloned()
            .collect();
        found.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        Ok(found)
    }

    fn class_names(&self) -> StoreResult<Vec<String>> {
        let c = self.read();
        let names: BTreeSet<String> = c.students.values().map(|s| s.class_name.clone()).collect();
        Ok(names.into_iter().collect())
    }

    fn headcount(&self, school_year: Option<&str>) -> StoreResult<Vec<(String, u64)>> {
        let c = self.read();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for s in c
            .students
            .values()
            .filter(|s| school_year.map_or(true, |y| s.school_year == y))
        {
            *counts.entry(s.class_name.clone()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

impl FeeStore for MemoryStore {
    fn insert_fee(&self, fee: &FeeSchedule) -> StoreResult<()> {
        let mut c = self.write();
        if c
            .fees
            .iter()
            .any(|f| f.class_name == fee.class_name && f.school_year == fee.school_year)
        {
            return Err(StoreError::unique(FEE_CLASS_YEAR));
        }
        c.fees.push(fee.clone());
        Ok(())
    }

    fn list_fees(&self) -> StoreResult<Vec<FeeSchedule>> {
        let mut fees = self.read().fees.clone();
        fees.sort_by(|a, b| {
            b.school_year
                .cmp(&a.school_year)
                .then_with(|| a.class_name.cmp(&b.class_name))
        });
        Ok(fees)
    }

    fn find_fee(&self, class_name: &str, school_year: &str) -> StoreResult<Option<FeeSchedule>> {
        Ok(self
            .read()
            .fees
            .iter()
            .find(|f| f.class_name == class_name && f.school_year == school_year)
            .cloned())
    }

    fn fees_for_year(&self, school_year: &str) -> StoreResult<Vec<FeeSchedule>> {
        Ok(self
            .read()
            .fees
            .iter()
            .filter(|f| f.school_year == school_year)
            .cloned()
            .collect())
    }
}

impl TransactionStore for MemoryStore {
    fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut c = self.write();
        c.check_transaction(transaction)?;
        c.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self.read().transactions.get(&id).cloned())
    }

    fn update_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut c = self.write();
        if !c.transactions.contains_key(&transaction.id) {
            return Err(StoreError::NotFound(format!("transaction {}", transaction.id)));
        }
        c.check_transaction(transaction)?;
        c.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    fn delete_transaction(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.write().transactions.remove(&id).is_some())
    }

    fn list_transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>> {
        let c = self.read();
        let mut found: Vec<Transaction> = c
            .transactions
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.reference.cmp(&a.reference)));
        Ok(found)
    }

    fn inflow_receipt_taken(&self, receipt: &str, except: Option<Uuid>) -> StoreResult<bool> {
        Ok(self.read().transactions.values().any(|t| {
            t.kind == TransactionKind::Inflow
                && Some(t.id) != except
                && t.receipt.as_deref() == Some(receipt)
        }))
    }

    fn totals(&self, filter: &TransactionFilter) -> StoreResult<LedgerTotals> {
        let c = self.read();
        let mut totals = LedgerTotals::default();
        for t in c.transactions.values().filter(|t| filter.matches(t)) {
            totals
                .add(t)
                .ok_or_else(|| StoreError::Overflow("ledger totals".into()))?;
        }
        Ok(totals)
    }
}

impl CertificateStore for MemoryStore {
    fn insert_certificate(&self, certificate: &Certificate) -> StoreResult<()> {
        let mut c = self.write();
        if c.certificates.iter().any(|x| x.code == certificate.code) {
            return Err(StoreError::unique(CERTIFICATE_CODE));
        }
        c.certificates.push(certificate.clone());
        Ok(())
    }

    fn certificate_code_taken(&self, code: &str) -> StoreResult<bool> {
        Ok(self.read().certificates.iter().any(|c| c.code == code))
    }

    fn recent_certificates(&self, limit: usize) -> StoreResult<Vec<Certificate>> {
        let c = self.read();
        // Insertion order breaks ties between identical timestamps.
        let mut found: Vec<(usize, &Certificate)> = c.certificates.iter().enumerate().collect();
        found.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(found.into_iter().take(limit).map(|(_, c)| c.clone()).collect())
    }
}

impl UserStore for MemoryStore {
    fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut c = self.write();
        if c.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::unique(USERNAME));
        }
        c.users.insert(user.id, user.clone());
        Ok(())
    }

    fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.read().users.get(&id).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    fn insert_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.write().agents.push(agent.clone());
        Ok(())
    }

    fn agents_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Agent>> {
        Ok(self
            .read()
            .agents
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    fn get_agent(&self, id: Uuid) -> StoreResult<Option<Agent>> {
        Ok(self.read().agents.iter().find(|a| a.id == id).cloned())
    }

    fn deactivate_agent(&self, id: Uuid) -> StoreResult<bool> {
        let mut c = self.write();
        match c.agents.iter_mut().find(|a| a.id == id) {
            Some(agent) => {
                agent.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Store for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sex;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn student(last: &str, first: &str, class: &str, matricule: Option<&str>) -> Student {
        let now = Utc::now();
        Student {
            id: Uuid::new_v4(),
            last_name: last.into(),
            first_name: first.into(),
            birth_date: None,
            birth_place: None,
            sex: Sex::F,
            contact: None,
            matricule: matricule.map(str::to_string),
            class_name: class.into(),
            school_year: "2024-2025".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn inflow(reference: &str, receipt: &str, hours: i64) -> Transaction {
        let date = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap() + Duration::hours(hours);
        Transaction {
            id: Uuid::new_v4(),
            kind: TransactionKind::Inflow,
            reference: reference.into(),
            amount: Decimal::from(1000),
            date,
            created_by: "Caisse".into(),
            student_id: None,
            student_name: Some("AHO Jean".into()),
            receipt: Some(receipt.into()),
            motive: Some("scolarité".into()),
            category: None,
            description: None,
            created_at: date,
            updated_at: date,
        }
    }

    #[test]
    fn test_matricule_unique_on_insert_and_update() {
        let store = MemoryStore::new();
        store.insert_student(&student("AHO", "Jean", "CE1", Some("M1"))).unwrap();
        let err = store
            .insert_student(&student("DOSSA", "Eva", "CE1", Some("M1")))
            .unwrap_err();
        assert!(err.is_unique_violation_on(STUDENT_MATRICULE));

        let mut other = student("DOSSA", "Eva", "CE1", None);
        store.insert_student(&other).unwrap();
        other.matricule = Some("M1".into());
        assert!(store.update_student(&other).is_err());
    }

    #[test]
    fn test_bulk_insert_is_all_or_nothing() {
        let store = MemoryStore::new();
        let batch = vec![
            student("A", "a", "CI", Some("X")),
            student("B", "b", "CI", Some("X")),
        ];
        assert!(store.insert_students(&batch).is_err());
        assert!(store.students_in_class("CI").unwrap().is_empty());
    }

    #[test]
    fn test_receipt_unique_among_inflows_only() {
        let store = MemoryStore::new();
        store.insert_transaction(&inflow("TRX1", "R-1", 0)).unwrap();
        let err = store.insert_transaction(&inflow("TRX2", "R-1", 1)).unwrap_err();
        assert!(err.is_unique_violation_on(INFLOW_RECEIPT));

        let mut outflow = inflow("TRX3", "R-1", 2);
        outflow.kind = TransactionKind::Outflow;
        store.insert_transaction(&outflow).unwrap();
        assert!(store.inflow_receipt_taken("R-1", None).unwrap());
    }

    #[test]
    fn test_list_is_date_descending() {
        let store = MemoryStore::new();
        store.insert_transaction(&inflow("TRX1", "R-1", 0)).unwrap();
        store.insert_transaction(&inflow("TRX2", "R-2", 5)).unwrap();
        store.insert_transaction(&inflow("TRX3", "R-3", 2)).unwrap();
        let refs: Vec<String> = store
            .list_transactions(&TransactionFilter::default())
            .unwrap()
            .into_iter()
            .map(|t| t.reference)
            .collect();
        assert_eq!(refs, vec!["TRX2", "TRX3", "TRX1"]);
    }

    #[test]
    fn test_headcount_sorted_by_class() {
        let store = MemoryStore::new();
        for (last, class) in [("A", "CP"), ("B", "CE1"), ("C", "CP")] {
            store.insert_student(&student(last, "x", class, None)).unwrap();
        }
        assert_eq!(
            store.headcount(Some("2024-2025")).unwrap(),
            vec![("CE1".to_string(), 1), ("CP".to_string(), 2)]
        );
        assert!(store.headcount(Some("2023-2024")).unwrap().is_empty());
    }
}

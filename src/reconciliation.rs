//! Amount owed versus paid, per student and school-wide.
//!
//! A student's payments are found by name snapshot rather than by id, so
//! inflows recorded before a student record was re-created still count.
//! Payments whose motive is empty or mentions a non-tuition keyword are
//! left out. A one-time surcharge is added to the fee when an enrolment
//! payment is present.

use crate::config::ReconciliationConfig;
use crate::error::{BursarError, BursarResult};
use crate::model::{checked_total, Student, Transaction, TransactionFilter, TransactionKind};
use crate::store::Store;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

// Unicode word boundaries: "réinscription" does not match.
static ENROLMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\binscription\b").expect("enrolment pattern compiles"));

pub const FEE_NOT_FOUND: &str = "Aucun frais trouvé pour cette classe";

/// Motive keywords that mark a payment as not being this year's tuition.
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    keywords: Vec<String>,
}

impl ExclusionPolicy {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn excludes(&self, motive: Option<&str>) -> bool {
        match motive.map(str::trim) {
            None | Some("") => true,
            Some(m) => {
                let m = m.to_lowercase();
                self.keywords.iter().any(|k| m.contains(k.as_str()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementStudent {
    pub id: Uuid,
    pub nom: String,
    pub prenom: String,
    pub classe: String,
    #[serde(rename = "anneeScolaire")]
    pub annee_scolaire: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matricule: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub date: DateTime<Utc>,
    pub montant: Decimal,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motifs: Option<String>,
}

impl From<&Transaction> for Payment {
    fn from(t: &Transaction) -> Self {
        Self {
            date: t.date,
            montant: t.amount,
            reference: t.reference.clone(),
            recu: t.receipt.clone(),
            motifs: t.motive.clone(),
        }
    }
}

/// One student's tuition account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub eleve: StatementStudent,
    /// Counted payments, oldest first
    pub paiements: Vec<Payment>,
    #[serde(rename = "montantScolarite")]
    pub base_fee: Decimal,
    #[serde(rename = "ajustement")]
    pub adjustment: Decimal,
    #[serde(rename = "montantTotal")]
    pub expected_total: Decimal,
    #[serde(rename = "totalPaye")]
    pub total_paid: Decimal,
    /// Negative when the student paid more than owed.
    #[serde(rename = "resteAPayer")]
    pub remaining: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    #[serde(rename = "anneeScolaire")]
    pub school_year: String,
    #[serde(rename = "montantAttendu")]
    pub expected: Decimal,
    #[serde(rename = "montantEncaisse")]
    pub collected: Decimal,
    /// Percentage, two decimals
    pub taux: Decimal,
}

pub struct Reconciler {
    store: Arc<dyn Store>,
    policy: ExclusionPolicy,
    surcharge: Decimal,
    trigger_amount: Decimal,
    default_school_year: String,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, config: &ReconciliationConfig) -> Self {
        Self {
            store,
            policy: ExclusionPolicy::new(&config.excluded_keywords),
            surcharge: config.surcharge(),
            trigger_amount: config.trigger_amount(),
            default_school_year: config.default_school_year.clone(),
        }
    }

    pub fn default_school_year(&self) -> &str {
        &self.default_school_year
    }

    pub fn statement(&self, student_id: Uuid) -> BursarResult<Statement> {
        let student = self
            .store
            .get_student(student_id)?
            .ok_or_else(|| BursarError::NotFound("Élève introuvable".into()))?;
        self.statement_for(&student)
    }

    pub fn statement_for(&self, student: &Student) -> BursarResult<Statement> {
        let fee = self
            .store
            .find_fee(&student.class_name, &student.school_year)?
            .ok_or_else(|| BursarError::NotFound(FEE_NOT_FOUND.into()))?;

        let inflows = self
            .store
            .list_transactions(&TransactionFilter::kind(TransactionKind::Inflow))?;
        let counted = self.counted_payments(student, inflows)?;

        let enrolment_paid = counted.iter().any(|t| {
            t.motive
                .as_deref()
                .is_some_and(|m| ENROLMENT.is_match(m))
        }) || counted.iter().any(|t| t.amount == self.trigger_amount);
        let adjustment = if enrolment_paid {
            self.surcharge
        } else {
            Decimal::ZERO
        };

        let expected_total = fee
            .amount
            .checked_add(adjustment)
            .ok_or_else(|| overflow("expected total"))?;
        let total_paid = checked_total(counted.iter().map(|t| t.amount))
            .ok_or_else(|| overflow("payments"))?;
        log::debug!(
            "statement {}: {} counted payment(s), adjustment {adjustment}",
            student.id,
            counted.len()
        );

        Ok(Statement {
            eleve: StatementStudent {
                id: student.id,
                nom: student.last_name.clone(),
                prenom: student.first_name.clone(),
                classe: student.class_name.clone(),
                annee_scolaire: student.school_year.clone(),
                matricule: student.matricule.clone(),
            },
            paiements: counted.iter().map(Payment::from).collect(),
            base_fee: fee.amount,
            adjustment,
            expected_total,
            total_paid,
            remaining: expected_total - total_paid,
        })
    }

    /// Inflows whose name snapshot matches the student, minus excluded
    /// motives, oldest first.
    fn counted_payments(
        &self,
        student: &Student,
        inflows: Vec<Transaction>,
    ) -> BursarResult<Vec<Transaction>> {
        let pattern = format!(
            r"(?i){}\s*{}",
            regex::escape(&student.last_name),
            regex::escape(&student.first_name)
        );
        let name = Regex::new(&pattern)
            .map_err(|e| BursarError::Internal(format!("name pattern: {e}")))?;

        let mut counted: Vec<Transaction> = inflows
            .into_iter()
            .filter(|t| t.student_name.as_deref().is_some_and(|n| name.is_match(n)))
            .filter(|t| !self.policy.excludes(t.motive.as_deref()))
            .collect();
        counted.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.reference.cmp(&b.reference)));
        Ok(counted)
    }

    /// Expected tuition for the year against everything collected.
    pub fn progress(&self, school_year: Option<&str>) -> BursarResult<Progress> {
        let year = school_year
            .map(str::trim)
            .filter(|y| !y.is_empty())
            .unwrap_or(&self.default_school_year);

        let headcount = self.store.headcount(Some(year))?;
        let mut expected = Decimal::ZERO;
        for fee in self.store.fees_for_year(year)? {
            let count = headcount
                .iter()
                .find(|(class, _)| *class == fee.class_name)
                .map_or(0, |(_, n)| *n);
            expected = fee
                .amount
                .checked_mul(Decimal::from(count))
                .and_then(|due| expected.checked_add(due))
                .ok_or_else(|| overflow("expected tuition"))?;
        }
        let collected = self
            .store
            .totals(&TransactionFilter::kind(TransactionKind::Inflow))?
            .inflows;

        let taux = if expected > Decimal::ZERO {
            collected
                .checked_div(expected)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .ok_or_else(|| overflow("collection rate"))?
                .round_dp(2)
        } else {
            Decimal::ZERO
        };

        Ok(Progress {
            school_year: year.to_string(),
            expected,
            collected,
            taux,
        })
    }
}

fn overflow(what: &str) -> BursarError {
    BursarError::Internal(format!("amount overflow in {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_excluded_keywords;

    fn policy() -> ExclusionPolicy {
        ExclusionPolicy::new(default_excluded_keywords())
    }

    #[test]
    fn test_exclusion_is_case_insensitive_substring() {
        let p = policy();
        assert!(p.excludes(Some("ANCIENNE année")));
        assert!(p.excludes(Some("Frais de CANTINE mars")));
        assert!(p.excludes(Some("Reste scolarité")));
        assert!(p.excludes(Some("Examen CEP")));
        assert!(!p.excludes(Some("Inscription 2025")));
        assert!(!p.excludes(Some("Scolarité 1ère tranche")));
    }

    #[test]
    fn test_empty_motive_is_excluded() {
        let p = policy();
        assert!(p.excludes(None));
        assert!(p.excludes(Some("")));
        assert!(p.excludes(Some("   ")));
    }

    #[test]
    fn test_enrolment_pattern_is_whole_word() {
        assert!(ENROLMENT.is_match("Inscription 2025"));
        assert!(ENROLMENT.is_match("frais d'inscription"));
        assert!(!ENROLMENT.is_match("Réinscription"));
        assert!(!ENROLMENT.is_match("preinscriptions"));
    }

    #[test]
    fn test_policy_from_config_keywords() {
        let p = ExclusionPolicy::new(["Tenue", " ", "Livre"]);
        assert!(p.excludes(Some("achat LIVRE")));
        assert!(!p.excludes(Some("cantine")));
    }
}

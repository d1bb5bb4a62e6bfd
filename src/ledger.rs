//! Cash register: inflows ("entree") and outflows ("sortie").
//!
//! Receipt numbers are unique among inflows. The service checks first for a
//! friendly message; the store's unique index decides under concurrency.

use crate::auth::Principal;
use crate::clock::{Clock, LocalDay};
use crate::config::{IdentifierConfig, LedgerConfig};
use crate::error::{BursarError, BursarResult};
use crate::ident::ReferenceGenerator;
use crate::model::{
    checked_total, max_amount, LedgerTotals, Transaction, TransactionFilter, TransactionInput, TransactionKind,
    TransactionPatch,
};
use crate::store::{constraints, Store, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

pub const TRANSACTION_NOT_FOUND: &str = "Transaction introuvable";
const NO_MOVEMENT: &str = "Aucun mouvement";
pub const AMOUNT_TOO_LARGE: &str = "Montant trop élevé.";

#[derive(Debug, Clone, Default)]
pub struct Inflow {
    pub student_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub receipt: Option<String>,
    pub motive: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct Outflow {
    pub category: Option<String>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Dashboard cards. `solde` is omitted for roles that may not see balances.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solde: Option<Decimal>,
    #[serde(rename = "revenusJour")]
    pub inflows_today: Decimal,
    #[serde(rename = "depensesJour")]
    pub outflows_today: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyFlow {
    pub date: String,
    #[serde(rename = "revenus")]
    pub inflows: Decimal,
    #[serde(rename = "recettes")]
    pub outflows: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    #[serde(rename = "categorie")]
    pub category: Option<String>,
    #[serde(rename = "montant")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashStats {
    #[serde(rename = "revenusVsRecettes")]
    pub per_day: Vec<DailyFlow>,
    #[serde(rename = "depensesCategories")]
    pub per_category: Vec<CategoryTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyInflowRow {
    pub montant: Decimal,
    pub reference: String,
    pub eleve: String,
    pub motif: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyOutflowRow {
    pub montant: Decimal,
    pub reference: String,
    pub categorie: String,
    pub motif: String,
}

/// Everything printed on the daily cash report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub day: NaiveDate,
    /// DD/MM/YYYY
    pub date: String,
    pub caissier: String,
    pub fondateur: String,
    #[serde(rename = "soldeOuverture")]
    pub opening_balance: Decimal,
    pub entrees: Vec<DailyInflowRow>,
    pub sorties: Vec<DailyOutflowRow>,
    #[serde(rename = "totalEntrees")]
    pub total_inflows: Decimal,
    #[serde(rename = "totalSorties")]
    pub total_outflows: Decimal,
    #[serde(rename = "soldeJour")]
    pub net: Decimal,
    #[serde(rename = "soldeCloture")]
    pub closing_balance: Decimal,
}

pub struct Ledger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    references: ReferenceGenerator,
    local: LocalDay,
    founder_name: String,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        identifiers: &IdentifierConfig,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            references: ReferenceGenerator::new(identifiers.reference_prefix.clone()),
            local: LocalDay::new(config.utc_offset_minutes),
            founder_name: config.founder_name.clone(),
        }
    }

    pub fn local_day(&self) -> LocalDay {
        self.local
    }

    pub fn today(&self) -> NaiveDate {
        self.local.day_of(self.clock.now())
    }

    /// Record either kind from a request body carrying `type`.
    pub fn record(&self, by: &Principal, input: TransactionInput) -> BursarResult<Transaction> {
        let kind = input.kind.as_deref().and_then(TransactionKind::parse).ok_or_else(|| {
            BursarError::validation("type", "Type invalide (entree | sortie)")
        })?;
        match kind {
            TransactionKind::Inflow => self.record_inflow(
                by,
                Inflow {
                    student_id: input.student_id,
                    amount: input.amount,
                    receipt: input.receipt,
                    motive: input.motive,
                    date: input.date,
                },
            ),
            TransactionKind::Outflow => self.record_outflow(
                by,
                Outflow {
                    category: input.category,
                    amount: input.amount,
                    description: input.description,
                    date: input.date,
                },
            ),
        }
    }

    pub fn record_inflow(&self, by: &Principal, inflow: Inflow) -> BursarResult<Transaction> {
        let amount = positive_amount(inflow.amount)?;
        let receipt = non_blank(inflow.receipt);
        let (Some(student_id), Some(receipt)) = (inflow.student_id, receipt) else {
            return Err(BursarError::validation(
                "recu",
                "Élève et reçu requis pour une entrée.",
            ));
        };
        if self.store.inflow_receipt_taken(&receipt, None)? {
            return Err(receipt_conflict(&receipt));
        }

        // Name snapshot; a dangling student id is kept as-is.
        let student_name = self
            .store
            .get_student(student_id)?
            .map(|s| s.display_name());

        let mut t = self.new_transaction(TransactionKind::Inflow, amount, inflow.date, by);
        t.student_id = Some(student_id);
        t.student_name = student_name;
        t.receipt = Some(receipt);
        t.motive = non_blank(inflow.motive);
        self.insert(t)
    }

    pub fn record_outflow(&self, by: &Principal, outflow: Outflow) -> BursarResult<Transaction> {
        let amount = positive_amount(outflow.amount)?;
        let category = non_blank(outflow.category).ok_or_else(|| {
            BursarError::validation("categorie", "Catégorie requise pour une sortie.")
        })?;

        let mut t = self.new_transaction(TransactionKind::Outflow, amount, outflow.date, by);
        t.category = Some(category);
        t.description = non_blank(outflow.description);
        self.insert(t)
    }

    fn new_transaction(
        &self,
        kind: TransactionKind,
        amount: Decimal,
        date: Option<DateTime<Utc>>,
        by: &Principal,
    ) -> Transaction {
        let now = self.clock.now();
        Transaction {
            id: Uuid::new_v4(),
            kind,
            reference: self.references.next(now),
            amount,
            date: date.unwrap_or(now),
            created_by: by.label(),
            student_id: None,
            student_name: None,
            receipt: None,
            motive: None,
            category: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn insert(&self, mut t: Transaction) -> BursarResult<Transaction> {
        let result = match self.store.insert_transaction(&t) {
            Err(e) if e.is_unique_violation_on(constraints::TRANSACTION_REFERENCE) => {
                // Another process issued the same reference; draw a fresh one.
                t.reference = self.references.next(self.clock.now());
                self.store.insert_transaction(&t)
            }
            other => other,
        };
        result.map_err(|e| conflict_or(e, t.receipt.as_deref()))?;

        #[cfg(feature = "metrics")]
        METRICS.record_transaction(t.kind.as_str());
        log::info!(
            "{} {} of {} recorded by {}",
            t.kind.as_str(),
            t.reference,
            t.amount,
            t.created_by
        );
        Ok(t)
    }

    /// Most recent first.
    pub fn list(&self, filter: &TransactionFilter) -> BursarResult<Vec<Transaction>> {
        Ok(self.store.list_transactions(filter)?)
    }

    pub fn get(&self, id: Uuid) -> BursarResult<Transaction> {
        self.store
            .get_transaction(id)?
            .ok_or_else(|| BursarError::NotFound(TRANSACTION_NOT_FOUND.into()))
    }

    pub fn update(&self, id: Uuid, patch: TransactionPatch) -> BursarResult<Transaction> {
        let mut t = self.get(id)?;

        if let Some(kind) = patch.kind.as_deref() {
            t.kind = TransactionKind::parse(kind).ok_or_else(|| {
                BursarError::validation("type", "Type invalide (entree | sortie)")
            })?;
        }
        if patch.amount.is_some() {
            t.amount = positive_amount(patch.amount)?;
        }
        if let Some(receipt) = non_blank(patch.receipt) {
            if t.is_inflow() && self.store.inflow_receipt_taken(&receipt, Some(id))? {
                return Err(BursarError::Conflict(format!("Le reçu {receipt} existe déjà.")));
            }
            t.receipt = Some(receipt);
        }
        if let Some(date) = patch.date {
            t.date = date;
        }
        if patch.student_id.is_some() {
            t.student_id = patch.student_id;
        }
        if patch.student_name.is_some() {
            t.student_name = patch.student_name;
        }
        if patch.motive.is_some() {
            t.motive = patch.motive;
        }
        if patch.category.is_some() {
            t.category = patch.category;
        }
        if patch.description.is_some() {
            t.description = patch.description;
        }
        t.updated_at = self.clock.now();

        self.store.update_transaction(&t).map_err(|e| match e {
            StoreError::NotFound(_) => BursarError::NotFound(TRANSACTION_NOT_FOUND.into()),
            other => conflict_or(other, t.receipt.as_deref()),
        })?;
        Ok(t)
    }

    pub fn delete(&self, id: Uuid) -> BursarResult<()> {
        if self.store.delete_transaction(id)? {
            log::info!("transaction {id} deleted");
            Ok(())
        } else {
            Err(BursarError::NotFound(TRANSACTION_NOT_FOUND.into()))
        }
    }

    /// Inflows minus outflows, over `[from, until)` when given.
    pub fn balance(&self, range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> BursarResult<Decimal> {
        let filter = match range {
            Some((from, until)) => TransactionFilter::between(from, until),
            None => TransactionFilter::default(),
        };
        Ok(self.store.totals(&filter)?.balance())
    }

    /// Balance of everything dated before the start of `day`.
    pub fn opening_balance(&self, day: NaiveDate) -> BursarResult<Decimal> {
        let (start, _) = self.local.bounds(day);
        Ok(self.store.totals(&TransactionFilter::before(start))?.balance())
    }

    pub fn stats(&self, viewer: &Principal) -> BursarResult<DashboardStats> {
        let (start, end) = self.local.bounds(self.today());
        let today = self.store.totals(&TransactionFilter::between(start, end))?;
        let solde = if viewer.role.sees_balances() {
            Some(self.store.totals(&TransactionFilter::default())?.balance())
        } else {
            None
        };
        Ok(DashboardStats {
            solde,
            inflows_today: today.inflows,
            outflows_today: today.outflows,
        })
    }

    /// Per local day (ascending) and per outflow category.
    pub fn cash_stats(&self) -> BursarResult<CashStats> {
        let all = self.store.list_transactions(&TransactionFilter::default())?;
        let mut days: BTreeMap<NaiveDate, LedgerTotals> = BTreeMap::new();
        let mut categories: BTreeMap<Option<String>, Decimal> = BTreeMap::new();
        for t in &all {
            days.entry(self.local.day_of(t.date))
                .or_default()
                .add(t)
                .ok_or_else(|| overflow("daily totals"))?;
            if !t.is_inflow() {
                let total = categories.entry(t.category.clone()).or_default();
                *total = total
                    .checked_add(t.amount)
                    .ok_or_else(|| overflow("category totals"))?;
            }
        }
        Ok(CashStats {
            per_day: days
                .into_iter()
                .map(|(day, totals)| DailyFlow {
                    date: day.format("%Y-%m-%d").to_string(),
                    inflows: totals.inflows,
                    outflows: totals.outflows,
                })
                .collect(),
            per_category: categories
                .into_iter()
                .map(|(category, amount)| CategoryTotal { category, amount })
                .collect(),
        })
    }

    pub fn daily_report(&self, day: NaiveDate) -> BursarResult<DailyReport> {
        let (start, end) = self.local.bounds(day);
        let mut of_day = self
            .store
            .list_transactions(&TransactionFilter::between(start, end))?;
        of_day.reverse();
        let opening_balance = self.opening_balance(day)?;

        let (inflows, outflows): (Vec<_>, Vec<_>) = of_day.iter().partition(|t| t.is_inflow());
        let caissier = inflows
            .first()
            .or(outflows.first())
            .map_or_else(|| NO_MOVEMENT.to_string(), |t| t.created_by.clone());

        let total_inflows = checked_total(inflows.iter().map(|t| t.amount))
            .ok_or_else(|| overflow("daily inflows"))?;
        let total_outflows = checked_total(outflows.iter().map(|t| t.amount))
            .ok_or_else(|| overflow("daily outflows"))?;
        let net = total_inflows - total_outflows;
        let closing_balance = opening_balance
            .checked_add(net)
            .ok_or_else(|| overflow("closing balance"))?;

        Ok(DailyReport {
            day,
            date: day.format("%d/%m/%Y").to_string(),
            caissier,
            fondateur: self.founder_name.clone(),
            opening_balance,
            entrees: inflows
                .iter()
                .map(|t| DailyInflowRow {
                    montant: t.amount,
                    reference: t.reference.clone(),
                    eleve: or_dash(&t.student_name),
                    motif: or_dash(&t.motive),
                })
                .collect(),
            sorties: outflows
                .iter()
                .map(|t| DailyOutflowRow {
                    montant: t.amount,
                    reference: t.reference.clone(),
                    categorie: or_dash(&t.category),
                    motif: or_dash(&t.description),
                })
                .collect(),
            total_inflows,
            total_outflows,
            net,
            closing_balance,
        })
    }
}

fn positive_amount(amount: Option<Decimal>) -> BursarResult<Decimal> {
    match amount {
        Some(a) if a > max_amount() => Err(BursarError::validation("montant", AMOUNT_TOO_LARGE)),
        Some(a) if a > Decimal::ZERO => Ok(a),
        _ => Err(BursarError::validation("montant", "Montant valide requis.")),
    }
}

fn overflow(what: &str) -> BursarError {
    BursarError::Internal(format!("amount overflow in {what}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn or_dash(value: &Option<String>) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or("-")
        .to_string()
}

fn receipt_conflict(receipt: &str) -> BursarError {
    #[cfg(feature = "metrics")]
    METRICS.record_conflict("recu");
    BursarError::Conflict(format!("Le reçu {receipt} existe déjà pour une autre entrée."))
}

fn conflict_or(err: StoreError, receipt: Option<&str>) -> BursarError {
    if err.is_unique_violation_on(constraints::INFLOW_RECEIPT) {
        receipt_conflict(receipt.unwrap_or_default())
    } else {
        err.into()
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest amount a `NUMERIC(14,2)` column stores: 999 999 999 999.99.
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// Sum of `amounts`, or `None` when it would overflow.
pub fn checked_total<I: IntoIterator<Item = Decimal>>(amounts: I) -> Option<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
}

/// Direction of a cash-register movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Money received (tuition payment, fees)
    #[serde(rename = "entree")]
    Inflow,
    /// Money paid out (expense)
    #[serde(rename = "sortie")]
    Outflow,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Inflow => "entree",
            TransactionKind::Outflow => "sortie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "entree" => Some(TransactionKind::Inflow),
            "sortie" => Some(TransactionKind::Outflow),
            _ => None,
        }
    }
}

/// A ledger entry.
///
/// `student_name` is a snapshot taken when the entry was recorded; it is
/// never synchronised with the student record and survives its deletion.
/// `student_id` is a weak reference that may dangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub reference: String,
    #[serde(rename = "montant")]
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    #[serde(rename = "createdBy")]
    pub created_by: String,
    #[serde(rename = "eleve", default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<Uuid>,
    #[serde(rename = "nomEleve", default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(rename = "recu", default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(rename = "motifs", default, skip_serializing_if = "Option::is_none")]
    pub motive: Option<String>,
    #[serde(rename = "categorie", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_inflow(&self) -> bool {
        self.kind == TransactionKind::Inflow
    }

    /// Amount counted towards a balance: positive for inflows, negative for outflows.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Inflow => self.amount,
            TransactionKind::Outflow => -self.amount,
        }
    }
}

/// Request body for recording either kind of transaction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionInput {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "montant", default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "eleve", default)]
    pub student_id: Option<Uuid>,
    #[serde(rename = "recu", default)]
    pub receipt: Option<String>,
    #[serde(rename = "motifs", default)]
    pub motive: Option<String>,
    #[serde(rename = "categorie", default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update of a transaction. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionPatch {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "montant", default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "eleve", default)]
    pub student_id: Option<Uuid>,
    #[serde(rename = "nomEleve", default)]
    pub student_name: Option<String>,
    #[serde(rename = "recu", default)]
    pub receipt: Option<String>,
    #[serde(rename = "motifs", default)]
    pub motive: Option<String>,
    #[serde(rename = "categorie", default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Selection of ledger entries. Date bounds are `[from, until)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub student_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn kind(kind: TransactionKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn before(until: DateTime<Utc>) -> Self {
        Self {
            until: Some(until),
            ..Default::default()
        }
    }

    pub fn between(from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            until: Some(until),
            ..Default::default()
        }
    }

    pub fn matches(&self, t: &Transaction) -> bool {
        self.kind.map_or(true, |k| t.kind == k)
            && self.student_id.map_or(true, |id| t.student_id == Some(id))
            && self.from.map_or(true, |from| t.date >= from)
            && self.until.map_or(true, |until| t.date < until)
    }
}

/// Sums of inflows and outflows over a selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    #[serde(rename = "totalEntrees")]
    pub inflows: Decimal,
    #[serde(rename = "totalSorties")]
    pub outflows: Decimal,
}

impl LedgerTotals {
    pub fn balance(&self) -> Decimal {
        self.inflows - self.outflows
    }

    /// `None` when a running total would overflow; the totals are unchanged then.
    #[must_use]
    pub fn add(&mut self, t: &Transaction) -> Option<()> {
        let slot = match t.kind {
            TransactionKind::Inflow => &mut self.inflows,
            TransactionKind::Outflow => &mut self.outflows,
        };
        *slot = slot.checked_add(t.amount)?;
        Some(())
    }
}

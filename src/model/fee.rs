use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classes a tuition amount can be defined for.
pub const FEE_CLASSES: [&str; 7] = ["Maternelle", "CI", "CP", "CE1", "CE2", "CM1", "CM2"];

/// Tuition amount for one (class, school year) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub id: Uuid,
    #[serde(rename = "classe")]
    pub class_name: String,
    #[serde(rename = "anneeScolaire")]
    pub school_year: String,
    #[serde(rename = "montant")]
    pub amount: Decimal,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeInput {
    #[serde(rename = "classe", default)]
    pub class_name: Option<String>,
    #[serde(rename = "montant", default)]
    pub amount: Option<Decimal>,
    #[serde(rename = "anneeScolaire", default)]
    pub school_year: Option<String>,
}

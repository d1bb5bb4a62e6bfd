//! Tuition amount per class and school year.

use crate::clock::Clock;
use crate::error::{BursarError, BursarResult};
use crate::ledger::AMOUNT_TOO_LARGE;
use crate::model::{max_amount, FeeInput, FeeSchedule, FEE_CLASSES};
use crate::store::{constraints, Store};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub struct FeeSchedules {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl FeeSchedules {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn create(&self, input: FeeInput) -> BursarResult<FeeSchedule> {
        let class_name = input.class_name.as_deref().map(str::trim).unwrap_or_default();
        let school_year = input.school_year.as_deref().map(str::trim).unwrap_or_default();
        let amount = match input.amount {
            Some(a) if !class_name.is_empty() && !school_year.is_empty() => a,
            _ => {
                return Err(BursarError::validation(
                    "classe",
                    "Tous les champs sont requis.",
                ))
            }
        };
        if !FEE_CLASSES.contains(&class_name) {
            return Err(BursarError::validation(
                "classe",
                format!("Classe invalide ({}).", FEE_CLASSES.join(" | ")),
            ));
        }
        if amount < Decimal::ZERO {
            return Err(BursarError::validation("montant", "Montant valide requis."));
        }
        if amount > max_amount() {
            return Err(BursarError::validation("montant", AMOUNT_TOO_LARGE));
        }

        if self.store.find_fee(class_name, school_year)?.is_some() {
            return Err(duplicate());
        }
        let fee = FeeSchedule {
            id: Uuid::new_v4(),
            class_name: class_name.to_string(),
            school_year: school_year.to_string(),
            amount,
            created_at: self.clock.now(),
        };
        self.store.insert_fee(&fee).map_err(|e| {
            if e.is_unique_violation_on(constraints::FEE_CLASS_YEAR) {
                duplicate()
            } else {
                e.into()
            }
        })?;
        log::info!("fee {} {} set to {}", fee.class_name, fee.school_year, fee.amount);
        Ok(fee)
    }

    /// School year descending, then class.
    pub fn list(&self) -> BursarResult<Vec<FeeSchedule>> {
        Ok(self.store.list_fees()?)
    }

    pub fn lookup(&self, class_name: &str, school_year: &str) -> BursarResult<Option<FeeSchedule>> {
        Ok(self.store.find_fee(class_name, school_year)?)
    }
}

fn duplicate() -> BursarError {
    BursarError::Conflict("Frais déjà défini pour cette classe et année.".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    fn fees() -> FeeSchedules {
        FeeSchedules::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    fn input(classe: &str, montant: i64, annee: &str) -> FeeInput {
        FeeInput {
            class_name: Some(classe.into()),
            amount: Some(Decimal::from(montant)),
            school_year: Some(annee.into()),
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let f = fees();
        f.create(input("CE1", 25_000, "2024-2025")).unwrap();
        let found = f.lookup("CE1", "2024-2025").unwrap().unwrap();
        assert_eq!(found.amount, Decimal::from(25_000));
        assert!(f.lookup("CE1", "2023-2024").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_pair_is_conflict() {
        let f = fees();
        f.create(input("CE1", 25_000, "2024-2025")).unwrap();
        let err = f.create(input("CE1", 30_000, "2024-2025")).unwrap_err();
        assert!(err.is_conflict());
        f.create(input("CE1", 30_000, "2025-2026")).unwrap();
    }

    #[test]
    fn test_validation() {
        let f = fees();
        let missing = FeeInput {
            class_name: Some("CE1".into()),
            ..Default::default()
        };
        assert_eq!(
            f.create(missing).unwrap_err().public_message(),
            "Tous les champs sont requis."
        );
        assert!(f.create(input("6ème", 1, "2024-2025")).is_err());
        assert!(f.create(input("CP", -5, "2024-2025")).is_err());

        let mut huge = input("CP", 0, "2024-2025");
        huge.amount = Some(max_amount() + Decimal::ONE);
        assert_eq!(f.create(huge).unwrap_err().public_message(), AMOUNT_TOO_LARGE);
    }

    #[test]
    fn test_list_order() {
        let f = fees();
        f.create(input("CP", 20_000, "2023-2024")).unwrap();
        f.create(input("CE1", 25_000, "2024-2025")).unwrap();
        f.create(input("CI", 18_000, "2024-2025")).unwrap();
        let listed: Vec<_> = f
            .list()
            .unwrap()
            .into_iter()
            .map(|fee| format!("{} {}", fee.school_year, fee.class_name))
            .collect();
        assert_eq!(listed, vec!["2024-2025 CE1", "2024-2025 CI", "2023-2024 CP"]);
    }
}

//! The bundled schema, one migration per collection group.

use crate::migration::checksum::calculate_checksum;

/// A versioned, reversible schema change.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Timestamp version: YYYYMMDDHHMMSS
    pub version: i64,
    pub name: &'static str,
    pub up: &'static [&'static str],
    pub down: &'static [&'static str],
}

impl Migration {
    pub fn checksum(&self) -> String {
        calculate_checksum(self.up)
    }
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 20250901080000,
        name: "create_students_and_fee_schedules",
        up: &[
            r#"CREATE TABLE students (
                id UUID PRIMARY KEY,
                last_name TEXT NOT NULL,
                first_name TEXT NOT NULL,
                birth_date TEXT,
                birth_place TEXT,
                sex CHAR(1) NOT NULL CHECK (sex IN ('M', 'F')),
                contact TEXT,
                matricule TEXT,
                class_name TEXT NOT NULL,
                school_year TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT students_matricule_key UNIQUE (matricule)
            )"#,
            "CREATE INDEX idx_students_class ON students (class_name, school_year)",
            r#"CREATE TABLE fee_schedules (
                id UUID PRIMARY KEY,
                class_name TEXT NOT NULL
                    CHECK (class_name IN ('Maternelle', 'CI', 'CP', 'CE1', 'CE2', 'CM1', 'CM2')),
                school_year TEXT NOT NULL,
                amount NUMERIC(14, 2) NOT NULL CHECK (amount >= 0),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT fee_schedules_class_year_key UNIQUE (class_name, school_year)
            )"#,
        ],
        down: &["DROP TABLE fee_schedules", "DROP TABLE students"],
    },
    Migration {
        version: 20250901080100,
        name: "create_transactions",
        up: &[
            r#"CREATE TABLE transactions (
                id UUID PRIMARY KEY,
                kind TEXT NOT NULL CHECK (kind IN ('entree', 'sortie')),
                reference TEXT NOT NULL,
                amount NUMERIC(14, 2) NOT NULL CHECK (amount > 0),
                date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                created_by TEXT NOT NULL,
                student_id UUID,
                student_name TEXT,
                receipt TEXT,
                motive TEXT,
                category TEXT,
                description TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT transactions_reference_key UNIQUE (reference)
            )"#,
            // Receipts are unique among inflows only.
            "CREATE UNIQUE INDEX transactions_inflow_receipt_key ON transactions (receipt) \
             WHERE kind = 'entree'",
            "CREATE INDEX idx_transactions_date ON transactions (date)",
            "CREATE INDEX idx_transactions_student ON transactions (student_id)",
        ],
        down: &["DROP TABLE transactions"],
    },
    Migration {
        version: 20250901080200,
        name: "create_certificates",
        up: &[r#"CREATE TABLE certificates (
                id UUID PRIMARY KEY,
                code VARCHAR(32) NOT NULL,
                student_id UUID,
                student_name TEXT NOT NULL,
                class_name TEXT NOT NULL,
                matricule TEXT,
                first_enrollment_date TEXT NOT NULL DEFAULT '',
                delivery_date TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT certificates_code_key UNIQUE (code)
            )"#],
        down: &["DROP TABLE certificates"],
    },
    Migration {
        version: 20250901080300,
        name: "create_users_and_agents",
        up: &[
            r#"CREATE TABLE users (
                id UUID PRIMARY KEY,
                username TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                display_name TEXT,
                role TEXT NOT NULL DEFAULT 'caissier'
                    CHECK (role IN ('admin', 'caissier', 'directeur')),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT users_username_key UNIQUE (username)
            )"#,
            r#"CREATE TABLE agents (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                last_name TEXT NOT NULL,
                first_name TEXT NOT NULL,
                function TEXT NOT NULL DEFAULT 'titulaire',
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        ],
        down: &["DROP TABLE agents", "DROP TABLE users"],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::constraints;

    #[test]
    fn test_versions_strictly_increase() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn test_every_migration_is_reversible() {
        assert!(MIGRATIONS.iter().all(|m| !m.up.is_empty() && !m.down.is_empty()));
    }

    #[test]
    fn test_schema_declares_store_constraints() {
        let sql: String = MIGRATIONS.iter().flat_map(|m| m.up.iter().copied()).collect();
        for name in [
            constraints::STUDENT_MATRICULE,
            constraints::FEE_CLASS_YEAR,
            constraints::TRANSACTION_REFERENCE,
            constraints::INFLOW_RECEIPT,
            constraints::CERTIFICATE_CODE,
            constraints::USERNAME,
        ] {
            assert!(sql.contains(name), "missing constraint {name}");
        }
    }
}

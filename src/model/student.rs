use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BursarError, BursarResult};

static CONTACT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+\d][\d\s\-()]{6,20}$").expect("contact pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    M,
    F,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::M => "M",
            Sex::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "M" | "m" => Some(Sex::M),
            "F" | "f" => Some(Sex::F),
            _ => None,
        }
    }
}

/// An enrolled student. The JSON shape keeps the field names the school's
/// front end already uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    #[serde(rename = "nom")]
    pub last_name: String,
    #[serde(rename = "prenom")]
    pub first_name: String,
    #[serde(rename = "dateNaissance", default)]
    pub birth_date: Option<String>,
    #[serde(rename = "lieuNaissance", default)]
    pub birth_place: Option<String>,
    #[serde(rename = "sexe")]
    pub sex: Sex,
    #[serde(default)]
    pub contact: Option<String>,
    /// Registration number, globally unique when present.
    #[serde(default)]
    pub matricule: Option<String>,
    #[serde(rename = "classe")]
    pub class_name: String,
    #[serde(rename = "anneeScolaire")]
    pub school_year: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Name snapshot written onto ledger entries: `"NOM Prenom"`.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

/// Student fields as submitted by a client. Used both for creation and as a
/// partial update (absent fields keep their current value).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentInput {
    #[serde(rename = "nom", default)]
    pub last_name: Option<String>,
    #[serde(rename = "prenom", default)]
    pub first_name: Option<String>,
    #[serde(rename = "dateNaissance", default)]
    pub birth_date: Option<String>,
    #[serde(rename = "lieuNaissance", default)]
    pub birth_place: Option<String>,
    #[serde(rename = "sexe", default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub matricule: Option<String>,
    #[serde(rename = "classe", default)]
    pub class_name: Option<String>,
    #[serde(rename = "anneeScolaire", default)]
    pub school_year: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: &Option<String>, field: &'static str, label: &str) -> BursarResult<String> {
    trimmed(value).ok_or_else(|| BursarError::validation(field, format!("{label} requis.")))
}

impl StudentInput {
    /// Validate and build a new student record.
    pub fn into_student(self, id: Uuid, now: DateTime<Utc>) -> BursarResult<Student> {
        let sex_raw = required(&self.sex, "sexe", "Sexe")?;
        let sex = Sex::parse(&sex_raw)
            .ok_or_else(|| BursarError::validation("sexe", "Sexe invalide (M | F)."))?;
        let contact = trimmed(&self.contact);
        validate_contact(contact.as_deref())?;

        Ok(Student {
            id,
            last_name: required(&self.last_name, "nom", "Nom")?,
            first_name: required(&self.first_name, "prenom", "Prénom")?,
            birth_date: trimmed(&self.birth_date),
            birth_place: trimmed(&self.birth_place),
            sex,
            contact,
            matricule: trimmed(&self.matricule),
            class_name: required(&self.class_name, "classe", "Classe")?,
            school_year: required(&self.school_year, "anneeScolaire", "Année scolaire")?,
            created_at: now,
            updated_at: now,
        })
    }

    /// Overlay the provided fields on an existing record and re-validate.
    pub fn apply_to(self, current: &Student, now: DateTime<Utc>) -> BursarResult<Student> {
        let merged = StudentInput {
            last_name: self.last_name.or_else(|| Some(current.last_name.clone())),
            first_name: self.first_name.or_else(|| Some(current.first_name.clone())),
            birth_date: self.birth_date.or_else(|| current.birth_date.clone()),
            birth_place: self.birth_place.or_else(|| current.birth_place.clone()),
            sex: self.sex.or_else(|| Some(current.sex.as_str().to_string())),
            contact: self.contact.or_else(|| current.contact.clone()),
            matricule: self.matricule.or_else(|| current.matricule.clone()),
            class_name: self.class_name.or_else(|| Some(current.class_name.clone())),
            school_year: self.school_year.or_else(|| Some(current.school_year.clone())),
        };
        let mut student = merged.into_student(current.id, now)?;
        student.created_at = current.created_at;
        Ok(student)
    }
}

fn validate_contact(contact: Option<&str>) -> BursarResult<()> {
    match contact {
        Some(c) if !CONTACT_PATTERN.is_match(c) => Err(BursarError::validation(
            "contact",
            "Numéro de contact invalide",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> StudentInput {
        StudentInput {
            last_name: Some("  DOSSOU ".into()),
            first_name: Some("Marc".into()),
            sex: Some("M".into()),
            contact: Some("+229 97 00 00 00".into()),
            class_name: Some("CE1".into()),
            school_year: Some("2024-2025".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_into_student_trims_and_validates() {
        let s = input().into_student(Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(s.last_name, "DOSSOU");
        assert_eq!(s.display_name(), "DOSSOU Marc");
        assert_eq!(s.matricule, None);
    }

    #[test]
    fn test_missing_required_field_names_the_field() {
        let mut i = input();
        i.class_name = Some("   ".into());
        match i.into_student(Uuid::new_v4(), Utc::now()) {
            Err(BursarError::Validation { field, .. }) => assert_eq!(field, "classe"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_sex_and_contact_rejected() {
        let mut i = input();
        i.sex = Some("X".into());
        assert!(i.into_student(Uuid::new_v4(), Utc::now()).is_err());

        let mut i = input();
        i.contact = Some("abc".into());
        assert!(i.into_student(Uuid::new_v4(), Utc::now()).is_err());
    }

    #[test]
    fn test_apply_to_keeps_unset_fields() {
        let created = Utc::now();
        let current = input().into_student(Uuid::new_v4(), created).unwrap();
        let patch = StudentInput {
            class_name: Some("CE2".into()),
            ..Default::default()
        };
        let updated = patch.apply_to(&current, Utc::now()).unwrap();
        assert_eq!(updated.id, current.id);
        assert_eq!(updated.class_name, "CE2");
        assert_eq!(updated.last_name, "DOSSOU");
        assert_eq!(updated.created_at, created);
    }
}

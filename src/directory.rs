//! Student records.

use crate::clock::Clock;
use crate::error::{BursarError, BursarResult};
use crate::model::{Student, StudentInput};
use crate::store::{constraints, Store, StoreError};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

const SEARCH_LIMIT: usize = 10;

pub const STUDENT_NOT_FOUND: &str = "Élève introuvable";

/// Result of a search restricted to one class.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClassSearch {
    Unique { unique: bool, eleve: Student },
    Several { unique: bool, eleves: Vec<Student> },
}

impl ClassSearch {
    fn from_matches(mut students: Vec<Student>) -> Self {
        if students.len() == 1 {
            if let Some(eleve) = students.pop() {
                return ClassSearch::Unique { unique: true, eleve };
            }
        }
        ClassSearch::Several {
            unique: false,
            eleves: students,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassHeadcount {
    pub classe: String,
    pub count: u64,
}

/// Alphabetical class list, as printed.
#[derive(Debug, Clone, Serialize)]
pub struct ClassRoster {
    pub classe: String,
    pub date: NaiveDate,
    pub eleves: Vec<Student>,
}

pub struct Directory {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Directory {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn create(&self, input: StudentInput) -> BursarResult<Student> {
        let student = input.into_student(Uuid::new_v4(), self.clock.now())?;
        if let Some(m) = student.matricule.as_deref() {
            if self.store.find_student_by_matricule(m)?.is_some() {
                return Err(duplicate_matricule(m));
            }
        }
        self.store
            .insert_student(&student)
            .map_err(|e| map_matricule_conflict(e, student.matricule.as_deref()))?;
        log::info!("student {} created in {}", student.id, student.class_name);
        Ok(student)
    }

    pub fn get(&self, id: Uuid) -> BursarResult<Student> {
        self.store
            .get_student(id)?
            .ok_or_else(|| BursarError::NotFound(STUDENT_NOT_FOUND.into()))
    }

    pub fn update(&self, id: Uuid, patch: StudentInput) -> BursarResult<Student> {
        let current = self.get(id)?;
        let updated = patch.apply_to(&current, self.clock.now())?;
        self.store
            .update_student(&updated)
            .map_err(|e| match e {
                StoreError::NotFound(_) => BursarError::NotFound(STUDENT_NOT_FOUND.into()),
                other => map_matricule_conflict(other, updated.matricule.as_deref()),
            })?;
        Ok(updated)
    }

    /// Transactions and certificates keep their snapshot of the student.
    pub fn delete(&self, id: Uuid) -> BursarResult<()> {
        if self.store.delete_student(id)? {
            log::info!("student {id} deleted");
            Ok(())
        } else {
            Err(BursarError::NotFound(STUDENT_NOT_FOUND.into()))
        }
    }

    /// Substring match on last or first name. A blank query finds nothing.
    pub fn search(&self, query: &str) -> BursarResult<Vec<Student>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.search_students(query, None, SEARCH_LIMIT)?)
    }

    pub fn search_in_class(
        &self,
        class_name: Option<&str>,
        school_year: Option<&str>,
        search: Option<&str>,
    ) -> BursarResult<ClassSearch> {
        let present = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty());
        let (Some(class_name), Some(school_year), Some(search)) =
            (present(class_name), present(school_year), present(search))
        else {
            return Err(BursarError::validation(
                "classe",
                "Classe, année et search sont requis",
            ));
        };
        let found =
            self.store
                .search_students(search, Some((class_name, school_year)), SEARCH_LIMIT)?;
        Ok(ClassSearch::from_matches(found))
    }

    pub fn list_class(&self, class_name: &str) -> BursarResult<Vec<Student>> {
        Ok(self.store.students_in_class(class_name)?)
    }

    pub fn roster(&self, class_name: &str, date: NaiveDate) -> BursarResult<ClassRoster> {
        Ok(ClassRoster {
            classe: class_name.to_string(),
            date,
            eleves: self.list_class(class_name)?,
        })
    }

    pub fn find_by_matricule(&self, matricule: &str) -> BursarResult<Student> {
        self.store
            .find_student_by_matricule(matricule.trim())?
            .ok_or_else(|| BursarError::NotFound("Élève non trouvé".into()))
    }

    /// Validate every row first; nothing is written unless all rows pass.
    pub fn import(&self, batch: Vec<StudentInput>) -> BursarResult<usize> {
        if batch.is_empty() {
            return Err(BursarError::validation("eleves", "Aucune donnée reçue"));
        }
        let now = self.clock.now();
        let students = batch
            .into_iter()
            .enumerate()
            .map(|(row, input)| {
                input.into_student(Uuid::new_v4(), now).map_err(|e| match e {
                    BursarError::Validation { field, message } => BursarError::Validation {
                        field,
                        message: format!("Ligne {}: {message}", row + 1),
                    },
                    other => other,
                })
            })
            .collect::<BursarResult<Vec<_>>>()?;

        self.store.insert_students(&students).map_err(|e| {
            if e.is_unique_violation_on(constraints::STUDENT_MATRICULE) {
                BursarError::Conflict("Matricule en double dans l'import.".into())
            } else {
                e.into()
            }
        })?;
        log::info!("imported {} students", students.len());
        Ok(students.len())
    }

    pub fn classes(&self) -> BursarResult<Vec<String>> {
        Ok(self.store.class_names()?)
    }

    pub fn headcount(&self, school_year: Option<&str>) -> BursarResult<Vec<ClassHeadcount>> {
        let year = school_year.map(str::trim).filter(|y| !y.is_empty());
        Ok(self
            .store
            .headcount(year)?
            .into_iter()
            .map(|(classe, count)| ClassHeadcount { classe, count })
            .collect())
    }
}

fn duplicate_matricule(m: &str) -> BursarError {
    BursarError::Conflict(format!("Le matricule {m} est déjà attribué."))
}

fn map_matricule_conflict(err: StoreError, matricule: Option<&str>) -> BursarError {
    if err.is_unique_violation_on(constraints::STUDENT_MATRICULE) {
        duplicate_matricule(matricule.unwrap_or_default())
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    fn directory() -> Directory {
        Directory::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    fn input(nom: &str, prenom: &str, classe: &str, matricule: Option<&str>) -> StudentInput {
        StudentInput {
            last_name: Some(nom.into()),
            first_name: Some(prenom.into()),
            sex: Some("F".into()),
            class_name: Some(classe.into()),
            school_year: Some("2024-2025".into()),
            matricule: matricule.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn test_crud_cycle() {
        let dir = directory();
        let s = dir.create(input("AGBO", "Reine", "CE1", Some("M001"))).unwrap();
        assert_eq!(dir.get(s.id).unwrap().last_name, "AGBO");

        let patch = StudentInput {
            class_name: Some("CE2".into()),
            ..Default::default()
        };
        assert_eq!(dir.update(s.id, patch).unwrap().class_name, "CE2");

        dir.delete(s.id).unwrap();
        assert!(matches!(dir.get(s.id), Err(BursarError::NotFound(_))));
        assert!(matches!(dir.delete(s.id), Err(BursarError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_matricule_is_conflict() {
        let dir = directory();
        dir.create(input("AGBO", "Reine", "CE1", Some("M001"))).unwrap();
        let err = dir.create(input("ZINSOU", "Luc", "CE1", Some("M001"))).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_search_blank_and_case_insensitive() {
        let dir = directory();
        dir.create(input("AGBO", "Reine", "CE1", None)).unwrap();
        assert!(dir.search("   ").unwrap().is_empty());
        assert_eq!(dir.search("agb").unwrap().len(), 1);
        assert_eq!(dir.search("REI").unwrap().len(), 1);
    }

    #[test]
    fn test_search_in_class_unique_flag() {
        let dir = directory();
        dir.create(input("AGBO", "Reine", "CE1", None)).unwrap();
        dir.create(input("AGBO", "Marc", "CE1", None)).unwrap();
        dir.create(input("AGBO", "Paul", "CM1", None)).unwrap();

        match dir
            .search_in_class(Some("CE1"), Some("2024-2025"), Some("reine"))
            .unwrap()
        {
            ClassSearch::Unique { unique, eleve } => {
                assert!(unique);
                assert_eq!(eleve.first_name, "Reine");
            }
            other => panic!("expected unique match, got {other:?}"),
        }
        match dir
            .search_in_class(Some("CE1"), Some("2024-2025"), Some("agbo"))
            .unwrap()
        {
            ClassSearch::Several { unique, eleves } => {
                assert!(!unique);
                assert_eq!(eleves.len(), 2);
            }
            other => panic!("expected several matches, got {other:?}"),
        }
        assert!(dir.search_in_class(Some("CE1"), None, Some("agbo")).is_err());
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let dir = directory();
        let mut bad = input("B", "b", "CE1", None);
        bad.sex = None;
        let err = dir
            .import(vec![input("A", "a", "CE1", None), bad])
            .unwrap_err();
        assert!(err.public_message().starts_with("Ligne 2"));
        assert!(dir.classes().unwrap().is_empty());

        assert_eq!(
            dir.import(vec![input("A", "a", "CE1", None), input("C", "c", "CP", None)])
                .unwrap(),
            2
        );
        assert_eq!(dir.classes().unwrap(), vec!["CE1".to_string(), "CP".to_string()]);
        assert!(dir.import(Vec::new()).is_err());
    }

    #[test]
    fn test_list_class_sorted_and_headcount() {
        let dir = directory();
        dir.create(input("ZOSSOU", "Ana", "CE1", None)).unwrap();
        dir.create(input("AGBO", "Zoe", "CE1", None)).unwrap();
        dir.create(input("AGBO", "Ali", "CE1", None)).unwrap();
        dir.create(input("DOSSA", "Eve", "CP", None)).unwrap();

        let names: Vec<_> = dir
            .list_class("CE1")
            .unwrap()
            .into_iter()
            .map(|s| s.display_name())
            .collect();
        assert_eq!(names, vec!["AGBO Ali", "AGBO Zoe", "ZOSSOU Ana"]);

        let counts = dir.headcount(Some("2024-2025")).unwrap();
        assert_eq!(counts[0].classe, "CE1");
        assert_eq!(counts[0].count, 3);
        assert_eq!(counts[1].count, 1);
        assert!(dir.headcount(Some("2023-2024")).unwrap().is_empty());
    }

    #[test]
    fn test_find_by_matricule() {
        let dir = directory();
        dir.create(input("AGBO", "Reine", "CE1", Some("M42"))).unwrap();
        assert_eq!(dir.find_by_matricule("M42").unwrap().first_name, "Reine");
        assert!(matches!(
            dir.find_by_matricule("M43"),
            Err(BursarError::NotFound(_))
        ));
    }
}

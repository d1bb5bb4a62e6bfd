use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An issued school-attendance certificate. Append-only: once persisted a
/// record is never edited. Student details are copied at issue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    #[serde(rename = "numeroCertificat")]
    pub code: String,
    #[serde(rename = "eleve", default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<Uuid>,
    #[serde(rename = "nomEleve")]
    pub student_name: String,
    #[serde(rename = "classe")]
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matricule: Option<String>,
    /// `DD/MM/YYYY`, empty when the submitted date was unreadable.
    #[serde(rename = "dateFirstInscription")]
    pub first_enrollment_date: String,
    /// `DD/MM/YYYY` of the issuance day.
    #[serde(rename = "dateDelivrance")]
    pub delivery_date: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Data submitted to issue a certificate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateRequest {
    #[serde(rename = "eleve", default)]
    pub student_id: Option<Uuid>,
    #[serde(rename = "nom", default)]
    pub last_name: Option<String>,
    #[serde(rename = "prenom", default)]
    pub first_name: Option<String>,
    #[serde(rename = "classe", default)]
    pub class_name: Option<String>,
    #[serde(rename = "anneeScolaire", default)]
    pub school_year: Option<String>,
    #[serde(default)]
    pub matricule: Option<String>,
    #[serde(rename = "sexe", default)]
    pub sex: Option<String>,
    #[serde(rename = "dateNaissance", default)]
    pub birth_date: Option<String>,
    #[serde(rename = "lieuNaissance", default)]
    pub birth_place: Option<String>,
    #[serde(rename = "dateInscription", default)]
    pub enrollment_date: Option<String>,
}

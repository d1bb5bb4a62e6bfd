//! School-attendance certificates: append-only registry keyed by a unique code.

use crate::clock::{Clock, LocalDay};
use crate::config::{IdentifierConfig, LedgerConfig};
use crate::error::{BursarError, BursarResult};
use crate::ident::CodeGenerator;
use crate::model::{Certificate, CertificateRequest, Sex};
use crate::report::DocumentRenderer;
use crate::store::{constraints, Store};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

const HISTORY_LIMIT: usize = 50;

static DISPLAY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("display date pattern compiles"));

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Render a user-supplied date as DD/MM/YYYY.
///
/// DD/MM/YYYY is returned untouched, ISO-like dates are converted, and
/// anything unrecognised becomes an empty string.
pub fn format_display_date(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return String::new();
    };
    if DISPLAY_DATE.is_match(raw) {
        return raw.to_string();
    }
    parse_date(raw)
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        })
}

/// What the certificate template prints, beyond the stored record.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateDocument {
    pub certificate: Certificate,
    pub nom: String,
    pub prenom: String,
    pub sexe: Option<Sex>,
    #[serde(rename = "dateNaissance")]
    pub date_naissance: String,
    #[serde(rename = "lieuNaissance")]
    pub lieu_naissance: String,
    #[serde(rename = "anneeScolaire")]
    pub annee_scolaire: String,
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub pdf: Vec<u8>,
}

pub struct CertificateRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    renderer: Arc<dyn DocumentRenderer>,
    codes: CodeGenerator,
    local: LocalDay,
}

impl CertificateRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        renderer: Arc<dyn DocumentRenderer>,
        identifiers: &IdentifierConfig,
        ledger: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            renderer,
            codes: CodeGenerator::from_config(identifiers),
            local: LocalDay::new(ledger.utc_offset_minutes),
        }
    }

    /// Persist a certificate, then render it.
    ///
    /// The record is kept even when rendering fails.
    pub fn issue(&self, request: CertificateRequest) -> BursarResult<IssuedCertificate> {
        let document = self.prepare(request)?;
        let mut certificate = document.certificate.clone();

        if let Err(e) = self.store.insert_certificate(&certificate) {
            if !e.is_unique_violation_on(constraints::CERTIFICATE_CODE) {
                return Err(e.into());
            }
            // Lost a race on the code; one more draw.
            #[cfg(feature = "metrics")]
            METRICS.record_conflict("certificat");
            log::warn!("certificate code {} taken at insert, retrying", certificate.code);
            certificate.code = self.next_code()?;
            self.store.insert_certificate(&certificate)?;
        }

        #[cfg(feature = "metrics")]
        METRICS.record_certificate();
        log::info!(
            "certificate {} issued for {}",
            certificate.code,
            certificate.student_name
        );

        let document = CertificateDocument {
            certificate: certificate.clone(),
            ..document
        };
        let pdf = self.renderer.certificate(&document).map_err(|e| {
            log::error!("certificate {} stored but not rendered: {e}", certificate.code);
            BursarError::from(e)
        })?;
        Ok(IssuedCertificate { certificate, pdf })
    }

    fn next_code(&self) -> BursarResult<String> {
        self.codes
            .generate(|code| Ok(self.store.certificate_code_taken(code)?))
    }

    fn prepare(&self, mut request: CertificateRequest) -> BursarResult<CertificateDocument> {
        if let Some(id) = request.student_id {
            if let Some(student) = self.store.get_student(id)? {
                request.last_name.get_or_insert(student.last_name);
                request.first_name.get_or_insert(student.first_name);
                request.class_name.get_or_insert(student.class_name);
                request.school_year.get_or_insert(student.school_year);
                request.sex.get_or_insert(student.sex.as_str().to_string());
                if let Some(m) = student.matricule {
                    request.matricule.get_or_insert(m);
                }
                if let Some(d) = student.birth_date {
                    request.birth_date.get_or_insert(d);
                }
                if let Some(p) = student.birth_place {
                    request.birth_place.get_or_insert(p);
                }
            }
        }

        let text = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let (Some(nom), Some(prenom), Some(classe)) = (
            text(&request.last_name),
            text(&request.first_name),
            text(&request.class_name),
        ) else {
            return Err(BursarError::validation(
                "nom",
                "Nom, prénom et classe requis.",
            ));
        };

        let now = self.clock.now();
        let certificate = Certificate {
            id: Uuid::new_v4(),
            code: self.next_code()?,
            student_id: request.student_id,
            student_name: format!("{nom} {prenom}"),
            class_name: classe,
            matricule: text(&request.matricule),
            first_enrollment_date: format_display_date(request.enrollment_date.as_deref()),
            delivery_date: self.local.day_of(now).format("%d/%m/%Y").to_string(),
            created_at: now,
        };

        Ok(CertificateDocument {
            certificate,
            nom,
            prenom,
            sexe: request.sex.as_deref().and_then(Sex::parse),
            date_naissance: format_display_date(request.birth_date.as_deref()),
            lieu_naissance: text(&request.birth_place).unwrap_or_default(),
            annee_scolaire: text(&request.school_year).unwrap_or_default(),
        })
    }

    /// Latest certificates, newest first.
    pub fn history(&self) -> BursarResult<Vec<Certificate>> {
        Ok(self.store.recent_certificates(HISTORY_LIMIT)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_date_passthrough() {
        assert_eq!(format_display_date(Some("05/09/2016")), "05/09/2016");
    }

    #[test]
    fn test_iso_dates_are_converted() {
        assert_eq!(format_display_date(Some("2016-09-05")), "05/09/2016");
        assert_eq!(format_display_date(Some("2016-09-05T00:00:00Z")), "05/09/2016");
        assert_eq!(format_display_date(Some("2016-09-05T10:30:00.000")), "05/09/2016");
        assert_eq!(format_display_date(Some("2016/09/05")), "05/09/2016");
    }

    #[test]
    fn test_garbage_becomes_empty() {
        assert_eq!(format_display_date(Some("hier")), "");
        assert_eq!(format_display_date(Some("2016-13-45")), "");
        assert_eq!(format_display_date(Some("  ")), "");
        assert_eq!(format_display_date(None), "");
    }
}

//! Document rendering.
//!
//! Services hand structured data to a [`DocumentRenderer`] and get bytes
//! back. [`PdfRenderer`] is the built-in implementation: A4 pages, the two
//! standard Helvetica faces, and tables whose rows grow with their content
//! and whose header is repeated after every page break.

mod documents;
pub mod pdf;
pub mod table;

pub use documents::PdfRenderer;

use crate::certificates::CertificateDocument;
use crate::directory::ClassRoster;
use crate::ledger::DailyReport;
use crate::reconciliation::Statement;
use rust_decimal::Decimal;
use std::fmt;

#[derive(Debug)]
pub enum RenderError {
    /// Text or layout the renderer cannot express
    Layout(String),
    /// Renderer-specific failure
    Backend(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Layout(msg) => write!(f, "layout error: {msg}"),
            RenderError::Backend(msg) => write!(f, "renderer error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

pub type RenderResult = Result<Vec<u8>, RenderError>;

pub trait DocumentRenderer: Send + Sync {
    fn certificate(&self, document: &CertificateDocument) -> RenderResult;
    fn daily_report(&self, report: &DailyReport) -> RenderResult;
    fn statement(&self, statement: &Statement) -> RenderResult;
    fn class_roster(&self, roster: &ClassRoster) -> RenderResult;
}

/// `25 000 FCFA`: integer part grouped by thousands with spaces, decimals
/// kept only when non-zero.
pub fn format_fcfa(amount: Decimal) -> String {
    format!("{} FCFA", format_amount(amount))
}

pub fn format_amount(amount: Decimal) -> String {
    let normalized = amount.round_dp(2).normalize();
    let text = normalized.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text, None),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(*c);
    }

    let sign = if normalized.is_sign_negative() && !normalized.is_zero() {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(f) => format!("{sign}{grouped},{f}"),
        None => format!("{sign}{grouped}"),
    }
}

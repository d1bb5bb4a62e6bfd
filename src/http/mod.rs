//! JSON API.
//!
//! [`router::route`] is a pure function from [`ApiRequest`] to
//! [`ApiResponse`]; [`service::BursarService`] adapts it to `may_minihttp`.

mod handlers;
pub mod router;
pub mod service;

pub use router::route;
pub use service::BursarService;

use crate::error::BursarError;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Other,
}

impl Method {
    pub fn parse(s: &str) -> Self {
        match s {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            _ => Method::Other,
        }
    }
}

/// Transport-independent request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path without the query string, percent-decoded per segment by the router.
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// Split `target` (`/path?query`) into path and decoded query pairs.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, parse_query(q)),
            None => (target, HashMap::new()),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            authorization: None,
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {token}"));
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        self.body = serde_json::to_vec(body).unwrap_or_default();
        self.content_type = Some("application/json".to_string());
        self
    }

    /// Query parameter, trimmed, with blanks treated as absent.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Pdf,
    Text,
}

impl ContentType {
    pub fn header(self) -> &'static str {
        match self {
            ContentType::Json => "Content-Type: application/json; charset=utf-8",
            ContentType::Pdf => "Content-Type: application/pdf",
            ContentType::Text => "Content-Type: text/plain; version=0.0.4; charset=utf-8",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: ContentType,
    /// Full `Content-Disposition` header line for downloads.
    pub disposition: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: ContentType::Json,
                disposition: None,
                body,
            },
            Err(e) => Self::error(&BursarError::Internal(format!("serialize response: {e}"))),
        }
    }

    pub fn ok<T: Serialize>(value: &T) -> Self {
        Self::json(200, value)
    }

    pub fn created<T: Serialize>(value: &T) -> Self {
        Self::json(201, value)
    }

    /// PDF download saved as `filename`.
    pub fn pdf(bytes: Vec<u8>, filename: &str) -> Self {
        Self {
            status: 200,
            content_type: ContentType::Pdf,
            disposition: Some(format!(
                "Content-Disposition: attachment; filename=\"{filename}\""
            )),
            body: bytes,
        }
    }

    pub fn error(err: &BursarError) -> Self {
        let (status, _) = err.status();
        if status >= 500 {
            log::error!("{err}");
        }
        let body = serde_json::json!({ "error": err.public_message() });
        Self {
            status,
            content_type: ContentType::Json,
            disposition: None,
            body: serde_json::to_vec(&body).unwrap_or_default(),
        }
    }

    /// Body parsed as JSON; test helper for callers of [`route`].
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

/// Decode a query component: `%XX` escapes, and `+` as space.
pub fn percent_decode(input: &str) -> String {
    decode(input, true)
}

/// Decode a path segment, where `+` is literal.
pub fn decode_segment(input: &str) -> String {
    decode(input, false)
}

/// Malformed escapes are kept as-is.
fn decode(input: &str, plus_as_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' if plus_as_space => out.push(b' '),
            b'%' => match (bytes.get(i + 1).and_then(hex), bytes.get(i + 2).and_then(hex)) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: &u8) -> Option<u8> {
    (*b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("CE1"), "CE1");
        assert_eq!(percent_decode("Maternelle%201"), "Maternelle 1");
        assert_eq!(percent_decode("r%C3%A9inscription+2025"), "réinscription 2025");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(decode_segment("CE1+bis"), "CE1+bis");
    }

    #[test]
    fn test_request_splits_query() {
        let req = ApiRequest::new(Method::Get, "/api/eleves/search?q=agbo&annee=&x");
        assert_eq!(req.path, "/api/eleves/search");
        assert_eq!(req.param("q"), Some("agbo"));
        assert_eq!(req.param("annee"), None);
        assert_eq!(req.param("missing"), None);
    }

    #[test]
    fn test_pdf_names_the_attachment() {
        let res = ApiResponse::pdf(b"%PDF".to_vec(), "certificat_AB12CD34EF.pdf");
        assert_eq!(
            res.disposition.as_deref(),
            Some("Content-Disposition: attachment; filename=\"certificat_AB12CD34EF.pdf\"")
        );
    }

    #[test]
    fn test_error_body_hides_internal_detail() {
        let res = ApiResponse::error(&BursarError::Internal("connection refused".into()));
        assert_eq!(res.status, 500);
        assert_eq!(res.json_body()["error"], "Erreur serveur");
    }
}

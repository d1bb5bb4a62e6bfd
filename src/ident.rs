//! Human-readable identifiers: transaction references and certificate codes.

use crate::config::IdentifierConfig;
use crate::error::{BursarError, BursarResult};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Issues `TRX<millis>` references.
///
/// References are strictly increasing within a process: when two are issued
/// in the same millisecond the second one is bumped by one.
#[derive(Debug)]
pub struct ReferenceGenerator {
    prefix: String,
    last: AtomicU64,
}

impl ReferenceGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self, now: DateTime<Utc>) -> String {
        let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_ms.max(last + 1))
            })
            .unwrap_or(now_ms);
        format!("{}{}", self.prefix, now_ms.max(previous + 1))
    }
}

/// Draws fixed-length codes from `A-Z0-9`.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    length: usize,
    max_attempts: usize,
}

impl CodeGenerator {
    pub fn new(length: usize, max_attempts: usize) -> Self {
        Self {
            length: length.max(1),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &IdentifierConfig) -> Self {
        Self::new(config.certificate_code_length, config.max_attempts)
    }

    pub fn draw(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    /// Draw until `is_taken` reports a free code, at most `max_attempts` times.
    pub fn generate<F>(&self, mut is_taken: F) -> BursarResult<String>
    where
        F: FnMut(&str) -> BursarResult<bool>,
    {
        for attempt in 1..=self.max_attempts {
            let code = self.draw();
            if !is_taken(&code)? {
                return Ok(code);
            }
            log::warn!("certificate code collision on attempt {attempt}");
        }
        Err(BursarError::Internal(format!(
            "no free certificate code after {} attempts",
            self.max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_reference_format() {
        let gen = ReferenceGenerator::new("TRX");
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(gen.next(at), format!("TRX{}", at.timestamp_millis()));
    }

    #[test]
    fn test_same_millisecond_references_differ() {
        let gen = ReferenceGenerator::new("TRX");
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let a = gen.next(at);
        let b = gen.next(at);
        assert_ne!(a, b);
        assert_eq!(b, format!("TRX{}", at.timestamp_millis() + 1));
    }

    #[test]
    fn test_references_unique_across_threads() {
        let gen = Arc::new(ReferenceGenerator::new("TRX"));
        let at = Utc::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gen = Arc::clone(&gen);
                std::thread::spawn(move || (0..500).map(|_| gen.next(at)).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for r in h.join().unwrap() {
                assert!(seen.insert(r));
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_code_shape() {
        let code = CodeGenerator::new(10, 16).draw();
        assert_eq!(code.len(), 10);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_retries_until_free() {
        let gen = CodeGenerator::new(10, 16);
        let mut calls = 0;
        let code = gen
            .generate(|_| {
                calls += 1;
                Ok(calls < 3)
            })
            .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(code.len(), 10);
    }

    #[test]
    fn test_generate_gives_up_after_max_attempts() {
        let gen = CodeGenerator::new(10, 4);
        let mut calls = 0;
        let err = gen
            .generate(|_| {
                calls += 1;
                Ok(true)
            })
            .unwrap_err();
        assert_eq!(calls, 4);
        assert!(matches!(err, BursarError::Internal(_)));
    }
}

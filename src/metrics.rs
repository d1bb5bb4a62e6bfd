//! Prometheus metrics and tracing span helpers.
//!
//! Both halves are feature-gated: `metrics` pulls in the OpenTelemetry
//! Prometheus exporter, `tracing` pulls in span helpers used around SQL
//! statements and HTTP requests.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{BursarMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<BursarMetrics> = Lazy::new(BursarMetrics::init);

    pub struct BursarMetrics {
        registry: Registry,
        _provider: SdkMeterProvider,
        pub transactions_recorded: Counter<u64>,
        pub certificates_issued: Counter<u64>,
        pub conflicts: Counter<u64>,
        pub query_errors: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub requests: Counter<u64>,
    }

    impl BursarMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .expect("failed to build prometheus exporter");
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            let meter = provider.meter("bursar");

            let transactions_recorded = meter
                .u64_counter("bursar_transactions_recorded_total")
                .with_description("Ledger transactions persisted, by kind")
                .build();

            let certificates_issued = meter
                .u64_counter("bursar_certificates_issued_total")
                .with_description("Certificates persisted to the registry")
                .build();

            let conflicts = meter
                .u64_counter("bursar_conflicts_total")
                .with_description("Uniqueness conflicts surfaced to callers")
                .build();

            let query_errors = meter
                .u64_counter("bursar_query_errors_total")
                .with_description("Failed database statements")
                .build();

            let query_duration = meter
                .f64_histogram("bursar_query_duration_seconds")
                .with_description("Duration of database statements")
                .build();

            let requests = meter
                .u64_counter("bursar_http_requests_total")
                .with_description("HTTP requests served, by status class")
                .build();

            Self {
                registry,
                _provider: provider,
                transactions_recorded,
                certificates_issued,
                conflicts,
                query_errors,
                query_duration,
                requests,
            }
        }

        pub fn record_transaction(&self, kind: &'static str) {
            self.transactions_recorded
                .add(1, &[KeyValue::new("kind", kind)]);
        }

        pub fn record_certificate(&self) {
            self.certificates_issued.add(1, &[]);
        }

        pub fn record_conflict(&self, what: &'static str) {
            self.conflicts.add(1, &[KeyValue::new("on", what)]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors.add(1, &[]);
        }

        pub fn record_request(&self, status: u16) {
            let class = match status {
                200..=299 => "2xx",
                400..=499 => "4xx",
                500..=599 => "5xx",
                _ => "other",
            };
            self.requests.add(1, &[KeyValue::new("class", class)]);
        }

        /// Current metrics in the Prometheus text exposition format.
        pub fn render(&self) -> Vec<u8> {
            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
                log::warn!("failed to encode metrics: {e}");
            }
            buffer
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    /// Span wrapping a single SQL statement. Only the leading keyword is recorded.
    pub fn execute_query_span(query: &str) -> Span {
        let verb = query.split_whitespace().next().unwrap_or("");
        tracing::debug_span!("db.query", statement = %verb)
    }

    pub fn connect_span() -> Span {
        tracing::info_span!("db.connect")
    }

    /// Span wrapping one HTTP request.
    pub fn request_span(method: &str, path: &str) -> Span {
        tracing::info_span!("http.request", method = %method, path = %path)
    }

    pub fn migration_span(version: i64) -> Span {
        tracing::info_span!("migration.apply", version)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::METRICS;

    #[test]
    fn test_render_contains_recorded_counter() {
        METRICS.record_transaction("entree");
        METRICS.record_conflict("recu");
        let text = String::from_utf8(METRICS.render()).expect("utf-8 exposition");
        assert!(text.contains("bursar_transactions_recorded_total"));
    }
}

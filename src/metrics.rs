//! Query instrumentation.
//!
//! With feature `metrics`, [`METRICS`] holds OpenTelemetry instruments
//! registered on the global meter provider; the application installs the
//! exporter. With feature `tracing`, [`tracing_helpers`] builds the spans
//! wrapped around executed statements and transaction boundaries.

#[cfg(feature = "metrics")]
pub use otel::{TetherMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use crate::fetch::FetchMode;
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
        KeyValue,
    };

    pub static METRICS: Lazy<TetherMetrics> = Lazy::new(TetherMetrics::init);

    pub struct TetherMetrics {
        pub queries_total: Counter<u64>,
        pub lazy_loads_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
    }

    impl TetherMetrics {
        pub fn init() -> Self {
            let meter = global::meter("tether");

            let queries_total = meter
                .u64_counter("tether_queries_total")
                .with_description("Total statements executed")
                .build();

            let lazy_loads_total = meter
                .u64_counter("tether_lazy_loads_total")
                .with_description("Deferred property resolutions that hit the database")
                .build();

            let query_duration = meter
                .f64_histogram("tether_query_duration_seconds")
                .with_description("Duration of statements")
                .build();

            Self {
                queries_total,
                lazy_loads_total,
                query_duration,
            }
        }

        pub fn record_query(&self, elapsed: std::time::Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_lazy_load(&self, class: &str, mode: FetchMode) {
            self.lazy_loads_total.add(
                1,
                &[
                    KeyValue::new("class", class.to_string()),
                    KeyValue::new("mode", mode.to_string()),
                ],
            );
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{debug_span, Span};

    /// Span around one executed statement
    pub fn query_span(sql: &str, param_count: usize) -> Span {
        debug_span!("tether.query", db.statement = sql, db.params = param_count)
    }

    pub fn begin_transaction_span(identifier: &str) -> Span {
        debug_span!("tether.transaction.begin", transaction = identifier)
    }

    pub fn commit_transaction_span(identifier: &str) -> Span {
        debug_span!("tether.transaction.commit", transaction = identifier)
    }

    pub fn rollback_transaction_span(identifier: &str) -> Span {
        debug_span!("tether.transaction.rollback", transaction = identifier)
    }
}

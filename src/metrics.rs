//! Prometheus metrics and tracing spans for query and group execution.
//!
//! Instruments are created once in [`METRICS`] on an OpenTelemetry meter provider
//! whose reader is the Prometheus exporter; [`QueryMetrics::render`] returns the
//! text exposition format for a scrape endpoint owned by the application.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics::SdkMeterProvider;
#[cfg(feature = "metrics")]
use prometheus::{Encoder, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::time::Duration;

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<QueryMetrics> = Lazy::new(QueryMetrics::init);

#[cfg(feature = "metrics")]
pub struct QueryMetrics {
    pub registry: Registry,
    pub provider: SdkMeterProvider,
    pub queries_total: Counter<u64>,
    pub query_errors_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
    pub group_executions_total: Counter<u64>,
    pub group_items: Histogram<u64>,
    pub duplicate_rows_removed: Counter<u64>,
}

#[cfg(feature = "metrics")]
impl QueryMetrics {
    pub fn init() -> Self {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .expect("failed to build prometheus exporter");
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("querygroup");

        let queries_total = meter
            .u64_counter("querygroup_queries_total")
            .with_description("Total plans executed against a store")
            .build();

        let query_errors_total = meter
            .u64_counter("querygroup_query_errors_total")
            .with_description("Plans that failed in the store")
            .build();

        let query_duration = meter
            .f64_histogram("querygroup_query_duration_seconds")
            .with_description("Duration of store calls")
            .build();

        let group_executions_total = meter
            .u64_counter("querygroup_group_executions_total")
            .with_description("Total query group executions")
            .build();

        let group_items = meter
            .u64_histogram("querygroup_group_items")
            .with_description("Item plans per group execution")
            .build();

        let duplicate_rows_removed = meter
            .u64_counter("querygroup_duplicate_rows_removed_total")
            .with_description("Rows removed by group-level distinct")
            .build();

        Self {
            registry,
            provider,
            queries_total,
            query_errors_total,
            query_duration,
            group_executions_total,
            group_items,
            duplicate_rows_removed,
        }
    }

    pub fn record_query(&self, elapsed: Duration, ok: bool) {
        let status = KeyValue::new("status", if ok { "ok" } else { "error" });
        self.queries_total.add(1, &[status]);
        if !ok {
            self.query_errors_total.add(1, &[]);
        }
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_group(&self, items: usize, duplicates_removed: usize) {
        self.group_executions_total.add(1, &[]);
        self.group_items.record(items as u64, &[]);
        if duplicates_removed > 0 {
            self.duplicate_rows_removed.add(duplicates_removed as u64, &[]);
        }
    }

    /// Prometheus text exposition of every instrument.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            log::warn!("failed to encode metrics: {e}");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    //! Spans around plan and group execution.

    use tracing::{info_span, Span};

    pub fn execute_plan_span(entity: &str) -> Span {
        info_span!("querygroup.execute_plan", entity = entity)
    }

    pub fn group_span(entity: &str, items: usize) -> Span {
        info_span!("querygroup.execute_group", entity = entity, items = items)
    }

    pub fn group_item_span(index: usize) -> Span {
        info_span!("querygroup.group_item", index = index)
    }
}

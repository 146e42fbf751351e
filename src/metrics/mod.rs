/*!
 * In-memory metrics for the storefront API.
 *
 * Counters, gauges and histograms live in a global registry and are
 * exported in Prometheus text format at `/metrics`. There is no external
 * metrics backend; everything is process-local atomics.
 */

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Duration;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

#[derive(Debug, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Gauge {
    value: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set(&self, value: f64) {
        self.value.store(value as u64, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Relaxed) as f64
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum/count histogram. Values are truncated to whole units, so callers
/// observe durations in milliseconds rather than fractional seconds.
#[derive(Debug, Clone)]
pub struct Histogram {
    sum: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            sum: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn observe(&self, value: f64) {
        self.sum.fetch_add(value as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsRegistry {
    counters: Arc<DashMap<String, Counter>>,
    gauges: Arc<DashMap<String, Gauge>>,
    histograms: Arc<DashMap<String, Histogram>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            gauges: Arc::new(DashMap::new()),
            histograms: Arc::new(DashMap::new()),
        }
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(Gauge::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let mut output = String::new();

        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, counter.get()));
        }

        for entry in self.gauges.iter() {
            let (name, gauge) = entry.pair();
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{} {}\n", name, gauge.get()));
        }

        for entry in self.histograms.iter() {
            let (name, histogram) = entry.pair();
            output.push_str(&format!("# TYPE {} histogram\n", name));
            output.push_str(&format!("{}_count {}\n", name, histogram.get_count()));
            output.push_str(&format!("{}_sum {}\n", name, histogram.get_sum()));
        }

        Ok(output)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

// Request-level metrics
pub struct AppMetrics {
    pub requests_total: Counter,
    pub requests_duration_ms: Histogram,
    pub errors_total: Counter,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: METRICS.get_or_create_counter("http_requests_total"),
            requests_duration_ms: METRICS.get_or_create_histogram("http_request_duration_ms"),
            errors_total: METRICS.get_or_create_counter("errors_total"),
        }
    }

    pub fn record_request(&self, duration: Duration) {
        self.requests_total.inc();
        self.requests_duration_ms.observe(duration.as_millis() as f64);
    }

    pub fn record_error(&self) {
        self.errors_total.inc();
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// Storefront business metrics
pub struct BusinessMetrics {
    pub users_registered: Counter,
    pub logins_succeeded: Counter,
    pub logins_failed: Counter,
    pub password_resets_requested: Counter,
    pub password_resets_completed: Counter,
    pub carts_created: Counter,
    pub cart_items_added: Counter,
    pub orders_created: Counter,
    pub events_processed: Counter,
}

impl BusinessMetrics {
    pub fn new() -> Self {
        Self {
            users_registered: METRICS.get_or_create_counter("users_registered_total"),
            logins_succeeded: METRICS.get_or_create_counter("logins_succeeded_total"),
            logins_failed: METRICS.get_or_create_counter("logins_failed_total"),
            password_resets_requested: METRICS
                .get_or_create_counter("password_resets_requested_total"),
            password_resets_completed: METRICS
                .get_or_create_counter("password_resets_completed_total"),
            carts_created: METRICS.get_or_create_counter("carts_created_total"),
            cart_items_added: METRICS.get_or_create_counter("cart_items_added_total"),
            orders_created: METRICS.get_or_create_counter("orders_created_total"),
            events_processed: METRICS.get_or_create_counter("events_processed_total"),
        }
    }
}

impl Default for BusinessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// Global instances
lazy_static::lazy_static! {
    pub static ref APP_METRICS: AppMetrics = AppMetrics::new();
    pub static ref BUSINESS_METRICS: BusinessMetrics = BusinessMetrics::new();
}

// HTTP endpoint handler for the Prometheus text exposition
pub async fn metrics_handler() -> Result<String, MetricsError> {
    METRICS.export_metrics()
}

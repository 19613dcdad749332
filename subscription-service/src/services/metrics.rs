//! Prometheus metrics for subscription-service.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "subscription_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Subscription payment status writes
pub static PAYMENT_STATUS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Gateway calls by provider, operation and outcome
pub static GATEWAY_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Webhook events by type and outcome
pub static WEBHOOK_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    PAYMENT_STATUS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_payment_status_total",
                "Subscription payment status writes"
            ),
            &["status"]
        )
        .expect("Failed to register PAYMENT_STATUS_TOTAL")
    });

    GATEWAY_REQUESTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_gateway_requests_total",
                "Payment gateway requests"
            ),
            &["provider", "operation", "outcome"]
        )
        .expect("Failed to register GATEWAY_REQUESTS_TOTAL")
    });

    WEBHOOK_EVENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_webhook_events_total",
                "Card webhook events received"
            ),
            &["event", "outcome"]
        )
        .expect("Failed to register WEBHOOK_EVENTS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a payment status write.
pub fn record_payment_status(status: &str) {
    if let Some(counter) = PAYMENT_STATUS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

/// Record a gateway request outcome.
pub fn record_gateway_request(provider: &str, operation: &str, outcome: &str) {
    if let Some(counter) = GATEWAY_REQUESTS_TOTAL.get() {
        counter
            .with_label_values(&[provider, operation, outcome])
            .inc();
    }
}

/// Record a processed webhook event.
pub fn record_webhook_event(event: &str, outcome: &str) {
    if let Some(counter) = WEBHOOK_EVENTS_TOTAL.get() {
        counter.with_label_values(&[event, outcome]).inc();
    }
}

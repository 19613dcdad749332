//! Prometheus metrics for charges-service.

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
            "charges_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Charges created counter (per syndic)
pub static CHARGES_CREATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Resident payment state transitions
pub static PAYMENT_TRANSITIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Settlement recomputes by resulting status
pub static SETTLEMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    CHARGES_CREATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "charges_created_total",
                "Total charges created by syndic"
            ),
            &["syndic_id"]
        )
        .expect("Failed to register CHARGES_CREATED_TOTAL")
    });

    PAYMENT_TRANSITIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "charges_payment_transitions_total",
                "Resident payment state transitions"
            ),
            &["transition"]
        )
        .expect("Failed to register PAYMENT_TRANSITIONS_TOTAL")
    });

    SETTLEMENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "charges_settlements_total",
                "Settlement recomputes by resulting charge status"
            ),
            &["status"]
        )
        .expect("Failed to register SETTLEMENTS_TOTAL")
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

/// Record a created charge.
pub fn record_charge_created(syndic_id: &str) {
    if let Some(counter) = CHARGES_CREATED_TOTAL.get() {
        counter.with_label_values(&[syndic_id]).inc();
    }
}

/// Record a payment transition (created, confirmed, rejected).
pub fn record_payment_transition(transition: &str) {
    if let Some(counter) = PAYMENT_TRANSITIONS_TOTAL.get() {
        counter.with_label_values(&[transition]).inc();
    }
}

/// Record a settlement recompute.
pub fn record_settlement(status: &str) {
    if let Some(counter) = SETTLEMENTS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

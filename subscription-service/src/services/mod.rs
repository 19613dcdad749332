//! Service layer for subscription-service.

mod database;
mod metrics;

pub mod gateway;
pub mod lifecycle;
pub mod paypal;
pub mod stripe;

pub use database::Database;
pub use metrics::{
    get_metrics, init_metrics, record_gateway_request, record_payment_status, record_webhook_event,
    DB_QUERY_DURATION,
};

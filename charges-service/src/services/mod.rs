//! Service layer for charges-service.

mod database;
mod metrics;
pub mod settlement;

pub use database::Database;
pub use metrics::{
    get_metrics, init_metrics, record_charge_created, record_payment_transition,
    record_settlement,
};

//! HTTP handlers for charges-service.

pub mod charges;
pub mod health;
pub mod payments;

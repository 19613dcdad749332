//! HTTP handlers for subscription-service.

pub mod gateway;
pub mod health;
pub mod payments;
pub mod plans;
pub mod subscriptions;
pub mod webhooks;

//! Subscription Service
//!
//! Manages syndic subscription plans, the subscription lifecycle, and
//! subscription payments through card and PayPal gateways.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

//! Data models for subscription-service.

mod payment;
mod plan;
mod subscription;

pub use payment::{
    CreateSubscriptionPayment, SubscriptionPayment, SubscriptionPaymentMethod,
    SubscriptionPaymentStatus,
};
pub use plan::{CreatePlan, ListPlansFilter, SubscriptionPlan, UpdatePlan};
pub use subscription::{Subscription, SubscriptionStatus, SubscriptionView};

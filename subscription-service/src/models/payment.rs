//! Subscription payment model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a subscription payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPaymentMethod {
    Card,
    BankTransfer,
    Stripe,
    Paypal,
    Cash,
}

impl SubscriptionPaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPaymentMethod::Card => "card",
            SubscriptionPaymentMethod::BankTransfer => "bank_transfer",
            SubscriptionPaymentMethod::Stripe => "stripe",
            SubscriptionPaymentMethod::Paypal => "paypal",
            SubscriptionPaymentMethod::Cash => "cash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" => Some(SubscriptionPaymentMethod::Card),
            "bank_transfer" => Some(SubscriptionPaymentMethod::BankTransfer),
            "stripe" => Some(SubscriptionPaymentMethod::Stripe),
            "paypal" => Some(SubscriptionPaymentMethod::Paypal),
            "cash" => Some(SubscriptionPaymentMethod::Cash),
            _ => None,
        }
    }
}

/// Subscription payment status, mirroring provider intent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPaymentStatus {
    RequiresPaymentMethod,
    Pending,
    Processing,
    Completed,
    Failed,
    Canceled,
    Refunded,
    PartiallyRefunded,
}

impl SubscriptionPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPaymentStatus::RequiresPaymentMethod => "requires_payment_method",
            SubscriptionPaymentStatus::Pending => "pending",
            SubscriptionPaymentStatus::Processing => "processing",
            SubscriptionPaymentStatus::Completed => "completed",
            SubscriptionPaymentStatus::Failed => "failed",
            SubscriptionPaymentStatus::Canceled => "canceled",
            SubscriptionPaymentStatus::Refunded => "refunded",
            SubscriptionPaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "requires_payment_method" => SubscriptionPaymentStatus::RequiresPaymentMethod,
            "processing" => SubscriptionPaymentStatus::Processing,
            "completed" => SubscriptionPaymentStatus::Completed,
            "failed" => SubscriptionPaymentStatus::Failed,
            "canceled" => SubscriptionPaymentStatus::Canceled,
            "refunded" => SubscriptionPaymentStatus::Refunded,
            "partially_refunded" => SubscriptionPaymentStatus::PartiallyRefunded,
            _ => SubscriptionPaymentStatus::Pending,
        }
    }
}

/// A payment toward a syndic's subscription.
///
/// `provider_order_id` is the provider's checkout handle (PayPal order,
/// Stripe payment intent); `provider_transaction_id` is the settled
/// transaction written at capture. They are distinct fields and a capture
/// never overwrites the order id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionPayment {
    pub payment_id: Uuid,
    pub subscription_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub status: String,
    pub provider_order_id: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub provider_customer_id: Option<String>,
    pub receipt_url: Option<String>,
    pub amount_refunded: Decimal,
    pub metadata: serde_json::Value,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<Uuid>,
    pub payment_date: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl SubscriptionPayment {
    /// Refunds apply only to successfully settled payments that still have
    /// an unrefunded remainder.
    pub fn is_refundable(&self) -> bool {
        let status = SubscriptionPaymentStatus::from_string(&self.status);
        matches!(
            status,
            SubscriptionPaymentStatus::Completed | SubscriptionPaymentStatus::PartiallyRefunded
        ) && self.amount_refunded < self.amount
    }

    pub fn refundable_remainder(&self) -> Decimal {
        (self.amount - self.amount_refunded).max(Decimal::ZERO)
    }
}

/// Input for persisting a subscription payment.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionPayment {
    pub subscription_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: SubscriptionPaymentMethod,
    pub status: SubscriptionPaymentStatus,
    pub provider_order_id: Option<String>,
    pub provider_customer_id: Option<String>,
    pub metadata: serde_json::Value,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

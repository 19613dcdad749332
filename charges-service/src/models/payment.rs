//! Resident payment model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Method used for a resident payment. Residents settle charges out of
/// band; card flows exist only on the subscription side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }
}

/// Resident payment status. Confirmed and rejected are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidentPaymentStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl ResidentPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResidentPaymentStatus::Pending => "pending",
            ResidentPaymentStatus::Confirmed => "confirmed",
            ResidentPaymentStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "confirmed" => ResidentPaymentStatus::Confirmed,
            "rejected" => ResidentPaymentStatus::Rejected,
            _ => ResidentPaymentStatus::Pending,
        }
    }
}

/// A resident's payment against a charge.
///
/// The syndic is denormalized onto the record so confirm/reject ownership
/// checks never need a join back through building data.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResidentPayment {
    pub payment_id: Uuid,
    pub charge_id: Uuid,
    pub apartment_id: Uuid,
    pub resident_id: Uuid,
    pub syndic_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub status: String,
    pub reference: Option<String>,
    pub payment_proof: Option<String>,
    pub rib: Option<String>,
    pub notes: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a resident payment.
#[derive(Debug, Clone)]
pub struct CreateResidentPayment {
    pub charge_id: Uuid,
    pub resident_id: Uuid,
    pub amount: Option<Decimal>,
    pub payment_method: PaymentMethod,
    pub reference: Option<String>,
    pub payment_proof: Option<String>,
    pub rib: Option<String>,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

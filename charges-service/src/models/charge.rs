//! Charge model.
//!
//! A charge is the amount owed by a resident's apartment for a billing
//! period. `paid_amount` and `status` are derived from confirmed payments
//! and written only by the settlement engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Charge settlement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Unpaid => "unpaid",
            ChargeStatus::PartiallyPaid => "partially_paid",
            ChargeStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => ChargeStatus::Paid,
            "partially_paid" => ChargeStatus::PartiallyPaid,
            _ => ChargeStatus::Unpaid,
        }
    }
}

/// Charge against an apartment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Charge {
    pub charge_id: Uuid,
    pub apartment_id: Uuid,
    pub building_id: Uuid,
    pub syndic_id: Uuid,
    pub resident_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub status: String,
    pub due_date: NaiveDate,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Charge {
    /// Outstanding balance, floored at zero for over-confirmed charges.
    pub fn remaining_balance(&self) -> Decimal {
        let remaining = self.amount - self.paid_amount;
        if remaining < Decimal::ZERO {
            Decimal::ZERO
        } else {
            remaining
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == ChargeStatus::Paid.as_str()
    }
}

/// Input for creating a charge.
#[derive(Debug, Clone)]
pub struct CreateCharge {
    pub apartment_id: Uuid,
    pub building_id: Uuid,
    pub syndic_id: Uuid,
    pub resident_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

/// Filter parameters for listing charges.
#[derive(Debug, Clone, Default)]
pub struct ListChargesFilter {
    pub status: Option<ChargeStatus>,
    pub building_id: Option<Uuid>,
    pub apartment_id: Option<Uuid>,
    pub overdue_only: bool,
}

/// Aggregated charge statistics for a syndic.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeStatistics {
    pub total_charges: i64,
    pub paid: i64,
    pub unpaid: i64,
    pub partially_paid: i64,
    pub overdue: i64,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub unpaid_amount: Decimal,
    pub overdue_amount: Decimal,
    pub collection_rate: f64,
}

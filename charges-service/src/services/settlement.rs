//! Charge settlement engine.
//!
//! The only place allowed to mutate a charge's `paid_amount` and `status`.
//! Both are recomputed from the sum of confirmed payments, never trusted
//! from a cached counter, and the write touches only those two columns.
//!
//! Callers must invoke [`recompute_charge`] inside the same transaction as
//! the payment-status transition that triggered it, so a charge can never be
//! observed out of sync with a just-confirmed payment.

use crate::models::{Charge, ChargeStatus};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use uuid::Uuid;

/// Pure derivation of charge status from amounts.
///
/// Confirmed totals exceeding the nominal amount clamp at `Paid`; the excess
/// is a reporting anomaly, not a fault.
pub fn derive_status(amount: Decimal, paid_amount: Decimal) -> ChargeStatus {
    if paid_amount >= amount {
        ChargeStatus::Paid
    } else if paid_amount > Decimal::ZERO {
        ChargeStatus::PartiallyPaid
    } else {
        ChargeStatus::Unpaid
    }
}

/// Recompute `paid_amount` and `status` for one charge from its confirmed
/// payments. Runs on the caller's connection so it shares the caller's
/// transaction. The charge row is locked for the duration of the write.
pub async fn recompute_charge(
    conn: &mut PgConnection,
    charge_id: Uuid,
) -> Result<Charge, AppError> {
    let amount: Decimal =
        sqlx::query_scalar("SELECT amount FROM charges WHERE charge_id = $1 FOR UPDATE")
            .bind(charge_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Charge not found".to_string()))?;

    let confirmed_total: Decimal = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM resident_payments
        WHERE charge_id = $1 AND status = 'confirmed'
        "#,
    )
    .bind(charge_id)
    .fetch_one(&mut *conn)
    .await?;

    let status = derive_status(amount, confirmed_total);

    let charge = sqlx::query_as::<_, Charge>(
        r#"
        UPDATE charges
        SET paid_amount = $2, status = $3, updated_utc = NOW()
        WHERE charge_id = $1
        RETURNING charge_id, apartment_id, building_id, syndic_id, resident_id, description, amount, paid_amount, status, due_date, created_utc, updated_utc
        "#,
    )
    .bind(charge_id)
    .bind(confirmed_total)
    .bind(status.as_str())
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(
        charge_id = %charge_id,
        paid_amount = %confirmed_total,
        status = status.as_str(),
        "Charge settlement recomputed"
    );

    Ok(charge)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn zero_confirmed_payments_is_unpaid() {
        assert_eq!(derive_status(dec("500.00"), Decimal::ZERO), ChargeStatus::Unpaid);
    }

    #[test]
    fn partial_total_is_partially_paid() {
        assert_eq!(
            derive_status(dec("500.00"), dec("300.00")),
            ChargeStatus::PartiallyPaid
        );
        assert_eq!(
            derive_status(dec("500.00"), dec("0.01")),
            ChargeStatus::PartiallyPaid
        );
        assert_eq!(
            derive_status(dec("500.00"), dec("499.99")),
            ChargeStatus::PartiallyPaid
        );
    }

    #[test]
    fn exact_total_is_paid() {
        assert_eq!(derive_status(dec("500.00"), dec("500.00")), ChargeStatus::Paid);
    }

    #[test]
    fn over_confirmed_total_clamps_at_paid() {
        assert_eq!(derive_status(dec("500.00"), dec("650.00")), ChargeStatus::Paid);
    }
}

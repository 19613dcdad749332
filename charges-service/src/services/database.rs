//! Database service for charges-service.

use crate::models::{
    Charge, ChargeStatistics, CreateCharge, CreateResidentPayment, ListChargesFilter,
    ResidentPayment, ResidentPaymentStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::settlement;
use crate::services::{record_payment_transition, record_settlement};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const CHARGE_COLUMNS: &str = "charge_id, apartment_id, building_id, syndic_id, resident_id, description, amount, paid_amount, status, due_date, created_utc, updated_utc";
const PAYMENT_COLUMNS: &str = "payment_id, charge_id, apartment_id, resident_id, syndic_id, amount, payment_method, status, reference, payment_proof, rib, notes, paid_at, confirmed_at, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "charges-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Charge Operations
    // =========================================================================

    /// Create a new charge. New charges always start unpaid.
    #[instrument(skip(self, input), fields(syndic_id = %input.syndic_id))]
    pub async fn create_charge(&self, input: &CreateCharge) -> Result<Charge, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_charge"])
            .start_timer();

        if input.amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Charge amount must be greater than zero".to_string(),
            ));
        }

        let charge_id = Uuid::new_v4();
        let charge = sqlx::query_as::<_, Charge>(&format!(
            r#"
            INSERT INTO charges (charge_id, apartment_id, building_id, syndic_id, resident_id, description, amount, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {CHARGE_COLUMNS}
            "#,
        ))
        .bind(charge_id)
        .bind(input.apartment_id)
        .bind(input.building_id)
        .bind(input.syndic_id)
        .bind(input.resident_id)
        .bind(&input.description)
        .bind(input.amount)
        .bind(input.due_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create charge: {}", e)))?;

        timer.observe_duration();
        info!(charge_id = %charge.charge_id, amount = %charge.amount, "Charge created");

        Ok(charge)
    }

    /// Create charges for every apartment of a building in one transaction.
    /// Returns the number of charges created.
    #[instrument(skip(self, items), fields(syndic_id = %syndic_id, building_id = %building_id))]
    pub async fn bulk_create_charges(
        &self,
        syndic_id: Uuid,
        building_id: Uuid,
        description: &str,
        due_date: chrono::NaiveDate,
        items: &[(Uuid, Uuid, Decimal)],
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["bulk_create_charges"])
            .start_timer();

        if items.iter().any(|(_, _, amount)| *amount <= Decimal::ZERO) {
            return Err(AppError::Validation(
                "Charge amount must be greater than zero".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let mut created = 0u64;

        for (apartment_id, resident_id, amount) in items {
            sqlx::query(
                r#"
                INSERT INTO charges (charge_id, apartment_id, building_id, syndic_id, resident_id, description, amount, due_date)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(apartment_id)
            .bind(building_id)
            .bind(syndic_id)
            .bind(resident_id)
            .bind(description)
            .bind(amount)
            .bind(due_date)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create charge: {}", e)))?;
            created += 1;
        }

        tx.commit().await?;
        timer.observe_duration();
        info!(count = created, "Bulk charges created");

        Ok(created)
    }

    /// Get a charge by ID.
    #[instrument(skip(self), fields(charge_id = %charge_id))]
    pub async fn get_charge(&self, charge_id: Uuid) -> Result<Option<Charge>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_charge"])
            .start_timer();

        let charge = sqlx::query_as::<_, Charge>(&format!(
            "SELECT {CHARGE_COLUMNS} FROM charges WHERE charge_id = $1"
        ))
        .bind(charge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get charge: {}", e)))?;

        timer.observe_duration();

        Ok(charge)
    }

    /// List charges managed by a syndic.
    #[instrument(skip(self, filter), fields(syndic_id = %syndic_id))]
    pub async fn list_charges_for_syndic(
        &self,
        syndic_id: Uuid,
        filter: &ListChargesFilter,
    ) -> Result<Vec<Charge>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_charges_for_syndic"])
            .start_timer();

        let status_str = filter.status.map(|s| s.as_str().to_string());

        let charges = sqlx::query_as::<_, Charge>(&format!(
            r#"
            SELECT {CHARGE_COLUMNS}
            FROM charges
            WHERE syndic_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR building_id = $3)
              AND ($4::uuid IS NULL OR apartment_id = $4)
              AND ($5::bool = FALSE OR (status = 'unpaid' AND due_date < CURRENT_DATE))
            ORDER BY created_utc DESC
            "#,
        ))
        .bind(syndic_id)
        .bind(&status_str)
        .bind(filter.building_id)
        .bind(filter.apartment_id)
        .bind(filter.overdue_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list charges: {}", e)))?;

        timer.observe_duration();

        Ok(charges)
    }

    /// List charges across all apartments assigned to a resident.
    #[instrument(skip(self), fields(resident_id = %resident_id))]
    pub async fn list_charges_for_resident(
        &self,
        resident_id: Uuid,
    ) -> Result<Vec<Charge>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_charges_for_resident"])
            .start_timer();

        let charges = sqlx::query_as::<_, Charge>(&format!(
            "SELECT {CHARGE_COLUMNS} FROM charges WHERE resident_id = $1 ORDER BY due_date DESC"
        ))
        .bind(resident_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list charges: {}", e)))?;

        timer.observe_duration();

        Ok(charges)
    }

    /// Delete a charge. Refused once any payment references it.
    #[instrument(skip(self), fields(charge_id = %charge_id))]
    pub async fn delete_charge(&self, charge_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_charge"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let payment_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM resident_payments WHERE charge_id = $1")
                .bind(charge_id)
                .fetch_one(&mut *tx)
                .await?;

        if payment_count > 0 {
            return Err(AppError::InvalidState(
                "Cannot delete charge with existing payments".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM charges WHERE charge_id = $1")
            .bind(charge_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Charge not found".to_string()));
        }

        tx.commit().await?;
        timer.observe_duration();
        info!(charge_id = %charge_id, "Charge deleted");

        Ok(())
    }

    /// Aggregate charge statistics for a syndic.
    #[instrument(skip(self), fields(syndic_id = %syndic_id))]
    pub async fn charge_statistics(&self, syndic_id: Uuid) -> Result<ChargeStatistics, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["charge_statistics"])
            .start_timer();

        let row: (i64, i64, i64, i64, i64, Decimal, Decimal, Decimal, Decimal) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE status = 'paid'),
                       COUNT(*) FILTER (WHERE status = 'unpaid'),
                       COUNT(*) FILTER (WHERE status = 'partially_paid'),
                       COUNT(*) FILTER (WHERE status = 'unpaid' AND due_date < CURRENT_DATE),
                       COALESCE(SUM(amount), 0),
                       COALESCE(SUM(paid_amount), 0),
                       COALESCE(SUM(amount) FILTER (WHERE status = 'unpaid'), 0),
                       COALESCE(SUM(amount) FILTER (WHERE status = 'unpaid' AND due_date < CURRENT_DATE), 0)
                FROM charges
                WHERE syndic_id = $1
                "#,
            )
            .bind(syndic_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to compute statistics: {}", e)))?;

        timer.observe_duration();

        let (total_charges, paid, unpaid, partially_paid, overdue, total_amount, paid_amount, unpaid_amount, overdue_amount) =
            row;

        let collection_rate = if total_amount > Decimal::ZERO {
            let rate = paid_amount / total_amount * Decimal::from(100);
            rate.round_dp(1).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        Ok(ChargeStatistics {
            total_charges,
            paid,
            unpaid,
            partially_paid,
            overdue,
            total_amount,
            paid_amount,
            unpaid_amount,
            overdue_amount,
            collection_rate,
        })
    }

    // =========================================================================
    // Resident Payment Operations
    // =========================================================================

    /// Create a pending resident payment against a charge.
    ///
    /// The amount check against the remaining balance is advisory: the charge
    /// itself is not touched here, so several pending requests can coexist.
    /// Settlement at confirmation time is the sole source of truth.
    #[instrument(skip(self, input), fields(charge_id = %input.charge_id, resident_id = %input.resident_id))]
    pub async fn create_resident_payment(
        &self,
        input: &CreateResidentPayment,
    ) -> Result<(ResidentPayment, Decimal), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_resident_payment"])
            .start_timer();

        let charge = self
            .get_charge(input.charge_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Charge not found".to_string()))?;

        if charge.resident_id != input.resident_id {
            return Err(AppError::Ownership(
                "You do not have permission to pay this charge".to_string(),
            ));
        }

        if charge.is_paid() {
            return Err(AppError::Validation(
                "This charge is already fully paid".to_string(),
            ));
        }

        let remaining = charge.remaining_balance();
        // Omitted amount pays the whole remaining balance.
        let amount = input.amount.unwrap_or(remaining);

        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Payment amount must be greater than zero".to_string(),
            ));
        }
        if amount > remaining {
            return Err(AppError::Validation(
                "Payment exceeds remaining charge amount".to_string(),
            ));
        }

        let payment_id = Uuid::new_v4();
        let paid_at = input.paid_at.unwrap_or_else(Utc::now);

        let payment = sqlx::query_as::<_, ResidentPayment>(&format!(
            r#"
            INSERT INTO resident_payments (payment_id, charge_id, apartment_id, resident_id, syndic_id, amount, payment_method, status, reference, payment_proof, rib, notes, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, $10, $11, $12)
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(payment_id)
        .bind(charge.charge_id)
        .bind(charge.apartment_id)
        .bind(input.resident_id)
        .bind(charge.syndic_id)
        .bind(amount)
        .bind(input.payment_method.as_str())
        .bind(&input.reference)
        .bind(&input.payment_proof)
        .bind(&input.rib)
        .bind(&input.notes)
        .bind(paid_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create payment: {}", e)))?;

        timer.observe_duration();
        record_payment_transition("created");
        info!(payment_id = %payment.payment_id, amount = %amount, "Resident payment created");

        Ok((payment, remaining - amount))
    }

    /// Get a resident payment by ID.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Option<ResidentPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, ResidentPayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM resident_payments WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    /// Confirm a pending payment and resettle its charge in one transaction.
    ///
    /// The status transition is a conditional update, so two confirmations
    /// racing on the same payment serialize: one wins, the other sees the
    /// non-pending row and fails with an invalid-state error.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn confirm_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<(ResidentPayment, Charge), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["confirm_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let payment = sqlx::query_as::<_, ResidentPayment>(&format!(
            r#"
            UPDATE resident_payments
            SET status = 'confirmed', confirmed_at = NOW(), updated_utc = NOW()
            WHERE payment_id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to confirm payment: {}", e)))?;

        let payment = match payment {
            Some(p) => p,
            None => {
                return Err(self.pending_transition_error(payment_id).await?);
            }
        };

        let charge = settlement::recompute_charge(&mut tx, payment.charge_id).await?;
        tx.commit().await?;

        timer.observe_duration();
        record_payment_transition("confirmed");
        record_settlement(&charge.status);
        info!(
            payment_id = %payment_id,
            charge_id = %charge.charge_id,
            paid_amount = %charge.paid_amount,
            charge_status = %charge.status,
            "Payment confirmed and charge resettled"
        );

        Ok((payment, charge))
    }

    /// Reject a pending payment. The charge is never touched.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn reject_payment(&self, payment_id: Uuid) -> Result<ResidentPayment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reject_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, ResidentPayment>(&format!(
            r#"
            UPDATE resident_payments
            SET status = 'rejected', confirmed_at = NOW(), updated_utc = NOW()
            WHERE payment_id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to reject payment: {}", e)))?;

        let payment = match payment {
            Some(p) => p,
            None => {
                return Err(self.pending_transition_error(payment_id).await?);
            }
        };

        timer.observe_duration();
        record_payment_transition("rejected");
        info!(payment_id = %payment_id, "Payment rejected");

        Ok(payment)
    }

    /// Distinguish a missing payment from an illegal transition after a
    /// conditional update matched no row.
    async fn pending_transition_error(&self, payment_id: Uuid) -> Result<AppError, AppError> {
        let existing = self.get_payment(payment_id).await?;
        Ok(match existing {
            Some(p) => {
                let status = ResidentPaymentStatus::from_string(&p.status);
                AppError::InvalidState(format!(
                    "Only pending payments can be confirmed or rejected (current status: {})",
                    status.as_str()
                ))
            }
            None => AppError::NotFound("Payment not found".to_string()),
        })
    }

    /// List payments awaiting or processed by a syndic.
    #[instrument(skip(self), fields(syndic_id = %syndic_id))]
    pub async fn list_payments_for_syndic(
        &self,
        syndic_id: Uuid,
        status: Option<ResidentPaymentStatus>,
    ) -> Result<Vec<ResidentPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments_for_syndic"])
            .start_timer();

        let status_str = status.map(|s| s.as_str().to_string());

        let payments = sqlx::query_as::<_, ResidentPayment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM resident_payments
            WHERE syndic_id = $1
              AND ($2::varchar IS NULL OR status = $2)
            ORDER BY paid_at DESC
            "#,
        ))
        .bind(syndic_id)
        .bind(&status_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    /// List all payments made by a resident, across all apartments.
    #[instrument(skip(self), fields(resident_id = %resident_id))]
    pub async fn list_payments_for_resident(
        &self,
        resident_id: Uuid,
    ) -> Result<Vec<ResidentPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments_for_resident"])
            .start_timer();

        let payments = sqlx::query_as::<_, ResidentPayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM resident_payments WHERE resident_id = $1 ORDER BY paid_at DESC"
        ))
        .bind(resident_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }
}

//! Database service for subscription-service.

use crate::models::{
    CreatePlan, CreateSubscriptionPayment, ListPlansFilter, Subscription, SubscriptionPayment,
    SubscriptionPaymentStatus, SubscriptionPlan, SubscriptionStatus, UpdatePlan,
};
use crate::services::lifecycle;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::record_payment_status;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const PLAN_COLUMNS: &str = "plan_id, name, description, price, duration_days, max_buildings, max_apartments, is_active, created_utc, updated_utc";
const SUBSCRIPTION_COLUMNS: &str = "subscription_id, syndic_id, plan_id, start_date, end_date, status, auto_renew, created_utc, updated_utc";
const PAYMENT_COLUMNS: &str = "payment_id, subscription_id, amount, currency, payment_method, status, provider_order_id, provider_transaction_id, provider_customer_id, receipt_url, amount_refunded, metadata, reference, notes, processed_by, payment_date, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "subscription-service"))]
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
    // Plan Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_plan(&self, input: &CreatePlan) -> Result<SubscriptionPlan, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_plan"])
            .start_timer();

        if input.price <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Plan price must be greater than zero".to_string(),
            ));
        }
        if input.duration_days <= 0 {
            return Err(AppError::Validation(
                "Plan duration must be at least one day".to_string(),
            ));
        }

        let plan = sqlx::query_as::<_, SubscriptionPlan>(&format!(
            r#"
            INSERT INTO subscription_plans (plan_id, name, description, price, duration_days, max_buildings, max_apartments)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PLAN_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.duration_days)
        .bind(input.max_buildings)
        .bind(input.max_apartments)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create plan: {}", e)))?;

        timer.observe_duration();
        info!(plan_id = %plan.plan_id, "Subscription plan created");

        Ok(plan)
    }

    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Option<SubscriptionPlan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, SubscriptionPlan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE plan_id = $1"
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get plan: {}", e)))?;

        timer.observe_duration();

        Ok(plan)
    }

    #[instrument(skip(self, filter))]
    pub async fn list_plans(
        &self,
        filter: &ListPlansFilter,
    ) -> Result<Vec<SubscriptionPlan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_plans"])
            .start_timer();

        let name_pattern = filter.name_search.as_ref().map(|s| format!("%{}%", s));

        let plans = sqlx::query_as::<_, SubscriptionPlan>(&format!(
            r#"
            SELECT {PLAN_COLUMNS}
            FROM subscription_plans
            WHERE ($1::bool IS NULL OR is_active = $1)
              AND ($2::text IS NULL OR name ILIKE $2)
            ORDER BY price ASC
            "#,
        ))
        .bind(filter.is_active)
        .bind(&name_pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list plans: {}", e)))?;

        timer.observe_duration();

        Ok(plans)
    }

    /// Update a plan. Pricing and capacity fields are frozen while any
    /// active subscription references the plan.
    #[instrument(skip(self, update), fields(plan_id = %plan_id))]
    pub async fn update_plan(
        &self,
        plan_id: Uuid,
        update: &UpdatePlan,
    ) -> Result<SubscriptionPlan, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_plan"])
            .start_timer();

        if update.price.is_some_and(|p| p <= Decimal::ZERO) {
            return Err(AppError::Validation(
                "Plan price must be greater than zero".to_string(),
            ));
        }
        if update.duration_days.is_some_and(|d| d <= 0) {
            return Err(AppError::Validation(
                "Plan duration must be at least one day".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, SubscriptionPlan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE plan_id = $1 FOR UPDATE"
        ))
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        if update.touches_protected_fields(&current) {
            let active_subscriptions: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM subscriptions WHERE plan_id = $1 AND status = 'active'",
            )
            .bind(plan_id)
            .fetch_one(&mut *tx)
            .await?;

            if active_subscriptions > 0 {
                return Err(AppError::InvalidState(format!(
                    "Cannot change pricing fields while {} active subscriptions use this plan",
                    active_subscriptions
                )));
            }
        }

        let plan = sqlx::query_as::<_, SubscriptionPlan>(&format!(
            r#"
            UPDATE subscription_plans
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                duration_days = COALESCE($5, duration_days),
                max_buildings = COALESCE($6, max_buildings),
                max_apartments = COALESCE($7, max_apartments),
                updated_utc = NOW()
            WHERE plan_id = $1
            RETURNING {PLAN_COLUMNS}
            "#,
        ))
        .bind(plan_id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.price)
        .bind(update.duration_days)
        .bind(update.max_buildings)
        .bind(update.max_apartments)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.observe_duration();
        info!(plan_id = %plan_id, "Plan updated");

        Ok(plan)
    }

    #[instrument(skip(self), fields(plan_id = %plan_id, active = active))]
    pub async fn set_plan_active(
        &self,
        plan_id: Uuid,
        active: bool,
    ) -> Result<SubscriptionPlan, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_plan_active"])
            .start_timer();

        let plan = sqlx::query_as::<_, SubscriptionPlan>(&format!(
            r#"
            UPDATE subscription_plans
            SET is_active = $2, updated_utc = NOW()
            WHERE plan_id = $1
            RETURNING {PLAN_COLUMNS}
            "#,
        ))
        .bind(plan_id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to update plan: {}", e)))?
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        timer.observe_duration();

        Ok(plan)
    }

    /// Delete a plan. Refused while any subscription references it.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn delete_plan(&self, plan_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_plan"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let references: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE plan_id = $1")
                .bind(plan_id)
                .fetch_one(&mut *tx)
                .await?;

        if references > 0 {
            return Err(AppError::InvalidState(
                "Cannot delete a plan that subscriptions reference".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM subscription_plans WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Plan not found".to_string()));
        }

        tx.commit().await?;
        timer.observe_duration();
        info!(plan_id = %plan_id, "Plan deleted");

        Ok(())
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    #[instrument(skip(self), fields(syndic_id = %syndic_id))]
    pub async fn get_subscription_for_syndic(
        &self,
        syndic_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription_for_syndic"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE syndic_id = $1"
        ))
        .bind(syndic_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get subscription: {}", e)))?;

        timer.observe_duration();

        Ok(subscription)
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn get_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE subscription_id = $1"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get subscription: {}", e)))?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// Admin replacement path: upsert the syndic's subscription with an
    /// absolute period derived from the plan duration.
    #[instrument(skip(self), fields(syndic_id = %syndic_id, plan_id = %plan_id))]
    pub async fn assign_plan(
        &self,
        syndic_id: Uuid,
        plan_id: Uuid,
        start: Option<chrono::NaiveDate>,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["assign_plan"])
            .start_timer();

        let plan = self
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;
        if !plan.is_active {
            return Err(AppError::InvalidState(
                "Cannot assign an inactive plan".to_string(),
            ));
        }

        let today = Utc::now().date_naive();
        let (start_date, end_date) =
            lifecycle::assignment_period(start.unwrap_or(today), plan.duration_days);

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions (subscription_id, syndic_id, plan_id, start_date, end_date, status, auto_renew)
            VALUES ($1, $2, $3, $4, $5, 'active', FALSE)
            ON CONFLICT (syndic_id) DO UPDATE
            SET plan_id = EXCLUDED.plan_id,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                status = 'active',
                updated_utc = NOW()
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(syndic_id)
        .bind(plan_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to assign plan: {}", e)))?;

        timer.observe_duration();
        info!(
            subscription_id = %subscription.subscription_id,
            start = %start_date,
            end = %end_date,
            "Plan assigned"
        );

        Ok(subscription)
    }

    /// Renew a subscription: lapsed ones restart today, live ones continue
    /// the day after the current period ends.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn renew_subscription(
        &self,
        subscription_id: Uuid,
        duration_days: Option<i32>,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["renew_subscription"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE subscription_id = $1 FOR UPDATE"
        ))
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        let plan_duration: i32 =
            sqlx::query_scalar("SELECT duration_days FROM subscription_plans WHERE plan_id = $1")
                .bind(current.plan_id)
                .fetch_one(&mut *tx)
                .await?;
        let duration = duration_days.unwrap_or(plan_duration);
        if duration <= 0 {
            return Err(AppError::Validation(
                "Renewal duration must be at least one day".to_string(),
            ));
        }

        let today = Utc::now().date_naive();
        let lapsed = SubscriptionStatus::from_string(&current.status)
            == SubscriptionStatus::Expired
            || current.end_date < today;
        let start_date = if lapsed {
            today
        } else {
            lifecycle::renewal_start(current.end_date, today)
        };
        let (start_date, end_date) = lifecycle::assignment_period(start_date, duration);

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET start_date = $2, end_date = $3, status = 'active', updated_utc = NOW()
            WHERE subscription_id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#,
        ))
        .bind(subscription_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.observe_duration();
        info!(
            subscription_id = %subscription_id,
            start = %start_date,
            end = %end_date,
            "Subscription renewed"
        );

        Ok(subscription)
    }

    /// Direct status write. Cancelling also clears auto-renew.
    #[instrument(skip(self), fields(subscription_id = %subscription_id, status = status.as_str()))]
    pub async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_subscription_status"])
            .start_timer();

        let clear_auto_renew = status == SubscriptionStatus::Cancelled;

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET status = $2,
                auto_renew = CASE WHEN $3 THEN FALSE ELSE auto_renew END,
                updated_utc = NOW()
            WHERE subscription_id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#,
        ))
        .bind(subscription_id)
        .bind(status.as_str())
        .bind(clear_auto_renew)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to update subscription: {}", e)))?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        timer.observe_duration();
        info!(subscription_id = %subscription_id, status = status.as_str(), "Subscription status set");

        Ok(subscription)
    }

    /// Existing subscription for the syndic, or a lapsed placeholder created
    /// so payments have something to reference. Entitlement only arrives
    /// when a payment completes.
    #[instrument(skip(self), fields(syndic_id = %syndic_id, plan_id = %plan_id))]
    pub async fn ensure_subscription(
        &self,
        syndic_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Subscription, AppError> {
        if let Some(existing) = self.get_subscription_for_syndic(syndic_id).await? {
            return Ok(existing);
        }

        let today = Utc::now().date_naive();
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions (subscription_id, syndic_id, plan_id, start_date, end_date, status, auto_renew)
            VALUES ($1, $2, $3, $4, $4, 'expired', FALSE)
            ON CONFLICT (syndic_id) DO UPDATE SET updated_utc = NOW()
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(syndic_id)
        .bind(plan_id)
        .bind(today)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create subscription: {}", e)))?;

        Ok(subscription)
    }

    // =========================================================================
    // Subscription Payment Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(subscription_id = %input.subscription_id))]
    pub async fn create_subscription_payment(
        &self,
        input: &CreateSubscriptionPayment,
    ) -> Result<SubscriptionPayment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subscription_payment"])
            .start_timer();

        if input.amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Payment amount must be greater than zero".to_string(),
            ));
        }

        let payment = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            r#"
            INSERT INTO subscription_payments (payment_id, subscription_id, amount, currency, payment_method, status, provider_order_id, provider_customer_id, metadata, reference, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(input.subscription_id)
        .bind(input.amount)
        .bind(&input.currency)
        .bind(input.payment_method.as_str())
        .bind(input.status.as_str())
        .bind(&input.provider_order_id)
        .bind(&input.provider_customer_id)
        .bind(&input.metadata)
        .bind(&input.reference)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create payment: {}", e)))?;

        timer.observe_duration();
        record_payment_status(&payment.status);
        info!(payment_id = %payment.payment_id, status = %payment.status, "Subscription payment created");

        Ok(payment)
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn get_subscription_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<SubscriptionPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM subscription_payments WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    /// Look up a payment by the provider's checkout handle.
    #[instrument(skip(self), fields(provider_order_id = %provider_order_id))]
    pub async fn get_payment_by_provider_order(
        &self,
        provider_order_id: &str,
    ) -> Result<Option<SubscriptionPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment_by_provider_order"])
            .start_timer();

        let payment = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM subscription_payments WHERE provider_order_id = $1"
        ))
        .bind(provider_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    #[instrument(skip(self), fields(syndic_id = %syndic_id))]
    pub async fn list_payments_for_syndic(
        &self,
        syndic_id: Uuid,
        status: Option<SubscriptionPaymentStatus>,
    ) -> Result<Vec<SubscriptionPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments_for_syndic"])
            .start_timer();

        let status_str = status.map(|s| s.as_str().to_string());

        let payments = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            r#"
            SELECT p.{}
            FROM subscription_payments p
            JOIN subscriptions s ON s.subscription_id = p.subscription_id
            WHERE s.syndic_id = $1
              AND ($2::varchar IS NULL OR p.status = $2)
            ORDER BY p.payment_date DESC
            "#,
            PAYMENT_COLUMNS.replace(", ", ", p."),
        ))
        .bind(syndic_id)
        .bind(&status_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    /// Last-write-wins status and metadata write. No business validation at
    /// this layer; gated transitions use the dedicated methods.
    #[instrument(skip(self, metadata), fields(payment_id = %payment_id, status = status.as_str()))]
    pub async fn update_payment_status(
        &self,
        payment_id: Uuid,
        status: SubscriptionPaymentStatus,
        metadata: Option<serde_json::Value>,
    ) -> Result<SubscriptionPayment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_payment_status"])
            .start_timer();

        let payment = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            r#"
            UPDATE subscription_payments
            SET status = $2,
                metadata = metadata || COALESCE($3, '{{}}'::jsonb),
                updated_utc = NOW()
            WHERE payment_id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(payment_id)
        .bind(status.as_str())
        .bind(metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to update payment: {}", e)))?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        timer.observe_duration();
        record_payment_status(status.as_str());

        Ok(payment)
    }

    /// Complete a payment and apply its subscription effect in one
    /// transaction. Already-settled payments are an idempotent no-op, so
    /// at-least-once webhook delivery never extends a subscription twice.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn complete_payment(
        &self,
        payment_id: Uuid,
        provider_transaction_id: Option<&str>,
        receipt_url: Option<&str>,
        processed_by: Option<Uuid>,
    ) -> Result<(SubscriptionPayment, Subscription), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["complete_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let payment = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM subscription_payments WHERE payment_id = $1 FOR UPDATE"
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        let status = SubscriptionPaymentStatus::from_string(&payment.status);
        if matches!(
            status,
            SubscriptionPaymentStatus::Completed
                | SubscriptionPaymentStatus::Refunded
                | SubscriptionPaymentStatus::PartiallyRefunded
        ) {
            let subscription = sqlx::query_as::<_, Subscription>(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE subscription_id = $1"
            ))
            .bind(payment.subscription_id)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            info!(payment_id = %payment_id, status = %payment.status, "Payment already settled, no-op");
            return Ok((payment, subscription));
        }

        let payment = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            r#"
            UPDATE subscription_payments
            SET status = 'completed',
                provider_transaction_id = COALESCE($2, provider_transaction_id),
                receipt_url = COALESCE($3, receipt_url),
                processed_by = COALESCE($4, processed_by),
                payment_date = NOW(),
                updated_utc = NOW()
            WHERE payment_id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(payment_id)
        .bind(provider_transaction_id)
        .bind(receipt_url)
        .bind(processed_by)
        .fetch_one(&mut *tx)
        .await?;

        let plan_id = payment
            .metadata
            .get("plan_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        let subscription =
            apply_completed_payment(&mut tx, payment.subscription_id, plan_id).await?;

        tx.commit().await?;
        timer.observe_duration();
        record_payment_status("completed");
        info!(
            payment_id = %payment_id,
            subscription_id = %subscription.subscription_id,
            end_date = %subscription.end_date,
            "Payment completed, subscription active"
        );

        Ok((payment, subscription))
    }

    /// Mark a payment failed. Idempotent; never touches the subscription.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn fail_payment(
        &self,
        payment_id: Uuid,
        reason: Option<&str>,
        processed_by: Option<Uuid>,
    ) -> Result<SubscriptionPayment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fail_payment"])
            .start_timer();

        let existing = self
            .get_subscription_payment(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if SubscriptionPaymentStatus::from_string(&existing.status)
            == SubscriptionPaymentStatus::Failed
        {
            info!(payment_id = %payment_id, "Payment already failed, no-op");
            return Ok(existing);
        }

        let metadata = reason.map(|r| serde_json::json!({ "failure_reason": r }));

        let payment = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            r#"
            UPDATE subscription_payments
            SET status = 'failed',
                metadata = metadata || COALESCE($2, '{{}}'::jsonb),
                processed_by = COALESCE($3, processed_by),
                updated_utc = NOW()
            WHERE payment_id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(payment_id)
        .bind(metadata)
        .bind(processed_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to update payment: {}", e)))?;

        timer.observe_duration();
        record_payment_status("failed");

        Ok(payment)
    }

    /// Record a refund against a settled payment. The eligibility check and
    /// the increment run under one row lock, so concurrent refunds can never
    /// push `amount_refunded` past `amount`.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn create_refund(
        &self,
        payment_id: Uuid,
        amount: Option<Decimal>,
        reason: Option<&str>,
        processed_by: Option<Uuid>,
    ) -> Result<SubscriptionPayment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_refund"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let payment = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM subscription_payments WHERE payment_id = $1 FOR UPDATE"
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if !payment.is_refundable() {
            return Err(AppError::InvalidState(format!(
                "Payment is not refundable (status: {}, refunded: {})",
                payment.status, payment.amount_refunded
            )));
        }

        let remainder = payment.refundable_remainder();
        let amount = amount.unwrap_or(remainder);
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Refund amount must be greater than zero".to_string(),
            ));
        }
        if amount > remainder {
            return Err(AppError::Validation(format!(
                "Refund amount {} exceeds refundable remainder {}",
                amount, remainder
            )));
        }

        let new_refunded = payment.amount_refunded + amount;
        let new_status = if new_refunded >= payment.amount {
            SubscriptionPaymentStatus::Refunded
        } else {
            SubscriptionPaymentStatus::PartiallyRefunded
        };
        let metadata = reason.map(|r| serde_json::json!({ "refund_reason": r }));

        let payment = sqlx::query_as::<_, SubscriptionPayment>(&format!(
            r#"
            UPDATE subscription_payments
            SET amount_refunded = amount_refunded + $2,
                status = $3,
                metadata = metadata || COALESCE($4, '{{}}'::jsonb),
                processed_by = COALESCE($5, processed_by),
                updated_utc = NOW()
            WHERE payment_id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(payment_id)
        .bind(amount)
        .bind(new_status.as_str())
        .bind(metadata)
        .bind(processed_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.observe_duration();
        record_payment_status(new_status.as_str());
        info!(
            payment_id = %payment_id,
            refunded = %amount,
            total_refunded = %payment.amount_refunded,
            status = %payment.status,
            "Refund recorded"
        );

        Ok(payment)
    }
}

/// Subscription effect of a completed payment, inside the caller's
/// transaction: payments carrying a plan apply the additive extension path;
/// others just make sure the subscription is active.
async fn apply_completed_payment(
    conn: &mut PgConnection,
    subscription_id: Uuid,
    plan_id: Option<Uuid>,
) -> Result<Subscription, AppError> {
    let current = sqlx::query_as::<_, Subscription>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE subscription_id = $1 FOR UPDATE"
    ))
    .bind(subscription_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

    let subscription = match plan_id {
        Some(plan_id) => {
            let duration: i32 = sqlx::query_scalar(
                "SELECT duration_days FROM subscription_plans WHERE plan_id = $1",
            )
            .bind(plan_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

            let end_date = lifecycle::extended_end(current.end_date, duration);

            sqlx::query_as::<_, Subscription>(&format!(
                r#"
                UPDATE subscriptions
                SET plan_id = $2, end_date = $3, status = 'active', updated_utc = NOW()
                WHERE subscription_id = $1
                RETURNING {SUBSCRIPTION_COLUMNS}
                "#,
            ))
            .bind(subscription_id)
            .bind(plan_id)
            .bind(end_date)
            .fetch_one(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, Subscription>(&format!(
                r#"
                UPDATE subscriptions
                SET status = 'active', updated_utc = NOW()
                WHERE subscription_id = $1
                RETURNING {SUBSCRIPTION_COLUMNS}
                "#,
            ))
            .bind(subscription_id)
            .fetch_one(&mut *conn)
            .await?
        }
    };

    Ok(subscription)
}

//! Application startup and lifecycle management.

use crate::config::SubscriptionConfig;
use crate::handlers::{gateway, health, payments, plans, subscriptions, webhooks};
use crate::services::paypal::PayPalClient;
use crate::services::stripe::StripeClient;
use crate::services::{init_metrics, Database};
use axum::routing::{delete, get, post, put};
use axum::Router;
use service_core::error::AppError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub paypal: Arc<PayPalClient>,
    pub stripe: Arc<StripeClient>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: SubscriptionConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: SubscriptionConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: SubscriptionConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let state = AppState {
            db: Arc::new(db),
            paypal: Arc::new(PayPalClient::new(config.paypal.clone())),
            stripe: Arc::new(StripeClient::new(config.stripe.clone())),
        };

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Subscription service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state.clone());

        tracing::info!(
            service = "subscription-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route("/plans", get(plans::list_plans))
        .route("/admin/plans", post(plans::create_plan))
        .route("/admin/plans/:plan_id", put(plans::update_plan))
        .route("/admin/plans/:plan_id", delete(plans::delete_plan))
        .route("/admin/plans/:plan_id/activate", post(plans::activate_plan))
        .route(
            "/admin/plans/:plan_id/deactivate",
            post(plans::deactivate_plan),
        )
        .route(
            "/admin/subscriptions/assign",
            post(subscriptions::assign_plan),
        )
        .route(
            "/admin/subscriptions/:subscription_id/renew",
            post(subscriptions::renew_subscription),
        )
        .route(
            "/admin/subscriptions/:subscription_id/suspend",
            post(subscriptions::suspend_subscription),
        )
        .route(
            "/admin/subscriptions/:subscription_id/cancel",
            post(subscriptions::cancel_subscription),
        )
        .route(
            "/admin/subscriptions/:subscription_id/activate",
            post(subscriptions::activate_subscription),
        )
        .route("/syndic/subscription", get(subscriptions::my_subscription))
        .route(
            "/syndic/subscription-payments",
            post(payments::create_manual_payment),
        )
        .route(
            "/syndic/subscription-payments",
            get(payments::list_my_payments),
        )
        .route(
            "/admin/subscription-payments/:payment_id/process",
            post(payments::process_payment),
        )
        .route(
            "/admin/subscription-payments/:payment_id/mark-completed",
            post(payments::mark_completed),
        )
        .route(
            "/admin/subscription-payments/:payment_id/mark-failed",
            post(payments::mark_failed),
        )
        .route(
            "/admin/subscription-payments/:payment_id/refund",
            post(payments::issue_refund),
        )
        .route("/gateway/create-order", post(gateway::create_order))
        .route("/gateway/capture-order", post(gateway::capture_order))
        .route("/gateway/refund", post(gateway::refund))
        .route(
            "/gateway/orders/:provider_order_id/status",
            get(gateway::order_status),
        )
        .route("/gateway/webhooks/card", post(webhooks::card_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

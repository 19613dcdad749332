use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use std::env;

#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub paypal: PayPalConfig,
    pub stripe: StripeConfig,
    pub service_name: String,
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone, Debug)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub api_base_url: String,
    pub return_url: String,
    pub cancel_url: String,
    /// Upper bound for each HTTP call to PayPal, in seconds.
    pub timeout_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

impl SubscriptionConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("SUBSCRIPTION_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SUBSCRIPTION_SERVICE_PORT")
            .unwrap_or_else(|_| "3011".to_string())
            .parse()?;

        let db_url = env::var("SUBSCRIPTION_DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("SUBSCRIPTION_DATABASE_URL must be set"))?;
        let max_connections = env::var("SUBSCRIPTION_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("SUBSCRIPTION_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let paypal = PayPalConfig {
            client_id: env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
            client_secret: Secret::new(env::var("PAYPAL_CLIENT_SECRET").unwrap_or_default()),
            api_base_url: env::var("PAYPAL_API_BASE_URL")
                .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
            return_url: env::var("PAYPAL_RETURN_URL")
                .unwrap_or_else(|_| "https://app.syndicare.local/payment/success".to_string()),
            cancel_url: env::var("PAYPAL_CANCEL_URL")
                .unwrap_or_else(|_| "https://app.syndicare.local/payment/cancel".to_string()),
            timeout_seconds: env::var("PAYPAL_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        };

        let stripe = StripeConfig {
            secret_key: Secret::new(env::var("STRIPE_SECRET_KEY").unwrap_or_default()),
            webhook_secret: Secret::new(env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default()),
            api_base_url: env::var("STRIPE_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            timeout_seconds: env::var("STRIPE_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        };

        let log_level = env::var("SUBSCRIPTION_LOG_LEVEL")
            .unwrap_or_else(|_| "info,subscription_service=debug".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: db_url,
                max_connections,
                min_connections,
            },
            paypal,
            stripe,
            service_name: "subscription-service".to_string(),
            log_level,
        })
    }
}

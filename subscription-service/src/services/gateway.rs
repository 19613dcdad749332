//! Uniform payment gateway contract.
//!
//! Both providers implement [`PaymentGateway`]; handlers never see a
//! provider-specific error type. Timeouts are surfaced as their own variant
//! so callers can leave local records untouched.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider did not answer within the configured deadline. The
    /// outcome of the operation is unknown.
    #[error("gateway timed out")]
    Timeout,
    /// The provider answered with a failure.
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    /// The provider answered with something we could not interpret.
    #[error("gateway protocol error: {0}")]
    Protocol(String),
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        AppError::Gateway(e.to_string())
    }
}

impl GatewayError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Protocol(e.to_string())
        }
    }
}

/// Request to open a checkout with a provider.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    /// Our payment id, echoed back through provider metadata.
    pub local_reference: String,
}

/// Provider checkout handle.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub order_id: String,
    /// Redirect-flow providers return where to send the payer.
    pub approval_url: Option<String>,
    /// Intent-flow providers return the client-side completion secret.
    pub client_secret: Option<String>,
    pub status: String,
}

/// Result of capturing an approved order.
#[derive(Debug, Clone)]
pub struct GatewayCapture {
    /// The settled transaction id, distinct from the order id.
    pub transaction_id: String,
    pub status: String,
    pub receipt_url: Option<String>,
}

/// Result of a provider-side refund.
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub refund_id: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider label for logs and metrics.
    fn provider(&self) -> &'static str;

    async fn create_order(&self, order: &CreateOrder) -> Result<GatewayOrder, GatewayError>;

    async fn capture(
        &self,
        order_id: &str,
        payer_token: Option<&str>,
    ) -> Result<GatewayCapture, GatewayError>;

    async fn get_status(&self, order_id: &str) -> Result<String, GatewayError>;

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
        currency: &str,
    ) -> Result<GatewayRefund, GatewayError>;
}

/// Convert a decimal major-unit amount to the provider's minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| GatewayError::Protocol(format!("amount out of range: {}", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_round_to_cents() {
        assert_eq!(to_minor_units("99.00".parse().unwrap()).unwrap(), 9900);
        assert_eq!(to_minor_units("0.01".parse().unwrap()).unwrap(), 1);
        assert_eq!(to_minor_units("10.005".parse().unwrap()).unwrap(), 1000);
    }

    #[test]
    fn timeout_maps_to_gateway_error() {
        let err: AppError = GatewayError::Timeout.into();
        assert!(matches!(err, AppError::Gateway(_)));
    }
}

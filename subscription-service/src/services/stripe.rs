//! Stripe payment-intent client (intent flow) and webhook signature
//! verification.
//!
//! The webhook signature header has the form `t=<unix>,v1=<hex>`; the signed
//! payload is `{t}.{raw body}` under HMAC-SHA256 with the shared webhook
//! secret.

use crate::config::StripeConfig;
use crate::services::gateway::{
    to_minor_units, CreateOrder, GatewayCapture, GatewayError, GatewayOrder, GatewayRefund,
    PaymentGateway,
};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    client_secret: Option<String>,
    #[serde(default)]
    latest_charge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<String, GatewayError> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let response = self
            .client
            .post(&url)
            .basic_auth(self.config.secret_key.expose_secret(), None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(GatewayError::from_reqwest)?;

        tracing::debug!(status = %status, path = %path, "Stripe response");

        if status.is_success() {
            Ok(body)
        } else {
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.error.error_type,
                        e.error.message.unwrap_or_default()
                    )
                })
                .unwrap_or(body);
            Err(GatewayError::Rejected(message))
        }
    }

    /// Verify a `Stripe-Signature` header against the raw request body.
    /// Returns the parsed timestamp on success.
    pub fn verify_webhook_signature(&self, header: &str, body: &str) -> Result<i64, GatewayError> {
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| GatewayError::Protocol("signature header missing t=".to_string()))?;
        if signatures.is_empty() {
            return Err(GatewayError::Protocol(
                "signature header missing v1=".to_string(),
            ));
        }

        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(
            self.config.webhook_secret.expose_secret().as_bytes(),
        )
        .map_err(|_| GatewayError::Protocol("invalid webhook secret".to_string()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if !signatures.iter().any(|s| *s == expected) {
            return Err(GatewayError::Rejected(
                "webhook signature mismatch".to_string(),
            ));
        }

        timestamp
            .parse::<i64>()
            .map_err(|_| GatewayError::Protocol("non-numeric signature timestamp".to_string()))
    }

    /// Compute a valid signature header for a payload. Test support.
    pub fn sign_payload(&self, timestamp: i64, body: &str) -> String {
        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(
            self.config.webhook_secret.expose_secret().as_bytes(),
        )
        .expect("HMAC accepts any key length");
        mac.update(signed_payload.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    fn provider(&self) -> &'static str {
        "stripe"
    }

    /// Create a payment intent. The returned `client_secret` lets the
    /// frontend complete the payment; settlement arrives via webhook.
    async fn create_order(&self, order: &CreateOrder) -> Result<GatewayOrder, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::Rejected(
                "Stripe credentials not configured".to_string(),
            ));
        }

        let form = vec![
            ("amount".to_string(), to_minor_units(order.amount)?.to_string()),
            ("currency".to_string(), order.currency.to_lowercase()),
            ("description".to_string(), order.description.clone()),
            (
                "metadata[payment_id]".to_string(),
                order.local_reference.clone(),
            ),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];

        let body = self.post_form("/v1/payment_intents", &form).await?;
        let intent: PaymentIntent =
            serde_json::from_str(&body).map_err(|e| GatewayError::Protocol(e.to_string()))?;

        tracing::info!(intent_id = %intent.id, status = %intent.status, "Stripe payment intent created");

        Ok(GatewayOrder {
            order_id: intent.id,
            approval_url: None,
            client_secret: intent.client_secret,
            status: intent.status,
        })
    }

    /// Server-side confirmation of an intent. The normal path is the
    /// webhook; this exists for the uniform contract.
    async fn capture(
        &self,
        order_id: &str,
        _payer_token: Option<&str>,
    ) -> Result<GatewayCapture, GatewayError> {
        let body = self
            .post_form(&format!("/v1/payment_intents/{}/confirm", order_id), &[])
            .await?;
        let intent: PaymentIntent =
            serde_json::from_str(&body).map_err(|e| GatewayError::Protocol(e.to_string()))?;

        let transaction_id = intent.latest_charge.unwrap_or_else(|| intent.id.clone());

        Ok(GatewayCapture {
            transaction_id,
            status: intent.status,
            receipt_url: None,
        })
    }

    async fn get_status(&self, order_id: &str) -> Result<String, GatewayError> {
        let url = format!("{}/v1/payment_intents/{}", self.config.api_base_url, order_id);
        let response = self
            .client
            .get(&url)
            .basic_auth(self.config.secret_key.expose_secret(), None::<&str>)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(GatewayError::from_reqwest)?;

        if !status.is_success() {
            return Err(GatewayError::Rejected(body));
        }

        let intent: PaymentIntent =
            serde_json::from_str(&body).map_err(|e| GatewayError::Protocol(e.to_string()))?;
        Ok(intent.status)
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
        _currency: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        let mut form = vec![("payment_intent".to_string(), transaction_id.to_string())];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), to_minor_units(amount)?.to_string()));
        }

        let body = self.post_form("/v1/refunds", &form).await?;
        let refund: StripeRefund =
            serde_json::from_str(&body).map_err(|e| GatewayError::Protocol(e.to_string()))?;

        tracing::info!(
            transaction_id = %transaction_id,
            refund_id = %refund.id,
            "Stripe refund issued"
        );

        Ok(GatewayRefund {
            refund_id: refund.id,
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
        })
    }
}

//! PayPal checkout client (redirect flow).
//!
//! Creating an order returns an approval URL the payer is redirected to;
//! after approval the order is captured and the capture id becomes the
//! settled transaction reference.

use crate::config::PayPalConfig;
use crate::services::gateway::{
    CreateOrder, GatewayCapture, GatewayError, GatewayOrder, GatewayRefund, PaymentGateway,
};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Clone)]
pub struct PayPalClient {
    client: Client,
    config: PayPalConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    status: String,
    #[serde(default)]
    purchase_units: Vec<CapturePurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct CapturePurchaseUnit {
    payments: Option<CapturePayments>,
}

#[derive(Debug, Deserialize)]
struct CapturePayments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    status: String,
}

impl PayPalClient {
    pub fn new(config: PayPalConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.client_secret.expose_secret().is_empty()
    }

    /// Client-credentials token for the subsequent API call.
    async fn access_token(&self) -> Result<String, GatewayError> {
        let url = format!("{}/v1/oauth2/token", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!(
                "PayPal token request failed: {}",
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn parse_order(&self, response: reqwest::Response) -> Result<OrderResponse, GatewayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(GatewayError::from_reqwest)?;

        tracing::debug!(status = %status, body = %body, "PayPal order response");

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| GatewayError::Protocol(e.to_string()))
        } else {
            Err(GatewayError::Rejected(body))
        }
    }
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    fn provider(&self) -> &'static str {
        "paypal"
    }

    async fn create_order(&self, order: &CreateOrder) -> Result<GatewayOrder, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::Rejected(
                "PayPal credentials not configured".to_string(),
            ));
        }

        let token = self.access_token().await?;
        let url = format!("{}/v2/checkout/orders", self.config.api_base_url);

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": order.local_reference,
                "description": order.description,
                "amount": {
                    "currency_code": order.currency,
                    "value": order.amount.to_string()
                }
            }],
            "application_context": {
                "return_url": self.config.return_url,
                "cancel_url": self.config.cancel_url
            }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let order = self.parse_order(response).await?;
        let approval_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.clone());

        tracing::info!(order_id = %order.id, status = %order.status, "PayPal order created");

        Ok(GatewayOrder {
            order_id: order.id,
            approval_url,
            client_secret: None,
            status: order.status,
        })
    }

    async fn capture(
        &self,
        order_id: &str,
        _payer_token: Option<&str>,
    ) -> Result<GatewayCapture, GatewayError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v2/checkout/orders/{}/capture",
            self.config.api_base_url, order_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(GatewayError::from_reqwest)?;

        if !status.is_success() {
            tracing::warn!(order_id = %order_id, body = %body, "PayPal capture failed");
            return Err(GatewayError::Rejected(body));
        }

        let capture: CaptureResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::Protocol(e.to_string()))?;

        let transaction_id = capture
            .purchase_units
            .iter()
            .filter_map(|u| u.payments.as_ref())
            .flat_map(|p| p.captures.iter())
            .map(|c| c.id.clone())
            .next()
            .ok_or_else(|| {
                GatewayError::Protocol("capture response carried no capture id".to_string())
            })?;

        tracing::info!(
            order_id = %order_id,
            transaction_id = %transaction_id,
            status = %capture.status,
            "PayPal order captured"
        );

        Ok(GatewayCapture {
            transaction_id,
            status: capture.status,
            receipt_url: None,
        })
    }

    async fn get_status(&self, order_id: &str) -> Result<String, GatewayError> {
        let token = self.access_token().await?;
        let url = format!("{}/v2/checkout/orders/{}", self.config.api_base_url, order_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let order = self.parse_order(response).await?;
        Ok(order.status)
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
        currency: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v2/payments/captures/{}/refund",
            self.config.api_base_url, transaction_id
        );

        // An empty body refunds the full capture
        let body = match amount {
            Some(amount) => json!({
                "amount": { "currency_code": currency, "value": amount.to_string() }
            }),
            None => json!({}),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(GatewayError::from_reqwest)?;

        if !status.is_success() {
            return Err(GatewayError::Rejected(text));
        }

        let refund: RefundResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::Protocol(e.to_string()))?;

        tracing::info!(
            transaction_id = %transaction_id,
            refund_id = %refund.id,
            status = %refund.status,
            "PayPal refund issued"
        );

        Ok(GatewayRefund {
            refund_id: refund.id,
            status: refund.status,
        })
    }
}

//! Card webhook endpoint.
//!
//! Delivery is at-least-once; every branch here is idempotent. Status
//! writes are assignments and settlement goes through the same no-op-safe
//! completion path the capture endpoint uses.

use crate::services::record_webhook_event;
use crate::startup::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use service_core::error::AppError;
use service_core::response::ApiResponse;

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
    #[serde(default)]
    latest_charge: Option<String>,
    #[serde(default)]
    last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Deserialize)]
struct PaymentError {
    message: Option<String>,
}

/// Receive a card provider event. The signature is verified against the
/// raw body before anything is parsed; an invalid signature changes no
/// state.
pub async fn card_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Signature("Missing Stripe-Signature header".to_string()))?;

    state
        .stripe
        .verify_webhook_signature(signature, &body)
        .map_err(|e| AppError::Signature(format!("Webhook signature rejected: {}", e)))?;

    let event: WebhookEvent = serde_json::from_str(&body)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {}", e)))?;

    let intent_id = event.data.object.id.as_str();

    let payment = match state.db.get_payment_by_provider_order(intent_id).await? {
        Some(payment) => payment,
        None => {
            // Not ours (or already pruned); acknowledge so the provider
            // stops retrying
            tracing::warn!(intent_id = %intent_id, event = %event.event_type, "Webhook for unknown payment");
            record_webhook_event(&event.event_type, "unknown_payment");
            return Ok(Json(ApiResponse::message("ignored")));
        }
    };

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            let transaction_id = event
                .data
                .object
                .latest_charge
                .unwrap_or_else(|| intent_id.to_string());
            state
                .db
                .complete_payment(payment.payment_id, Some(&transaction_id), None, None)
                .await?;
            record_webhook_event(&event.event_type, "processed");
            Ok(Json(ApiResponse::message("processed")))
        }
        "payment_intent.payment_failed" => {
            let reason = event
                .data
                .object
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "payment failed".to_string());
            state
                .db
                .fail_payment(payment.payment_id, Some(&reason), None)
                .await?;
            record_webhook_event(&event.event_type, "processed");
            Ok(Json(ApiResponse::message("processed")))
        }
        other => {
            tracing::debug!(event = %other, "Ignoring unhandled webhook event");
            record_webhook_event(other, "ignored");
            Ok(Json(ApiResponse::message("ignored")))
        }
    }
}

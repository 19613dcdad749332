//! Card and PayPal checkout endpoints.

use crate::models::{
    CreateSubscriptionPayment, SubscriptionPayment, SubscriptionPaymentMethod,
    SubscriptionPaymentStatus,
};
use crate::services::gateway::{CreateOrder, GatewayError, PaymentGateway};
use crate::services::record_gateway_request;
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use service_core::auth::{Principal, Role};
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Paypal,
    Card,
}

impl Provider {
    fn payment_method(&self) -> SubscriptionPaymentMethod {
        match self {
            Provider::Paypal => SubscriptionPaymentMethod::Paypal,
            Provider::Card => SubscriptionPaymentMethod::Card,
        }
    }
}

fn gateway_for<'a>(state: &'a AppState, provider: Provider) -> &'a dyn PaymentGateway {
    match provider {
        Provider::Paypal => state.paypal.as_ref(),
        Provider::Card => state.stripe.as_ref(),
    }
}

fn gateway_for_method<'a>(
    state: &'a AppState,
    method: &str,
) -> Result<&'a dyn PaymentGateway, AppError> {
    match SubscriptionPaymentMethod::parse(method) {
        Some(SubscriptionPaymentMethod::Paypal) => Ok(state.paypal.as_ref()),
        Some(SubscriptionPaymentMethod::Card) | Some(SubscriptionPaymentMethod::Stripe) => {
            Ok(state.stripe.as_ref())
        }
        _ => Err(AppError::InvalidState(format!(
            "Payment method {} has no gateway",
            method
        ))),
    }
}

fn outcome(result: &Result<impl Sized, GatewayError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(GatewayError::Timeout) => "timeout",
        Err(GatewayError::Rejected(_)) => "rejected",
        Err(GatewayError::Protocol(_)) => "protocol_error",
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub plan_id: Uuid,
    pub provider: Provider,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub payment: SubscriptionPayment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Open a checkout with the chosen provider. The local record is persisted
/// only after the provider accepts, keyed by the provider's order id; a
/// failed or timed-out call leaves nothing behind.
pub async fn create_order(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Syndic)?;

    let plan = state
        .db
        .get_plan(body.plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;
    if !plan.is_active {
        return Err(AppError::InvalidState(
            "Cannot pay for an inactive plan".to_string(),
        ));
    }

    let subscription = state
        .db
        .ensure_subscription(principal.user_id, plan.plan_id)
        .await?;

    let gateway = gateway_for(&state, body.provider);
    let result = gateway
        .create_order(&CreateOrder {
            amount: plan.price,
            currency: "EUR".to_string(),
            description: format!("SyndiCare subscription: {}", plan.name),
            local_reference: subscription.subscription_id.to_string(),
        })
        .await;
    record_gateway_request(gateway.provider(), "create_order", outcome(&result));
    let order = result?;

    // Intent-flow payments wait for a payment method; redirect-flow
    // payments wait for payer approval.
    let status = match body.provider {
        Provider::Card => SubscriptionPaymentStatus::RequiresPaymentMethod,
        Provider::Paypal => SubscriptionPaymentStatus::Pending,
    };

    let payment = state
        .db
        .create_subscription_payment(&CreateSubscriptionPayment {
            subscription_id: subscription.subscription_id,
            amount: plan.price,
            currency: "EUR".to_string(),
            payment_method: body.provider.payment_method(),
            status,
            provider_order_id: Some(order.order_id.clone()),
            provider_customer_id: None,
            metadata: serde_json::json!({ "plan_id": plan.plan_id }),
            reference: None,
            notes: None,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(CreateOrderResponse {
            payment,
            approval_url: order.approval_url,
            client_secret: order.client_secret,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CaptureOrderRequest {
    pub provider_order_id: String,
    pub payer_token: Option<String>,
}

/// Capture an approved order. Success settles the payment and writes the
/// provider's transaction id next to the preserved order id; a provider
/// rejection marks the payment failed; a timeout changes nothing.
pub async fn capture_order(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CaptureOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state
        .db
        .get_payment_by_provider_order(&body.provider_order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    let subscription = state
        .db
        .get_subscription(payment.subscription_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
    if !principal.can_act_for_syndic(subscription.syndic_id) {
        return Err(AppError::Ownership(
            "You do not own this payment".to_string(),
        ));
    }

    let gateway = gateway_for_method(&state, &payment.payment_method)?;
    let result = gateway
        .capture(&body.provider_order_id, body.payer_token.as_deref())
        .await;
    record_gateway_request(gateway.provider(), "capture", outcome(&result));

    match result {
        Ok(capture) => {
            let (payment, subscription) = state
                .db
                .complete_payment(
                    payment.payment_id,
                    Some(&capture.transaction_id),
                    capture.receipt_url.as_deref(),
                    None,
                )
                .await?;
            Ok(Json(ApiResponse::with_message(
                "Payment captured",
                serde_json::json!({ "payment": payment, "subscription": subscription }),
            )))
        }
        Err(GatewayError::Rejected(reason)) => {
            state
                .db
                .fail_payment(payment.payment_id, Some(&reason), None)
                .await?;
            Err(AppError::Gateway(format!("Capture failed: {}", reason)))
        }
        // Unknown outcome: leave the local record alone
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct GatewayRefundRequest {
    pub payment_id: Uuid,
    pub amount: Option<rust_decimal::Decimal>,
    pub reason: Option<String>,
}

/// Refund through the original provider, then record it locally. The local
/// eligibility gate runs first so ineligible payments never reach the
/// provider.
pub async fn refund(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<GatewayRefundRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    let payment = state
        .db
        .get_subscription_payment(body.payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    if !payment.is_refundable() {
        return Err(AppError::InvalidState(format!(
            "Payment is not refundable (status: {})",
            payment.status
        )));
    }

    let gateway = gateway_for_method(&state, &payment.payment_method)?;
    // Stripe refunds key on the intent, PayPal on the captured transaction
    let provider_reference = match SubscriptionPaymentMethod::parse(&payment.payment_method) {
        Some(SubscriptionPaymentMethod::Paypal) => payment.provider_transaction_id.clone(),
        _ => payment.provider_order_id.clone(),
    }
    .ok_or_else(|| {
        AppError::InvalidState("Payment has no provider reference to refund".to_string())
    })?;

    let result = gateway
        .refund(&provider_reference, body.amount, &payment.currency)
        .await;
    record_gateway_request(gateway.provider(), "refund", outcome(&result));
    let gateway_refund = result?;

    let payment = state
        .db
        .create_refund(
            body.payment_id,
            body.amount,
            body.reason.as_deref(),
            Some(principal.user_id),
        )
        .await?;

    Ok(Json(ApiResponse::with_message(
        "Refund issued",
        serde_json::json!({ "payment": payment, "provider_refund_id": gateway_refund.refund_id }),
    )))
}

/// Local and provider status for an order, side by side.
pub async fn order_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(provider_order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state
        .db
        .get_payment_by_provider_order(&provider_order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    let subscription = state
        .db
        .get_subscription(payment.subscription_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
    if !principal.can_act_for_syndic(subscription.syndic_id) {
        return Err(AppError::Ownership(
            "You do not own this payment".to_string(),
        ));
    }

    let gateway = gateway_for_method(&state, &payment.payment_method)?;
    let result = gateway.get_status(&provider_order_id).await;
    record_gateway_request(gateway.provider(), "get_status", outcome(&result));
    let provider_status = result?;

    Ok(Json(ApiResponse::data(serde_json::json!({
        "payment": payment,
        "provider_status": provider_status,
    }))))
}

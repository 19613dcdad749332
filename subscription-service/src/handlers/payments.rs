//! Manual subscription payments and admin shortcuts.

use crate::models::{
    CreateSubscriptionPayment, SubscriptionPaymentMethod, SubscriptionPaymentStatus,
};
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use service_core::auth::{Principal, Role};
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateManualPaymentRequest {
    pub plan_id: Uuid,
    pub payment_method: SubscriptionPaymentMethod,
    pub reference: Option<String>,
    pub rib: Option<String>,
    pub notes: Option<String>,
}

/// Syndic declares an out-of-band payment for a plan. The payment waits in
/// pending until an admin processes it; entitlement arrives on approval.
pub async fn create_manual_payment(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CreateManualPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Syndic)?;

    if !matches!(
        body.payment_method,
        SubscriptionPaymentMethod::BankTransfer | SubscriptionPaymentMethod::Cash
    ) {
        return Err(AppError::Validation(
            "Manual payments are bank transfer or cash; card payments go through the gateway"
                .to_string(),
        ));
    }

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

    let mut metadata = serde_json::json!({ "plan_id": plan.plan_id });
    if let Some(rib) = &body.rib {
        metadata["rib"] = serde_json::json!(rib);
    }

    let payment = state
        .db
        .create_subscription_payment(&CreateSubscriptionPayment {
            subscription_id: subscription.subscription_id,
            amount: plan.price,
            currency: "EUR".to_string(),
            payment_method: body.payment_method,
            status: SubscriptionPaymentStatus::Pending,
            provider_order_id: None,
            provider_customer_id: None,
            metadata,
            reference: body.reference,
            notes: body.notes,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Payment submitted, awaiting processing",
            payment,
        )),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListSubscriptionPaymentsQuery {
    pub status: Option<String>,
    pub syndic_id: Option<Uuid>,
}

pub async fn list_my_payments(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListSubscriptionPaymentsQuery>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Syndic)?;
    let syndic_id = match params.syndic_id {
        Some(id) if principal.is_admin() => id,
        _ => principal.user_id,
    };

    let status = params
        .status
        .as_deref()
        .map(parse_payment_status)
        .transpose()?;

    let payments = state.db.list_payments_for_syndic(syndic_id, status).await?;

    Ok(Json(ApiResponse::data(payments)))
}

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    pub action: ProcessAction,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessAction {
    Approve,
    Reject,
}

/// Admin decision on a pending manual payment. Approval settles it and
/// applies the subscription extension; rejection requires a reason.
pub async fn process_payment(
    State(state): State<AppState>,
    principal: Principal,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<ProcessPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    let payment = state
        .db
        .get_subscription_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    if SubscriptionPaymentStatus::from_string(&payment.status)
        != SubscriptionPaymentStatus::Pending
    {
        return Err(AppError::InvalidState(format!(
            "Only pending payments can be processed (current status: {})",
            payment.status
        )));
    }

    match body.action {
        ProcessAction::Approve => {
            let (payment, subscription) = state
                .db
                .complete_payment(payment_id, None, None, Some(principal.user_id))
                .await?;
            Ok(Json(ApiResponse::with_message(
                "Payment approved",
                serde_json::json!({ "payment": payment, "subscription": subscription }),
            )))
        }
        ProcessAction::Reject => {
            let reason = body
                .reason
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .ok_or_else(|| {
                    AppError::Validation("A reason is required to reject a payment".to_string())
                })?;
            let payment = state
                .db
                .fail_payment(payment_id, Some(reason), Some(principal.user_id))
                .await?;
            Ok(Json(ApiResponse::with_message(
                "Payment rejected",
                serde_json::json!({ "payment": payment }),
            )))
        }
    }
}

/// Idempotent admin shortcut: force a payment to completed. Already-settled
/// payments are a no-op.
pub async fn mark_completed(
    State(state): State<AppState>,
    principal: Principal,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    let (payment, subscription) = state
        .db
        .complete_payment(payment_id, None, None, Some(principal.user_id))
        .await?;

    Ok(Json(ApiResponse::with_message(
        "Payment marked completed",
        serde_json::json!({ "payment": payment, "subscription": subscription }),
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkFailedRequest {
    pub reason: Option<String>,
}

/// Idempotent admin shortcut: force a payment to failed.
pub async fn mark_failed(
    State(state): State<AppState>,
    principal: Principal,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<MarkFailedRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    let payment = state
        .db
        .fail_payment(payment_id, body.reason.as_deref(), Some(principal.user_id))
        .await?;

    Ok(Json(ApiResponse::with_message(
        "Payment marked failed",
        payment,
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueRefundRequest {
    pub amount: Option<rust_decimal::Decimal>,
    pub reason: Option<String>,
}

/// Record a refund without calling the provider; provider-side refunds go
/// through the gateway endpoint. Eligibility rules still apply.
pub async fn issue_refund(
    State(state): State<AppState>,
    principal: Principal,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<IssueRefundRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    let payment = state
        .db
        .create_refund(
            payment_id,
            body.amount,
            body.reason.as_deref(),
            Some(principal.user_id),
        )
        .await?;

    Ok(Json(ApiResponse::with_message("Refund recorded", payment)))
}

pub(crate) fn parse_payment_status(s: &str) -> Result<SubscriptionPaymentStatus, AppError> {
    let parsed = SubscriptionPaymentStatus::from_string(s);
    if parsed.as_str() != s {
        return Err(AppError::Validation(format!(
            "Unknown payment status filter: {}",
            s
        )));
    }
    Ok(parsed)
}

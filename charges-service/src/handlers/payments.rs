//! Resident payment submission and syndic confirm/reject.

use crate::models::{
    Charge, CreateResidentPayment, PaymentMethod, ResidentPayment, ResidentPaymentStatus,
};
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::auth::{Principal, Role};
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PayChargeRequest {
    /// Omitted amount pays the full remaining balance.
    pub amount: Option<Decimal>,
    pub payment_method: PaymentMethod,
    pub reference: Option<String>,
    pub payment_proof: Option<String>,
    pub rib: Option<String>,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PaymentCreatedResponse {
    pub payment: ResidentPayment,
    pub remaining_balance: Decimal,
}

/// Resident declares a payment against one of their charges. The payment
/// starts pending and the charge is untouched until the syndic confirms.
pub async fn pay_charge(
    State(state): State<AppState>,
    principal: Principal,
    Path(charge_id): Path<Uuid>,
    Json(body): Json<PayChargeRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Resident)?;

    let (payment, remaining_balance) = state
        .db
        .create_resident_payment(&CreateResidentPayment {
            charge_id,
            resident_id: principal.user_id,
            amount: body.amount,
            payment_method: body.payment_method,
            reference: body.reference,
            payment_proof: body.payment_proof,
            rib: body.rib,
            notes: body.notes,
            paid_at: body.paid_at,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Payment submitted, awaiting confirmation",
            PaymentCreatedResponse {
                payment,
                remaining_balance,
            },
        )),
    ))
}

#[derive(Debug, Serialize)]
pub struct PaymentWithCharge {
    pub payment: ResidentPayment,
    pub charge: Charge,
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    principal: Principal,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state
        .db
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    if !principal.can_act_for_syndic(payment.syndic_id) {
        return Err(AppError::Ownership(
            "You do not manage this payment".to_string(),
        ));
    }

    let (payment, charge) = state.db.confirm_payment(payment_id).await?;

    Ok(Json(ApiResponse::with_message(
        "Payment confirmed",
        PaymentWithCharge { payment, charge },
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectPaymentRequest {
    pub reason: Option<String>,
}

pub async fn reject_payment(
    State(state): State<AppState>,
    principal: Principal,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<RejectPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state
        .db
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    if !principal.can_act_for_syndic(payment.syndic_id) {
        return Err(AppError::Ownership(
            "You do not manage this payment".to_string(),
        ));
    }

    let payment = state.db.reject_payment(payment_id).await?;

    let message = match body.reason {
        Some(reason) => format!("Payment rejected: {}", reason),
        None => "Payment rejected".to_string(),
    };

    Ok(Json(ApiResponse::with_message(message, payment)))
}

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    pub status: Option<String>,
    pub syndic_id: Option<Uuid>,
}

pub async fn list_payments(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListPaymentsQuery>,
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

pub async fn list_my_payments(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Resident)?;

    let payments = state
        .db
        .list_payments_for_resident(principal.user_id)
        .await?;

    Ok(Json(ApiResponse::data(payments)))
}

fn parse_payment_status(s: &str) -> Result<ResidentPaymentStatus, AppError> {
    match s {
        "pending" => Ok(ResidentPaymentStatus::Pending),
        "confirmed" => Ok(ResidentPaymentStatus::Confirmed),
        "rejected" => Ok(ResidentPaymentStatus::Rejected),
        other => Err(AppError::Validation(format!(
            "Unknown payment status filter: {}",
            other
        ))),
    }
}
